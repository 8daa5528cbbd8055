// Engine module - THE RELAY
// Reply rules, Pong counting, the Ping bootstrap, and the service lifecycle

mod rules;
mod service;

pub use rules::{plan_replies, PongCounter, Route, DEFAULT_DING_INTERVAL};
pub use service::{run_service, EngineConfig, RelayEngine, ServiceError};
