// PPDD - ping-pong-ding-dong heartbeat mesh
//
// Four role-based nodes relay typed messages to each other over a pluggable
// transport. The engine decides what to send; the transport moves bytes.

pub mod config;
pub mod engine;
pub mod message;
pub mod transport;

pub use config::{ConfigError, NodeConfig, SUPPORTED_PROTOCOL_VERSION};
pub use engine::{run_service, EngineConfig, RelayEngine, ServiceError};
pub use message::{Message, Meta, Request, Response, Role};
pub use transport::{Transport, TransportError};
