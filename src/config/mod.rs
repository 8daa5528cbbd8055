// Config module - WHO AM I AND WHERE IS EVERYONE
// Resolved node configuration, its validation, and the env/CLI loader

mod loader;
mod node;

pub use loader::{EndpointSettings, DEFAULT_PORTS};
pub use node::{ConfigError, NodeConfig, SUPPORTED_PROTOCOL_VERSION};
