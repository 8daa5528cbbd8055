// Node Configuration - The resolved, read-only view of a node's place in the mesh
//
// Built once by the loader and validated by the engine before anything starts.

use crate::message::Role;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The only protocol version this build speaks
pub const SUPPORTED_PROTOCOL_VERSION: &str = "v1";

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("refusing to run in Undefined role")]
    UndefinedRole,

    #[error("invalid role: {0:?}, expected one of ping, pong, ding, dong")]
    InvalidRole(String),

    #[error("protocol version is empty")]
    MissingProtocolVersion,

    #[error("protocol version mismatch: supported {supported}, configured {configured}")]
    UnsupportedProtocolVersion { supported: String, configured: String },

    #[error("no address configured for {0}")]
    MissingAddress(Role),

    #[error("listen address is empty")]
    MissingListenAddress,

    #[error("ding interval must be greater than zero")]
    InvalidDingInterval,

    #[error("bootstrap interval must be greater than zero")]
    InvalidBootstrapInterval,
}

/// Resolved configuration of a single node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// The role this node plays
    pub role: Role,
    /// Protocol version this node speaks
    pub protocol_version: String,
    /// Network address (`host:port`) of the node playing each role
    pub addresses: HashMap<Role, String>,
    /// Address the local transport binds to
    pub listen: String,
}

impl NodeConfig {
    pub fn new(role: Role, protocol_version: &str) -> Self {
        Self {
            role,
            protocol_version: protocol_version.to_string(),
            addresses: HashMap::new(),
            listen: String::new(),
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn with_address(mut self, role: Role, address: &str) -> Self {
        self.addresses.insert(role, address.to_string());
        self
    }

    pub fn with_listen(mut self, listen: &str) -> Self {
        self.listen = listen.to_string();
        self
    }

    /// Address of the node playing `role`
    pub fn address(&self, role: Role) -> Option<&str> {
        self.addresses.get(&role).map(String::as_str)
    }

    /// Validate the configuration. Never mutates it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.role.is_defined() {
            return Err(ConfigError::UndefinedRole);
        }
        if self.protocol_version.is_empty() {
            return Err(ConfigError::MissingProtocolVersion);
        }
        if self.protocol_version != SUPPORTED_PROTOCOL_VERSION {
            return Err(ConfigError::UnsupportedProtocolVersion {
                supported: SUPPORTED_PROTOCOL_VERSION.to_string(),
                configured: self.protocol_version.clone(),
            });
        }
        for role in Role::ALL {
            if self.address(role).map_or(true, str::is_empty) {
                return Err(ConfigError::MissingAddress(role));
            }
        }
        if self.listen.is_empty() {
            return Err(ConfigError::MissingListenAddress);
        }
        Ok(())
    }
}
