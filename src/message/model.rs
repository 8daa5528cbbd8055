// Message Model - Roles, metadata, messages and requests
//
// A Role doubles as the identity of a node and as the payload tag of a
// message: a Pong node announces itself by sending a Pong message.

use crate::config::ConfigError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// ROLE
// ============================================================================

/// One of the four logical node identities, plus an Undefined sentinel.
///
/// The integer encoding is part of the wire contract and must not change:
/// 0=Undefined, 1=Ping, 2=Pong, 3=Ding, 4=Dong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Role {
    #[default]
    Undefined,
    Ping,
    Pong,
    Ding,
    Dong,
}

impl Role {
    /// Every role a node can actually play
    pub const ALL: [Role; 4] = [Role::Ping, Role::Pong, Role::Ding, Role::Dong];

    /// Wire code of this role
    pub fn code(&self) -> i32 {
        match self {
            Self::Undefined => 0,
            Self::Ping => 1,
            Self::Pong => 2,
            Self::Ding => 3,
            Self::Dong => 4,
        }
    }

    /// Decode a wire code; unknown codes yield None
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Undefined),
            1 => Some(Self::Ping),
            2 => Some(Self::Pong),
            3 => Some(Self::Ding),
            4 => Some(Self::Dong),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Undefined => "Undefined",
            Self::Ping => "Ping",
            Self::Pong => "Pong",
            Self::Ding => "Ding",
            Self::Dong => "Dong",
        }
    }

    /// Check if this is a role a node can run as
    pub fn is_defined(&self) -> bool {
        !matches!(self, Self::Undefined)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ConfigError;

    /// Case-insensitive; only the four playable roles are accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::InvalidRole(s.to_string()))
    }
}

// ============================================================================
// META
// ============================================================================

/// Metadata attached to every message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    /// Protocol version the sender speaks
    pub protocol_version: String,
    /// When the message was created
    pub sent_at: DateTime<Utc>,
}

impl Meta {
    /// Stamp new metadata with the current UTC time
    pub fn now(protocol_version: &str) -> Self {
        Self {
            protocol_version: protocol_version.to_string(),
            sent_at: Utc::now(),
        }
    }
}

// ============================================================================
// MESSAGE
// ============================================================================

/// "A message of kind `kind` was received"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub meta: Meta,
    pub kind: Role,
}

impl Message {
    pub fn new(protocol_version: &str, kind: Role) -> Self {
        Self {
            meta: Meta::now(protocol_version),
            kind,
        }
    }

    pub fn protocol_version(&self) -> &str {
        &self.meta.protocol_version
    }
}

// ============================================================================
// REQUEST
// ============================================================================

/// "Send `message` to the node playing role `endpoint`"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub message: Message,
    pub endpoint: Role,
}

impl Request {
    pub fn new(protocol_version: &str, kind: Role, endpoint: Role) -> Self {
        Self {
            message: Message::new(protocol_version, kind),
            endpoint,
        }
    }

    /// Kind of the message being sent
    pub fn kind(&self) -> Role {
        self.message.kind
    }
}

// ============================================================================
// RESPONSE
// ============================================================================

/// Acknowledgement a transport returns for a received message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub meta: Meta,
}

impl Response {
    pub fn new(protocol_version: &str) -> Self {
        Self {
            meta: Meta::now(protocol_version),
        }
    }
}
