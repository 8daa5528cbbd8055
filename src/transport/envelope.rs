// Wire Envelope - Generated gRPC schema of the Trigger service and its conversions
//
// proto/ppdd.proto, package v1:
//   service PpddService { rpc Trigger(Message) returns (Response); }
//
// MessageType values 0..=4 match Role::code.

use crate::message::{Message, Meta, Response, Role};
use crate::transport::TransportError;
use chrono::{DateTime, Utc};

/// Code generated from proto/ppdd.proto
pub mod pb {
    tonic::include_proto!("v1");
}

pub use pb::ppdd_service_client::PpddServiceClient;
pub use pb::ppdd_service_server::{PpddService, PpddServiceServer};
pub use pb::{Message as WireMessage, MessageType, Meta as WireMeta, Response as WireResponse};

impl From<MessageType> for Role {
    fn from(value: MessageType) -> Self {
        match value {
            MessageType::Undefined => Role::Undefined,
            MessageType::Ping => Role::Ping,
            MessageType::Pong => Role::Pong,
            MessageType::Ding => Role::Ding,
            MessageType::Dong => Role::Dong,
        }
    }
}

fn to_timestamp(at: &DateTime<Utc>) -> prost_types::Timestamp {
    prost_types::Timestamp {
        seconds: at.timestamp(),
        nanos: at.timestamp_subsec_nanos() as i32,
    }
}

/// Out-of-range timestamps collapse to None
fn from_timestamp(at: &prost_types::Timestamp) -> Option<DateTime<Utc>> {
    let nanos = u32::try_from(at.nanos).ok()?;
    DateTime::from_timestamp(at.seconds, nanos)
}

impl WireMeta {
    pub fn from_meta(meta: &Meta) -> Self {
        Self {
            api_version: meta.protocol_version.clone(),
            sent_at: Some(to_timestamp(&meta.sent_at)),
        }
    }

    /// A missing or invalid timestamp is replaced by the time of receipt
    pub fn into_meta(self) -> Meta {
        let sent_at = self
            .sent_at
            .as_ref()
            .and_then(from_timestamp)
            .unwrap_or_else(Utc::now);
        Meta {
            protocol_version: self.api_version,
            sent_at,
        }
    }
}

impl WireMessage {
    pub fn from_message(message: &Message) -> Self {
        Self {
            meta: Some(WireMeta::from_meta(&message.meta)),
            message: message.kind.code(),
        }
    }

    /// Convert to the core type; the protocol version is taken verbatim from
    /// the payload so the engine can enforce it.
    pub fn into_message(self) -> Result<Message, TransportError> {
        let kind = MessageType::try_from(self.message)
            .map_err(|_| TransportError::Decode(format!("unknown message type {}", self.message)))?;
        let meta = self
            .meta
            .map(WireMeta::into_meta)
            .ok_or_else(|| TransportError::Decode("message without meta".to_string()))?;
        Ok(Message {
            meta,
            kind: kind.into(),
        })
    }
}

impl WireResponse {
    pub fn from_response(response: &Response) -> Self {
        Self {
            meta: Some(WireMeta::from_meta(&response.meta)),
        }
    }

    pub fn into_response(self) -> Result<Response, TransportError> {
        let meta = self
            .meta
            .map(WireMeta::into_meta)
            .ok_or_else(|| TransportError::Decode("response without meta".to_string()))?;
        Ok(Response { meta })
    }
}
