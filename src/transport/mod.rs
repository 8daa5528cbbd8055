// Transport module - THE WIRE (abstract)
// Pluggable transports behind a single contract: gRPC Trigger, legacy HTTP, and in-memory

mod traits;
mod envelope;
mod http;
mod memory;
mod proto;

pub use traits::{
    // Core trait
    Transport,
    // Channel types
    Channels, Inbound, Outbound,
    // State and errors
    TransportError, TransportState,
    // Statistics
    StatsRecorder, TransportStats,
};

pub use envelope::{
    pb, MessageType, PpddService, PpddServiceClient, PpddServiceServer, WireMessage, WireMeta,
    WireResponse,
};

pub use http::{endpoint_url, HttpTransport, HttpTransportConfig, ServiceMsg, ServiceStatus};

pub use memory::{MemoryHandle, MemoryNetwork, MemoryTransport};

pub use proto::{grpc_uri, trigger, ProtoTransport, ProtoTransportConfig};
