// Protobuf Transport Implementation
// gRPC wire: every node serves the unary PpddService/Trigger call and calls
// Trigger on its peers to deliver requests.
//
// Each outbound request dials its peer, performs one call and drops the
// channel, bounded end to end by the call timeout.

use crate::config::NodeConfig;
use crate::message::{Message, Request, Response, Role};
use crate::transport::envelope::{PpddService, PpddServiceClient, PpddServiceServer, WireMessage, WireResponse};
use crate::transport::traits::{drain_outbound, forward_inbound};
use crate::transport::{
    Channels, Inbound, Outbound, StatsRecorder, Transport, TransportError, TransportState,
    TransportStats,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::time::{timeout, Duration};
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::{Endpoint, Server};
use tonic::{Code, Status};
use tracing::{debug, info, warn};

// ============================================================================
// PROTO TRANSPORT CONFIG
// ============================================================================

/// Configuration for the gRPC transport
#[derive(Debug, Clone)]
pub struct ProtoTransportConfig {
    /// Bound on dialing plus the whole Trigger call
    pub call_timeout: Duration,
}

impl Default for ProtoTransportConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(5),
        }
    }
}

impl ProtoTransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }
}

// ============================================================================
// CLIENT
// ============================================================================

/// Turn a configured `host:port` into the URI a gRPC channel dials
pub fn grpc_uri(address: &str) -> String {
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    }
}

/// Perform one Trigger call against the node listening at `address`
pub async fn trigger(
    address: &str,
    message: &Message,
    config: &ProtoTransportConfig,
) -> Result<Response, TransportError> {
    timeout(config.call_timeout, call(address, message, config))
        .await
        .map_err(|_| TransportError::Timeout)?
}

async fn call(
    address: &str,
    message: &Message,
    config: &ProtoTransportConfig,
) -> Result<Response, TransportError> {
    let channel = Endpoint::from_shared(grpc_uri(address))
        .map_err(|e| TransportError::Connect(e.to_string()))?
        .connect_timeout(config.call_timeout)
        .tcp_nodelay(true)
        .connect()
        .await
        .map_err(|e| TransportError::Connect(e.to_string()))?;
    let mut client = PpddServiceClient::new(channel);

    // Carried to the callee as the grpc-timeout deadline
    let mut request = tonic::Request::new(WireMessage::from_message(message));
    request.set_timeout(config.call_timeout);

    let response = client.trigger(request).await.map_err(|status| match status.code() {
        Code::DeadlineExceeded => TransportError::Timeout,
        code => TransportError::Rpc {
            code,
            message: status.message().to_string(),
        },
    })?;
    response.into_inner().into_response()
}

async fn deliver(
    addresses: Arc<HashMap<Role, String>>,
    config: ProtoTransportConfig,
    request: Request,
) -> Result<(), TransportError> {
    let endpoint = request.endpoint;
    let address = addresses
        .get(&endpoint)
        .ok_or(TransportError::UnknownEndpoint(endpoint))?;
    let response = trigger(address, &request.message, &config)
        .await
        .map_err(|e| {
            if e.is_delivery_error() {
                e
            } else {
                TransportError::Delivery {
                    endpoint,
                    reason: e.to_string(),
                }
            }
        })?;
    debug!(%endpoint, version = %response.meta.protocol_version, "got response");
    Ok(())
}

// ============================================================================
// SERVER
// ============================================================================

struct TriggerService {
    inbound: Inbound,
    protocol_version: String,
    stats: StatsRecorder,
    shutdown: CancellationToken,
}

#[tonic::async_trait]
impl PpddService for TriggerService {
    async fn trigger(
        &self,
        request: tonic::Request<WireMessage>,
    ) -> Result<tonic::Response<WireResponse>, Status> {
        let peer = request.remote_addr();
        let message = match request.into_inner().into_message() {
            Ok(message) => message,
            Err(e) => {
                self.stats.record_receive_error();
                warn!(?peer, error = %e, "rejecting undecodable message");
                return Err(Status::invalid_argument(e.to_string()));
            }
        };

        debug!(?peer, kind = %message.kind, version = %message.meta.protocol_version, "rx");
        self.stats.record_received();
        forward_inbound(&self.inbound, message, &self.shutdown);

        let response = Response::new(&self.protocol_version);
        Ok(tonic::Response::new(WireResponse::from_response(&response)))
    }
}

// ============================================================================
// PROTO TRANSPORT
// ============================================================================

/// Transport speaking the gRPC Trigger protocol
pub struct ProtoTransport {
    config: ProtoTransportConfig,
    state: TransportState,
    stats: StatsRecorder,
    channels: Option<Channels>,
}

impl ProtoTransport {
    pub fn new(config: ProtoTransportConfig) -> Self {
        Self {
            config,
            state: TransportState::Created,
            stats: StatsRecorder::default(),
            channels: None,
        }
    }
}

#[async_trait::async_trait]
impl Transport for ProtoTransport {
    fn name(&self) -> &'static str {
        "proto"
    }

    fn init(
        &mut self,
        inbound: Inbound,
        outbound: Outbound,
        config: &NodeConfig,
    ) -> Result<(), TransportError> {
        if !self.state.can_transition_to(&TransportState::Initialized) {
            return Err(TransportError::AlreadyInitialized);
        }
        self.channels = Some(Channels::attach(inbound, outbound, config)?);
        self.state.advance(TransportState::Initialized)
    }

    async fn listen_and_serve(&mut self, shutdown: CancellationToken) -> Result<(), TransportError> {
        let channels = self.channels.take().ok_or(TransportError::NotInitialized)?;
        let listen = channels.config.listen.clone();

        let listener = match TcpListener::bind(&listen).await {
            Ok(listener) => listener,
            Err(e) => {
                self.state.advance(TransportState::Failed(e.to_string()))?;
                return Err(TransportError::Bind {
                    address: listen,
                    reason: e.to_string(),
                });
            }
        };
        self.state.advance(TransportState::Running)?;
        info!(address = %listen, role = %channels.config.role, "grpc transport listening");

        // Stops the send loop even when the server fails without a shutdown.
        let serving = shutdown.child_token();
        let addresses = Arc::new(channels.config.addresses.clone());
        let call_config = self.config.clone();
        let sender = tokio::spawn(drain_outbound(
            channels.outbound,
            serving.clone(),
            self.stats.clone(),
            move |request: Request| deliver(addresses.clone(), call_config.clone(), request),
        ));

        let service = TriggerService {
            inbound: channels.inbound,
            protocol_version: channels.config.protocol_version.clone(),
            stats: self.stats.clone(),
            shutdown: serving.clone(),
        };
        let served = Server::builder()
            .add_service(PpddServiceServer::new(service))
            .serve_with_incoming_shutdown(
                TcpListenerStream::new(listener),
                serving.clone().cancelled_owned(),
            )
            .await;

        serving.cancel();
        if let Err(e) = sender.await {
            debug!(error = %e, "send loop ended abnormally");
        }
        match served {
            Ok(()) => {
                self.state.advance(TransportState::Stopped)?;
                info!("context canceled, grpc transport stopped");
                Ok(())
            }
            Err(e) => {
                self.state.advance(TransportState::Failed(e.to_string()))?;
                Err(TransportError::Serve(e.to_string()))
            }
        }
    }

    fn state(&self) -> &TransportState {
        &self.state
    }

    fn stats(&self) -> TransportStats {
        self.stats.snapshot()
    }
}
