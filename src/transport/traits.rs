// Transport Traits and Core Types
// Defines the abstract Transport contract and the plumbing shared by every implementation

use crate::config::{NodeConfig, SUPPORTED_PROTOCOL_VERSION};
use crate::message::{Message, Request, Role};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Transport to engine: every message received from the network
pub type Inbound = mpsc::Sender<Message>;

/// Engine to transport: every request the engine wants delivered
pub type Outbound = mpsc::Receiver<Request>;

// ============================================================================
// TRANSPORT ERRORS
// ============================================================================

/// Errors that can occur in the transport layer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("API version error: transport supports {supported}, wanted {requested}")]
    UnsupportedVersion { supported: String, requested: String },

    #[error("Transport not initialized")]
    NotInitialized,

    #[error("Transport already initialized")]
    AlreadyInitialized,

    #[error("Cannot bind {address}: {reason}")]
    Bind { address: String, reason: String },

    #[error("Serve failed: {0}")]
    Serve(String),

    #[error("Delivery to {endpoint} failed: {reason}")]
    Delivery { endpoint: Role, reason: String },

    #[error("No address registered for endpoint {0}")]
    UnknownEndpoint(Role),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Call timed out")]
    Timeout,

    #[error("Cannot connect: {0}")]
    Connect(String),

    #[error("Call failed with {code:?}: {message}")]
    Rpc { code: tonic::Code, message: String },

    #[error("Invalid state transition from {from:?} to {to:?}")]
    InvalidTransition { from: TransportState, to: TransportState },

    #[error("Transport stopped")]
    Stopped,
}

impl TransportError {
    /// Check if this error concerns a single outbound request
    pub fn is_delivery_error(&self) -> bool {
        matches!(
            self,
            Self::Delivery { .. }
                | Self::UnknownEndpoint(_)
                | Self::Timeout
                | Self::Connect(_)
                | Self::Rpc { .. }
        )
    }
}

// ============================================================================
// TRANSPORT STATE
// ============================================================================

/// Lifecycle of a transport
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransportState {
    #[default]
    Created,
    Initialized,
    Running,
    Stopped,
    Failed(String),
}

impl TransportState {
    /// Check if transition to another state is valid
    pub fn can_transition_to(&self, target: &TransportState) -> bool {
        matches!(
            (self, target),
            (Self::Created, Self::Initialized)
                | (Self::Initialized, Self::Running)
                | (Self::Initialized, Self::Failed(_))
                | (Self::Running, Self::Stopped)
                | (Self::Running, Self::Failed(_))
        )
    }

    /// Move to `target` if the lifecycle allows it
    pub fn advance(&mut self, target: TransportState) -> Result<(), TransportError> {
        if !self.can_transition_to(&target) {
            return Err(TransportError::InvalidTransition {
                from: self.clone(),
                to: target,
            });
        }
        *self = target;
        Ok(())
    }
}

// ============================================================================
// TRANSPORT STATISTICS
// ============================================================================

/// Point-in-time statistics for a transport
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportStats {
    /// Messages handed to the engine
    pub messages_received: u64,
    /// Requests delivered to their endpoint
    pub requests_sent: u64,
    /// Requests that could not be delivered
    pub delivery_failures: u64,
    /// Inbound payloads that could not be decoded
    pub receive_errors: u64,
}

/// Shared counters updated from the transport's worker tasks
#[derive(Debug, Clone, Default)]
pub struct StatsRecorder {
    inner: Arc<StatsInner>,
}

#[derive(Debug, Default)]
struct StatsInner {
    messages_received: AtomicU64,
    requests_sent: AtomicU64,
    delivery_failures: AtomicU64,
    receive_errors: AtomicU64,
}

impl StatsRecorder {
    pub fn record_received(&self) {
        self.inner.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sent(&self) {
        self.inner.requests_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivery_failure(&self) {
        self.inner.delivery_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_receive_error(&self) {
        self.inner.receive_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TransportStats {
        TransportStats {
            messages_received: self.inner.messages_received.load(Ordering::Relaxed),
            requests_sent: self.inner.requests_sent.load(Ordering::Relaxed),
            delivery_failures: self.inner.delivery_failures.load(Ordering::Relaxed),
            receive_errors: self.inner.receive_errors.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// CHANNELS
// ============================================================================

/// Everything a transport is handed by `init`
pub struct Channels {
    pub inbound: Inbound,
    pub outbound: Outbound,
    pub config: NodeConfig,
}

impl Channels {
    /// Validate the config against this build and bundle it with the channels
    pub fn attach(
        inbound: Inbound,
        outbound: Outbound,
        config: &NodeConfig,
    ) -> Result<Self, TransportError> {
        if config.protocol_version != SUPPORTED_PROTOCOL_VERSION {
            return Err(TransportError::UnsupportedVersion {
                supported: SUPPORTED_PROTOCOL_VERSION.to_string(),
                requested: config.protocol_version.clone(),
            });
        }
        Ok(Self {
            inbound,
            outbound,
            config: config.clone(),
        })
    }
}

// ============================================================================
// TRANSPORT TRAIT
// ============================================================================

/// The contract the relay engine requires of a wire transport.
///
/// A transport never interprets message semantics: it moves `Message`s from
/// the network onto the inbound channel and `Request`s from the outbound
/// channel onto the network.
#[async_trait::async_trait]
pub trait Transport: Send {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Store the channels and config. Called exactly once before
    /// `listen_and_serve`; fails if the config's protocol version is not
    /// supported by this build.
    fn init(
        &mut self,
        inbound: Inbound,
        outbound: Outbound,
        config: &NodeConfig,
    ) -> Result<(), TransportError>;

    /// Serve until `shutdown` fires or the transport cannot serve at all.
    /// Single delivery failures are logged, never returned.
    async fn listen_and_serve(&mut self, shutdown: CancellationToken) -> Result<(), TransportError>;

    /// Get the current transport state
    fn state(&self) -> &TransportState;

    /// Get transport statistics
    fn stats(&self) -> TransportStats;
}

/// Drain the outbound channel, delivering each request in its own task.
///
/// Returns when `shutdown` fires or the channel closes; deliveries still in
/// flight at that point are aborted.
pub(crate) async fn drain_outbound<F, Fut>(
    mut outbound: Outbound,
    shutdown: CancellationToken,
    stats: StatsRecorder,
    deliver: F,
) where
    F: Fn(Request) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), TransportError>> + Send + 'static,
{
    let mut in_flight = JoinSet::new();
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                debug!("shutdown requested, exiting send loop");
                break;
            }
            next = outbound.recv() => {
                let Some(request) = next else {
                    debug!("send channel closed, exiting send loop");
                    break;
                };
                let endpoint = request.endpoint;
                let kind = request.kind();
                debug!(%kind, %endpoint, "sending");
                let delivery = deliver(request);
                let stats = stats.clone();
                in_flight.spawn(async move {
                    match delivery.await {
                        Ok(()) => stats.record_sent(),
                        Err(e) if e.is_delivery_error() => {
                            stats.record_delivery_failure();
                            warn!(%kind, %endpoint, error = %e, "delivery failed");
                        }
                        Err(e) => {
                            stats.record_delivery_failure();
                            error!(%kind, %endpoint, error = %e, "transport cannot deliver");
                        }
                    }
                });
            }
            Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
        }
    }
    in_flight.shutdown().await;
}

/// Hand a received message to the engine without blocking the caller
pub(crate) fn forward_inbound(inbound: &Inbound, message: Message, shutdown: &CancellationToken) {
    let inbound = inbound.clone();
    let shutdown = shutdown.clone();
    tokio::spawn(async move {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {}
            sent = inbound.send(message) => {
                if sent.is_err() {
                    debug!("receive channel closed, dropping message");
                }
            }
        }
    });
}
