// In-Memory Transport Implementation
// A loopback transport for tests and for running the whole mesh inside one process

use crate::config::NodeConfig;
use crate::message::{Message, Request, Role};
use crate::transport::traits::{drain_outbound, forward_inbound};
use crate::transport::{
    Channels, Inbound, Outbound, StatsRecorder, Transport, TransportError, TransportState,
    TransportStats,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

// ============================================================================
// MEMORY NETWORK
// ============================================================================

/// Routes requests between in-process transports by endpoint role
#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
    mailboxes: Arc<Mutex<HashMap<Role, mpsc::UnboundedSender<Message>>>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport attached to this network. It registers under its
    /// role when initialized.
    pub fn transport(&self) -> MemoryTransport {
        let (inject_tx, inject_rx) = mpsc::unbounded_channel();
        MemoryTransport::with_route(Route::Network(self.clone()), inject_tx, inject_rx)
    }

    /// Roles that currently have a node attached
    pub fn roles(&self) -> Vec<Role> {
        self.lock().keys().copied().collect()
    }

    fn register(&self, role: Role, mailbox: mpsc::UnboundedSender<Message>) {
        self.lock().insert(role, mailbox);
    }

    fn unregister(&self, role: Role) {
        self.lock().remove(&role);
    }

    fn deliver(&self, request: Request) -> Result<(), TransportError> {
        let mailbox = self
            .lock()
            .get(&request.endpoint)
            .cloned()
            .ok_or(TransportError::UnknownEndpoint(request.endpoint))?;
        mailbox
            .send(request.message)
            .map_err(|_| TransportError::Delivery {
                endpoint: request.endpoint,
                reason: "node stopped".to_string(),
            })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Role, mpsc::UnboundedSender<Message>>> {
        // A poisoned map is still a valid map
        self.mailboxes.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ============================================================================
// MEMORY HANDLE
// ============================================================================

/// Test-side view of a captured `MemoryTransport`
pub struct MemoryHandle {
    inject: mpsc::UnboundedSender<Message>,
    captured: mpsc::UnboundedReceiver<Request>,
}

impl MemoryHandle {
    /// Feed a message to the engine as if it arrived from the network.
    /// Fails once the transport has stopped serving.
    pub fn inject(&self, message: Message) -> Result<(), TransportError> {
        self.inject
            .send(message)
            .map_err(|_| TransportError::Stopped)
    }

    /// Wait up to `wait` for the next request the engine emitted
    pub async fn next_request(&mut self, wait: Duration) -> Option<Request> {
        timeout(wait, self.captured.recv()).await.ok().flatten()
    }

    /// Take every request emitted so far
    pub fn drain(&mut self) -> Vec<Request> {
        let mut requests = Vec::new();
        while let Ok(request) = self.captured.try_recv() {
            requests.push(request);
        }
        requests
    }
}

// ============================================================================
// MEMORY TRANSPORT
// ============================================================================

enum Route {
    Capture(mpsc::UnboundedSender<Request>),
    Network(MemoryNetwork),
}

/// Transport that never touches a socket
pub struct MemoryTransport {
    route: Route,
    state: TransportState,
    stats: StatsRecorder,
    channels: Option<Channels>,
    inject_tx: mpsc::UnboundedSender<Message>,
    inject_rx: Option<mpsc::UnboundedReceiver<Message>>,
}

impl MemoryTransport {
    /// A transport whose outbound requests are captured by the returned handle
    pub fn pair() -> (Self, MemoryHandle) {
        let (inject_tx, inject_rx) = mpsc::unbounded_channel();
        let (captured_tx, captured_rx) = mpsc::unbounded_channel();
        let handle = MemoryHandle {
            inject: inject_tx.clone(),
            captured: captured_rx,
        };
        (
            Self::with_route(Route::Capture(captured_tx), inject_tx, inject_rx),
            handle,
        )
    }

    fn with_route(
        route: Route,
        inject_tx: mpsc::UnboundedSender<Message>,
        inject_rx: mpsc::UnboundedReceiver<Message>,
    ) -> Self {
        Self {
            route,
            state: TransportState::Created,
            stats: StatsRecorder::default(),
            channels: None,
            inject_tx,
            inject_rx: Some(inject_rx),
        }
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    fn name(&self) -> &'static str {
        "memory"
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
        if let Route::Network(network) = &self.route {
            network.register(config.role, self.inject_tx.clone());
        }
        self.state.advance(TransportState::Initialized)
    }

    async fn listen_and_serve(&mut self, shutdown: CancellationToken) -> Result<(), TransportError> {
        let channels = self.channels.take().ok_or(TransportError::NotInitialized)?;
        let mut injected = self.inject_rx.take().ok_or(TransportError::NotInitialized)?;
        let role = channels.config.role;
        self.state.advance(TransportState::Running)?;
        info!(%role, "memory transport serving");

        let sending = shutdown.child_token();
        let sender = match &self.route {
            Route::Capture(captured) => {
                let captured = captured.clone();
                tokio::spawn(drain_outbound(
                    channels.outbound,
                    sending.clone(),
                    self.stats.clone(),
                    move |request: Request| {
                        let endpoint = request.endpoint;
                        let sent = captured.send(request).map_err(|_| TransportError::Delivery {
                            endpoint,
                            reason: "capture handle dropped".to_string(),
                        });
                        async move { sent }
                    },
                ))
            }
            Route::Network(network) => {
                let network = network.clone();
                tokio::spawn(drain_outbound(
                    channels.outbound,
                    sending.clone(),
                    self.stats.clone(),
                    move |request: Request| {
                        let delivered = network.deliver(request);
                        async move { delivered }
                    },
                ))
            }
        };

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                next = injected.recv() => match next {
                    Some(message) => {
                        self.stats.record_received();
                        forward_inbound(&channels.inbound, message, &shutdown);
                    }
                    None => {
                        // Nobody can inject any more; idle until shutdown.
                        shutdown.cancelled().await;
                        break;
                    }
                },
            }
        }

        if let Route::Network(network) = &self.route {
            network.unregister(role);
        }
        sending.cancel();
        if let Err(e) = sender.await {
            debug!(error = %e, "send loop ended abnormally");
        }
        self.state.advance(TransportState::Stopped)?;
        info!(%role, "memory transport stopped");
        Ok(())
    }

    fn state(&self) -> &TransportState {
        &self.state
    }

    fn stats(&self) -> TransportStats {
        self.stats.snapshot()
    }
}
