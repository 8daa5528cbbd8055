// Relay Engine - The node's state machine and its task layout
//
// Tasks and the channels between them:
//
//   transport --inbound--> receive loop --spawn--> dispatch --spawn--> emit --outbound--> transport
//                              |
//                              +--watch(pong count)--> bootstrap (Ping only) --spawn--> emit
//
// The receive loop is the only writer of the PongCounter; the bootstrap loop
// only ever sees a read-only snapshot of it.

use crate::config::{ConfigError, NodeConfig};
use crate::engine::rules::{plan_replies, PongCounter, Route, DEFAULT_DING_INTERVAL};
use crate::message::{Message, Request, Role};
use crate::transport::{Transport, TransportError};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Both channels hold at most one item, so senders wait for the receiver
const CHANNEL_CAPACITY: usize = 1;

/// Errors that stop the service
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("transport init failed: {0}")]
    TransportInit(TransportError),

    #[error("transport ListenAndServe() failed: {0}")]
    TransportServe(TransportError),
}

// ============================================================================
// ENGINE CONFIG
// ============================================================================

/// Timing and cadence of the relay engine
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Pause applied to every inbound message before its replies go out
    pub processing_delay: Duration,
    /// Period of the Ping bootstrap retry
    pub bootstrap_interval: Duration,
    /// A Ping node also pings Ding on every Nth Pong
    pub ding_interval: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            processing_delay: Duration::from_secs(2),
            bootstrap_interval: Duration::from_secs(4),
            ding_interval: DEFAULT_DING_INTERVAL,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_processing_delay(mut self, delay: Duration) -> Self {
        self.processing_delay = delay;
        self
    }

    pub fn with_bootstrap_interval(mut self, interval: Duration) -> Self {
        self.bootstrap_interval = interval;
        self
    }

    pub fn with_ding_interval(mut self, interval: u64) -> Self {
        self.ding_interval = interval;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ding_interval == 0 {
            return Err(ConfigError::InvalidDingInterval);
        }
        if self.bootstrap_interval.is_zero() {
            return Err(ConfigError::InvalidBootstrapInterval);
        }
        Ok(())
    }
}

// ============================================================================
// RELAY ENGINE
// ============================================================================

/// A validated node ready to run
#[derive(Clone, Debug)]
pub struct RelayEngine {
    node: NodeConfig,
    settings: EngineConfig,
}

impl RelayEngine {
    /// Validate both configs; nothing is created if either is invalid
    pub fn new(node: NodeConfig, settings: EngineConfig) -> Result<Self, ConfigError> {
        node.validate()?;
        settings.validate()?;
        Ok(Self { node, settings })
    }

    pub fn node(&self) -> &NodeConfig {
        &self.node
    }

    pub fn settings(&self) -> &EngineConfig {
        &self.settings
    }

    /// Run the node until `shutdown` fires or the transport stops serving.
    ///
    /// The transport's `listen_and_serve` owns the blocking wait; once it
    /// returns, the engine's own loops are stopped and awaited before its
    /// result is propagated.
    pub async fn run<T>(self, shutdown: CancellationToken, transport: &mut T) -> Result<(), ServiceError>
    where
        T: Transport + ?Sized,
    {
        let role = self.node.role;
        let version = self.node.protocol_version.clone();

        let (inbound_tx, inbound_rx) = mpsc::channel::<Message>(CHANNEL_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel::<Request>(CHANNEL_CAPACITY);
        transport
            .init(inbound_tx, outbound_rx, &self.node)
            .map_err(ServiceError::TransportInit)?;

        let loops = shutdown.child_token();
        let (pong_tx, pong_rx) = watch::channel(0u64);
        let mut tasks = JoinSet::new();

        if role == Role::Ping {
            tasks.spawn(
                Bootstrap {
                    version: version.clone(),
                    outbound: outbound_tx.clone(),
                    pong_seen: pong_rx,
                    interval: self.settings.bootstrap_interval,
                    shutdown: loops.clone(),
                }
                .run(),
            );
        }

        tasks.spawn(
            ReceiveLoop {
                role,
                version,
                inbound: inbound_rx,
                outbound: outbound_tx,
                pongs: PongCounter::new(self.settings.ding_interval),
                pong_seen: pong_tx,
                processing_delay: self.settings.processing_delay,
                shutdown: loops.clone(),
            }
            .run(),
        );

        info!(%role, transport = transport.name(), "PPDD service started");
        let served = transport.listen_and_serve(shutdown).await;

        loops.cancel();
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "engine task ended abnormally");
            }
        }
        info!(%role, "PPDD service ending");
        served.map_err(ServiceError::TransportServe)
    }
}

/// Validate `config` and run it with default engine settings
pub async fn run_service<T>(
    shutdown: CancellationToken,
    config: NodeConfig,
    transport: &mut T,
) -> Result<(), ServiceError>
where
    T: Transport + ?Sized,
{
    RelayEngine::new(config, EngineConfig::default())?
        .run(shutdown, transport)
        .await
}

// ============================================================================
// RECEIVE LOOP
// ============================================================================

struct ReceiveLoop {
    role: Role,
    version: String,
    inbound: mpsc::Receiver<Message>,
    outbound: mpsc::Sender<Request>,
    pongs: PongCounter,
    pong_seen: watch::Sender<u64>,
    processing_delay: Duration,
    shutdown: CancellationToken,
}

impl ReceiveLoop {
    async fn run(mut self) {
        loop {
            let message = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                next = self.inbound.recv() => match next {
                    Some(message) => message,
                    None => break,
                },
            };
            self.handle(message);
        }
        debug!(role = %self.role, "receive loop exiting");
    }

    fn handle(&mut self, message: Message) {
        info!(role = %self.role, kind = %message.kind, "Received {}", message.kind);

        if message.protocol_version() != self.version {
            warn!(
                expected = %self.version,
                found = %message.protocol_version(),
                "dropping message with mismatched protocol version"
            );
            return;
        }

        let routes = plan_replies(self.role, message.kind, &mut self.pongs);
        if self.role == Role::Ping && message.kind == Role::Pong {
            debug!(count = self.pongs.count(), "pong counted");
            self.pong_seen.send_replace(self.pongs.count());
        }
        if routes.is_empty() {
            return;
        }

        tokio::spawn(dispatch(
            routes,
            self.version.clone(),
            self.outbound.clone(),
            self.processing_delay,
            self.shutdown.clone(),
        ));
    }
}

/// Wait out the processing delay, then emit every reply independently
async fn dispatch(
    routes: Vec<Route>,
    version: String,
    outbound: mpsc::Sender<Request>,
    delay: Duration,
    shutdown: CancellationToken,
) {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => return,
        _ = tokio::time::sleep(delay) => {}
    }
    for route in routes {
        let request = Request::new(&version, route.kind, route.endpoint);
        tokio::spawn(emit(request, outbound.clone(), shutdown.clone()));
    }
}

/// Push one request onto the send channel unless shutdown wins first
async fn emit(request: Request, outbound: mpsc::Sender<Request>, shutdown: CancellationToken) {
    let kind = request.kind();
    let endpoint = request.endpoint;
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => {
            debug!(%kind, %endpoint, "shutdown before emit, dropping request");
        }
        sent = outbound.send(request) => match sent {
            Ok(()) => debug!(%kind, %endpoint, "request emitted"),
            Err(_) => warn!(%kind, %endpoint, "send channel closed, dropping request"),
        },
    }
}

// ============================================================================
// BOOTSTRAP
// ============================================================================

/// Ping-only retry: keep pinging Pong until the first Pong arrives
struct Bootstrap {
    version: String,
    outbound: mpsc::Sender<Request>,
    pong_seen: watch::Receiver<u64>,
    interval: Duration,
    shutdown: CancellationToken,
}

impl Bootstrap {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut attempts = 0u64;

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    debug!(attempts, "bootstrap cancelled");
                    return;
                }
                seen = self.pong_seen.wait_for(|count| *count > 0) => {
                    if seen.is_ok() {
                        info!(attempts, "bootstrapping complete");
                    }
                    return;
                }
                _ = ticker.tick() => {
                    info!(attempts, "ping bootstrapping");
                    attempts += 1;
                    let request = Request::new(&self.version, Role::Ping, Role::Pong);
                    tokio::spawn(emit(request, self.outbound.clone(), self.shutdown.clone()));
                }
            }
        }
    }
}
