// HTTP Transport Implementation
// Legacy JSON-over-HTTP wire: POST {"Msg": "<ping|pong|ding|dong>"} to "/"
//
// Also serves the auxiliary endpoints: GET / (node summary), /health and
// POST /shutdown, which cancels the shared shutdown token.

use crate::config::NodeConfig;
use crate::message::{Message, Request, Role};
use crate::transport::traits::{drain_outbound, forward_inbound};
use crate::transport::{
    Channels, Inbound, Outbound, StatsRecorder, Transport, TransportError, TransportState,
    TransportStats,
};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// ============================================================================
// HTTP TRANSPORT CONFIG
// ============================================================================

/// Configuration for the HTTP transport
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Timeout for each outbound POST
    pub request_timeout: Duration,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl HttpTransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }
}

// ============================================================================
// WIRE BODIES
// ============================================================================

/// Body of a message POSTed to `/`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceMsg {
    #[serde(rename = "Msg", default)]
    pub msg: String,
}

impl ServiceMsg {
    pub fn new(kind: Role) -> Self {
        Self {
            msg: kind.as_str().to_lowercase(),
        }
    }
}

/// Body returned by `/health`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    #[serde(rename = "Status")]
    pub status: String,
}

// ============================================================================
// HANDLERS
// ============================================================================

#[derive(Clone)]
struct HttpState {
    local_address: String,
    role: Role,
    protocol_version: String,
    inbound: Inbound,
    shutdown: CancellationToken,
    stats: StatsRecorder,
}

fn router(state: HttpState) -> Router {
    Router::new()
        .route("/", get(get_root).post(post_root))
        .route("/health", get(health))
        .route("/shutdown", post(shutdown))
        .with_state(state)
}

/// Node summary. Process memory and the environment are not reported; the
/// environment routinely carries credentials.
async fn get_root(State(state): State<HttpState>) -> String {
    let cpus = std::thread::available_parallelism().map_or(1, |n| n.get());
    let hostname = hostname::get()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string());
    format!(
        "Hello from: {}:\n  mode: {}\n  protocol version: {}\n  operating system: {}\n  architecture: {}\n  number of CPUs: {}\n  hostname: {}\n",
        state.local_address,
        state.role.as_str().to_lowercase(),
        state.protocol_version,
        std::env::consts::OS,
        std::env::consts::ARCH,
        cpus,
        hostname,
    )
}

async fn post_root(
    State(state): State<HttpState>,
    body: Result<Json<ServiceMsg>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            state.stats.record_receive_error();
            warn!(error = %rejection, "cannot decode JSON");
            return (StatusCode::BAD_REQUEST, rejection.body_text()).into_response();
        }
    };
    if body.msg.is_empty() {
        state.stats.record_receive_error();
        warn!("request missing `Msg` key");
        return (StatusCode::BAD_REQUEST, "No message").into_response();
    }
    let kind = match body.msg.parse::<Role>() {
        Ok(kind) => kind,
        Err(e) => {
            state.stats.record_receive_error();
            warn!(error = %e, "unknown message");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    debug!(%kind, "rx");
    state.stats.record_received();
    forward_inbound(
        &state.inbound,
        Message::new(&state.protocol_version, kind),
        &state.shutdown,
    );
    StatusCode::OK.into_response()
}

async fn health() -> Json<ServiceStatus> {
    Json(ServiceStatus {
        status: "OK".to_string(),
    })
}

async fn shutdown(State(state): State<HttpState>) -> &'static str {
    info!("shutdown requested over http");
    state.shutdown.cancel();
    "Shutting down\n"
}

// ============================================================================
// CLIENT
// ============================================================================

/// Turn a configured address into the URL messages are POSTed to
pub fn endpoint_url(address: &str) -> String {
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{}/", address)
    }
}

async fn post_message(
    client: reqwest::Client,
    addresses: Arc<HashMap<Role, String>>,
    request: Request,
) -> Result<(), TransportError> {
    let endpoint = request.endpoint;
    let address = addresses
        .get(&endpoint)
        .ok_or(TransportError::UnknownEndpoint(endpoint))?;
    let response = client
        .post(endpoint_url(address))
        .json(&ServiceMsg::new(request.kind()))
        .send()
        .await
        .map_err(|e| TransportError::Delivery {
            endpoint,
            reason: e.to_string(),
        })?;
    if !response.status().is_success() {
        return Err(TransportError::Delivery {
            endpoint,
            reason: format!("status {}", response.status()),
        });
    }
    Ok(())
}

// ============================================================================
// HTTP TRANSPORT
// ============================================================================

/// Transport speaking the legacy JSON-over-HTTP protocol
pub struct HttpTransport {
    config: HttpTransportConfig,
    state: TransportState,
    stats: StatsRecorder,
    channels: Option<Channels>,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> Self {
        Self {
            config,
            state: TransportState::Created,
            stats: StatsRecorder::default(),
            channels: None,
        }
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
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

        let client = match reqwest::Client::builder()
            .timeout(self.config.request_timeout)
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                self.state.advance(TransportState::Failed(e.to_string()))?;
                return Err(TransportError::Serve(e.to_string()));
            }
        };
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
        let local_address = listener
            .local_addr()
            .map_or_else(|_| listen.clone(), |addr| addr.to_string());
        self.state.advance(TransportState::Running)?;
        info!(address = %listen, role = %channels.config.role, "http transport listening");

        // Stops the send loop even when the server fails without a shutdown.
        let serving = shutdown.child_token();
        let addresses = Arc::new(channels.config.addresses.clone());
        let sender = tokio::spawn(drain_outbound(
            channels.outbound,
            serving.clone(),
            self.stats.clone(),
            move |request: Request| post_message(client.clone(), addresses.clone(), request),
        ));

        let app = router(HttpState {
            local_address,
            role: channels.config.role,
            protocol_version: channels.config.protocol_version.clone(),
            inbound: channels.inbound,
            shutdown: shutdown.clone(),
            stats: self.stats.clone(),
        });
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(serving.clone().cancelled_owned())
            .await;

        serving.cancel();
        if let Err(e) = sender.await {
            debug!(error = %e, "send loop ended abnormally");
        }
        match served {
            Ok(()) => {
                self.state.advance(TransportState::Stopped)?;
                info!("http transport stopped");
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
