// PPDD node binary
// Resolves configuration, picks a transport and runs the relay engine until shutdown

use clap::{Parser, ValueEnum};
use ppdd::config::EndpointSettings;
use ppdd::engine::{EngineConfig, RelayEngine, ServiceError};
use ppdd::message::Role;
use ppdd::transport::{
    HttpTransport, HttpTransportConfig, MemoryNetwork, ProtoTransport, ProtoTransportConfig,
    Transport,
};
use std::process::ExitCode;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum TransportKind {
    /// gRPC Trigger calls
    Proto,
    /// Legacy JSON over HTTP
    Http,
    /// All four roles inside this process
    Memory,
}

#[derive(Parser, Debug)]
#[command(name = "ppdd", version, about = "Ping-pong-ding-dong heartbeat node")]
struct Cli {
    #[command(flatten)]
    endpoints: EndpointSettings,

    /// Wire transport to use
    #[arg(long, env = "PPDD_TRANSPORT", value_enum, default_value_t = TransportKind::Proto)]
    transport: TransportKind,

    /// Pause before replying to each message, in milliseconds
    #[arg(long, env = "PPDD_PROCESSING_DELAY_MS", default_value_t = 2000)]
    processing_delay_ms: u64,

    /// Period of the Ping bootstrap retry, in milliseconds
    #[arg(long, env = "PPDD_BOOTSTRAP_INTERVAL_MS", default_value_t = 4000)]
    bootstrap_interval_ms: u64,

    /// Ping also pings Ding on every Nth Pong
    #[arg(long, env = "PPDD_DING_INTERVAL", default_value_t = 4)]
    ding_interval: u64,
}

impl Cli {
    fn engine_config(&self) -> EngineConfig {
        EngineConfig::new()
            .with_processing_delay(Duration::from_millis(self.processing_delay_ms))
            .with_bootstrap_interval(Duration::from_millis(self.bootstrap_interval_ms))
            .with_ding_interval(self.ding_interval)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let shutdown = CancellationToken::new();
    watch_ctrl_c(shutdown.clone());

    let settings = cli.engine_config();
    let result = match cli.transport {
        TransportKind::Proto => {
            let mut transport = ProtoTransport::new(ProtoTransportConfig::default());
            run_node(&cli.endpoints, settings, shutdown, &mut transport).await
        }
        TransportKind::Http => {
            let mut transport = HttpTransport::new(HttpTransportConfig::default());
            run_node(&cli.endpoints, settings, shutdown, &mut transport).await
        }
        TransportKind::Memory => run_mesh(&cli.endpoints, settings, shutdown).await,
    };

    match result {
        Ok(()) => {
            info!("Application finished");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Error running service");
            ExitCode::FAILURE
        }
    }
}

/// Cancel `shutdown` on control-c
fn watch_ctrl_c(shutdown: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                match signal {
                    Ok(()) => info!("received control-c, shutting down"),
                    Err(e) => error!(error = %e, "cannot listen for control-c, shutting down"),
                }
                shutdown.cancel();
            }
            _ = shutdown.cancelled() => {}
        }
    });
}

async fn run_node<T: Transport>(
    endpoints: &EndpointSettings,
    settings: EngineConfig,
    shutdown: CancellationToken,
    transport: &mut T,
) -> Result<(), ServiceError> {
    let engine = RelayEngine::new(endpoints.resolve(), settings)?;
    let node = engine.node();
    info!(role = %node.role, listen = %node.listen, "Running in mode {}", node.role);
    for role in Role::ALL {
        info!("  {}: {}", role.as_str().to_lowercase(), node.address(role).unwrap_or("-"));
    }
    let timing = engine.settings();
    info!(
        processing_delay_ms = timing.processing_delay.as_millis() as u64,
        bootstrap_interval_ms = timing.bootstrap_interval.as_millis() as u64,
        ding_interval = timing.ding_interval,
        "engine settings"
    );
    engine.run(shutdown, transport).await
}

/// Run every role over an in-process network until shutdown or the first failure
async fn run_mesh(
    endpoints: &EndpointSettings,
    settings: EngineConfig,
    shutdown: CancellationToken,
) -> Result<(), ServiceError> {
    let network = MemoryNetwork::new();
    let mut nodes = JoinSet::new();
    for role in Role::ALL {
        let engine = RelayEngine::new(endpoints.resolve_for(role), settings.clone())?;
        let mut transport = network.transport();
        let shutdown = shutdown.clone();
        nodes.spawn(async move { engine.run(shutdown, &mut transport).await });
    }
    info!("in-process mesh started with {} nodes", Role::ALL.len());

    let mut outcome = Ok(());
    while let Some(joined) = nodes.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                shutdown.cancel();
                outcome = outcome.and(Err(e));
            }
            Err(e) => {
                error!(error = %e, "node task ended abnormally");
                shutdown.cancel();
            }
        }
    }
    outcome
}
