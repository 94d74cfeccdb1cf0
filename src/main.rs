//! ws-lifecycle demo
//!
//! Connects to a WebSocket endpoint using one of three navigation
//! strategies (guard, resolver, shared service) and logs what a page
//! using that strategy would observe.

mod scenarios;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use ws_lifecycle::config::{ManagerConfig, CONFIG_FILE};
use ws_lifecycle::transport::{HandshakeOutcome, SimulatedTransport, Transport, WebSocketTransport};
use ws_lifecycle::ConnectionManager;

/// WebSocket lifecycle demo
///
/// Compares connecting from a navigation guard, a blocking resolver and a
/// background shared service
#[derive(Parser, Debug)]
#[command(name = "ws-lifecycle")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    strategy: Strategy,

    /// Config file
    #[arg(short, long, global = true, default_value = CONFIG_FILE)]
    config: PathBuf,

    /// Endpoint URL (overrides the config file)
    #[arg(long, global = true)]
    url: Option<String>,

    /// API key sent as the `api_key` query parameter
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Establishment deadline in milliseconds for the resolver
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Use a simulated endpoint that answers after this many milliseconds
    #[arg(long, global = true)]
    simulate_latency_ms: Option<u64>,

    /// Make the simulated endpoint fail its handshake with this reason
    #[arg(long, global = true, requires = "simulate_latency_ms")]
    simulate_failure: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Strategy {
    /// Start connecting and let navigation continue immediately
    Guard,
    /// Block navigation until the socket opens or the deadline passes
    Resolve,
    /// Two pages share one background connection
    Service,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    info!("ws-lifecycle v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args)?;
    let deadline = config.connect_timeout();
    info!("Endpoint: {}", config.endpoint);

    let transport: Arc<dyn Transport> = match args.simulate_latency_ms {
        Some(ms) => {
            let outcome = match &args.simulate_failure {
                Some(reason) => HandshakeOutcome::Fail(reason.clone()),
                None => HandshakeOutcome::Open,
            };
            info!("Using simulated endpoint ({}ms handshake)", ms);
            Arc::new(SimulatedTransport::with_outcome(
                Duration::from_millis(ms),
                outcome,
            ))
        }
        None => Arc::new(WebSocketTransport::new()),
    };

    let manager = Arc::new(ConnectionManager::new(config, transport));

    let result = match args.strategy {
        Strategy::Guard => scenarios::guard(Arc::clone(&manager)).await,
        Strategy::Resolve => scenarios::resolve(Arc::clone(&manager), deadline).await,
        Strategy::Service => scenarios::service(Arc::clone(&manager)).await,
    };

    manager.disconnect();
    info!(
        "Done after {} connection attempt(s)",
        manager.attempts()
    );
    result
}

/// Load the config file and apply command line overrides
fn load_config(args: &Args) -> anyhow::Result<ManagerConfig> {
    let mut config = ManagerConfig::load(&args.config)?;

    if let Some(url) = &args.url {
        config.endpoint.url = url.clone();
    }
    if let Some(key) = &args.api_key {
        config.endpoint = config.endpoint.with_api_key(key.clone());
    }
    if let Some(ms) = args.timeout_ms {
        config = config.with_connect_timeout(Duration::from_millis(ms));
    }

    config.validate()?;
    Ok(config)
}

/// Resolve once the process is asked to stop (Ctrl+C or SIGTERM)
///
/// A signal that cannot be listened for is logged and never fires.
pub(crate) async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Cannot listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let received = tokio::select! {
        _ = interrupt => "SIGINT",
        _ = terminate => "SIGTERM",
    };
    info!("Received {}, shutting down", received);
}
