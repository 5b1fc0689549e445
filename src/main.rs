use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use log_relay::config::{load_config, AgentScheme, RelayConfig};
use log_relay::http::HttpServer;
use log_relay::lifecycle::{shutdown_signal, Shutdown};
use log_relay::net::tls::{install_crypto_provider, load_tls_config};
use log_relay::observability::logging::init_logging;
use log_relay::observability::metrics::init_exporter;
use log_relay::observability::UsageTelemetry;
use log_relay::registry::{load_snapshot, RegistryWatcher, SnapshotRegistry};

#[derive(Parser)]
#[command(name = "log-relay")]
#[command(about = "Streams workload logs from the agent hosting them", long_about = None)]
struct Args {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => RelayConfig::default(),
    };

    init_logging(&config.observability);
    install_crypto_provider();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        snapshot = %config.registry.snapshot_path,
        agent_port = config.agents.port,
        agent_scheme = config.agents.scheme.as_str(),
        "log-relay starting"
    );

    if config.agents.scheme == AgentScheme::Http && config.agents.bearer_token.is_some() {
        tracing::warn!("Bearer token is only sent to agents reached over https");
    }

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => init_exporter(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let snapshot_path = Path::new(&config.registry.snapshot_path);
    let snapshot = load_snapshot(snapshot_path, &config.agents)?;
    tracing::info!(
        agents = snapshot.agent_count(),
        workloads = snapshot.workload_count(),
        "Registry snapshot loaded"
    );
    let registry = Arc::new(SnapshotRegistry::new(snapshot));

    // Held for the process lifetime; dropping it stops the watch.
    let _watcher = if config.registry.watch {
        let watcher = RegistryWatcher::new(snapshot_path, registry.clone(), config.agents.clone());
        Some(watcher.run()?)
    } else {
        None
    };

    let telemetry = Arc::new(UsageTelemetry::new());
    let server = HttpServer::new(&config, registry, telemetry);

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.trigger();
    });

    match &config.listener.tls {
        Some(tls) => {
            let addr: SocketAddr = config.listener.bind_address.parse()?;
            let rustls = load_tls_config(Path::new(&tls.cert_path), Path::new(&tls.key_path)).await?;
            server.run_tls(addr, rustls, receiver).await?;
        }
        None => {
            let listener = TcpListener::bind(&config.listener.bind_address).await?;
            server.run(listener, receiver).await?;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
