//! HTTP server setup.
//!
//! No request timeout layer is installed: follow streams stay open for as
//! long as the client and agent keep them open.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::config::RelayConfig;
use crate::http::handlers::{self, AppState};
use crate::http::request::{make_request_span, propagate_request_id_layer, set_request_id_layer};
use crate::locator::{Locate, RegistryLocator};
use crate::logs::LogService;
use crate::net::TransportBuilder;
use crate::observability::UsageTelemetry;
use crate::registry::SnapshotRegistry;
use crate::stream::{Forwarder, StreamTracker};

/// How long shutdown waits for in-flight streams after cancelling them.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

pub const LOG_ROUTE: &str = "/api/v1/namespaces/{namespace}/workloads/{name}/log";

/// HTTP server for the log relay.
pub struct HttpServer {
    router: Router,
    tracker: StreamTracker,
    shutdown: CancellationToken,
}

impl HttpServer {
    /// Create a server resolving workloads through the registry.
    pub fn new(config: &RelayConfig, registry: Arc<SnapshotRegistry>, telemetry: Arc<UsageTelemetry>) -> Self {
        let locator: Arc<dyn Locate> = Arc::new(RegistryLocator::new(registry.clone()));
        Self::with_locator(config, registry, locator, telemetry)
    }

    /// Create a server with an explicit locator.
    pub fn with_locator(
        config: &RelayConfig,
        registry: Arc<SnapshotRegistry>,
        locator: Arc<dyn Locate>,
        telemetry: Arc<UsageTelemetry>,
    ) -> Self {
        let service = LogService::new(
            locator,
            TransportBuilder::new(config.agents.clone(), &config.timeouts),
            Forwarder::new(
                telemetry.clone(),
                Duration::from_secs(config.timeouts.response_header_secs),
            ),
            telemetry.clone(),
        );

        let tracker = StreamTracker::new(telemetry);
        let shutdown = CancellationToken::new();
        let state = AppState {
            service: Arc::new(service),
            registry,
            tracker: tracker.clone(),
            shutdown: shutdown.clone(),
        };

        Self {
            router: Self::build_router(state),
            tracker,
            shutdown,
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route(LOG_ROUTE, get(handlers::stream_logs))
            .route("/healthz", get(handlers::healthz))
            .route("/status", get(handlers::status))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(set_request_id_layer())
                    .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
                    .layer(propagate_request_id_layer()),
            )
    }

    /// The router, for serving it elsewhere.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Cancel every in-flight stream.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Serve plain HTTP until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let token = self.shutdown.clone();
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown requested, cancelling streams");
                token.cancel();
            })
            .await?;

        drain(&self.tracker).await;
        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Serve HTTPS until `shutdown` fires.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: RustlsConfig,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        tracing::info!(address = %addr, "HTTPS server starting");

        let handle = axum_server::Handle::new();
        let token = self.shutdown.clone();
        {
            let handle = handle.clone();
            tokio::spawn(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown requested, cancelling streams");
                token.cancel();
                handle.graceful_shutdown(Some(DRAIN_TIMEOUT));
            });
        }

        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(self.router.into_make_service())
            .await?;

        drain(&self.tracker).await;
        tracing::info!("HTTPS server stopped");
        Ok(())
    }
}

async fn drain(tracker: &StreamTracker) {
    if tokio::time::timeout(DRAIN_TIMEOUT, tracker.wait_for_drain()).await.is_err() {
        tracing::warn!(active = tracker.active_count(), "Streams still active after drain timeout");
    }
}
