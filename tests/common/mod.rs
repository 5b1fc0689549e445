//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;

use log_relay::config::{AgentScheme, RelayConfig};
use log_relay::http::HttpServer;
use log_relay::lifecycle::Shutdown;
use log_relay::observability::UsageTelemetry;
use log_relay::registry::{Agent, RegistrySnapshot, SnapshotFile, SnapshotRegistry, Workload};

/// Start a mock agent that answers every connection with `response`
/// verbatim. The head of each received request is sent on the returned
/// channel.
pub async fn start_mock_agent(response: &'static [u8]) -> (SocketAddr, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        let mut buf = vec![0u8; 8192];
                        let n = socket.read(&mut buf).await.unwrap_or(0);
                        let _ = tx.send(String::from_utf8_lossy(&buf[..n]).into_owned());
                        let _ = socket.write_all(response).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    (addr, rx)
}

/// Start a mock agent streaming `tick\n` chunks until the peer goes away,
/// then report the disconnect.
pub async fn start_endless_agent() -> (SocketAddr, mpsc::UnboundedReceiver<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; 8192];
                let _ = socket.read(&mut buf).await;
                let head = b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nTransfer-Encoding: chunked\r\n\r\n";
                if socket.write_all(head).await.is_err() {
                    return;
                }
                loop {
                    if socket.write_all(b"5\r\ntick\n\r\n").await.is_err() {
                        let _ = tx.send(());
                        return;
                    }
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
            });
        }
    });

    (addr, rx)
}

/// Start a mock agent that sends the response head and one chunk, then
/// stays silent. Reports when the relay closes the connection.
pub async fn start_silent_agent() -> (SocketAddr, mpsc::UnboundedReceiver<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; 8192];
                let _ = socket.read(&mut buf).await;
                let head = b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nTransfer-Encoding: chunked\r\n\r\n5\r\ntick\n\r\n";
                if socket.write_all(head).await.is_err() {
                    return;
                }
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => {
                            let _ = tx.send(());
                            return;
                        }
                        Ok(_) => {}
                    }
                }
            });
        }
    });

    (addr, rx)
}

/// Start an https agent with a self-signed certificate answering every
/// request with `hello\n`.
pub async fn start_tls_agent() -> SocketAddr {
    log_relay::net::tls::install_crypto_provider();
    let fixtures = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");
    let config = RustlsConfig::from_pem_file(
        format!("{}/agent.pem", fixtures),
        format!("{}/agent-key.pem", fixtures),
    )
    .await
    .unwrap();

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().fallback(|| async { "hello\n" });
    tokio::spawn(async move {
        let _ = axum_server::from_tcp_rustls(listener, config)
            .serve(app.into_make_service())
            .await;
    });

    addr
}

/// Registry with agent `agent-a` at `agent_addr` (plain http) hosting
/// `default/web-1` (container `app`), plus unscheduled `default/pending`.
pub fn registry_for(agent_addr: SocketAddr) -> Arc<SnapshotRegistry> {
    registry_with_scheme(agent_addr, AgentScheme::Http)
}

/// Same layout as [`registry_for`], reaching the agent over `scheme`.
pub fn registry_with_scheme(agent_addr: SocketAddr, scheme: AgentScheme) -> Arc<SnapshotRegistry> {
    let file = SnapshotFile {
        agents: vec![Agent {
            name: "agent-a".into(),
            address: agent_addr.ip().to_string(),
            port: Some(agent_addr.port()),
            scheme: Some(scheme),
        }],
        workloads: vec![
            Workload {
                namespace: "default".into(),
                name: "web-1".into(),
                containers: vec!["app".into()],
                agent: Some("agent-a".into()),
            },
            Workload {
                namespace: "default".into(),
                name: "pending".into(),
                containers: vec!["app".into()],
                agent: None,
            },
        ],
    };
    let snapshot = RegistrySnapshot::build(file, &RelayConfig::default().agents).unwrap();
    Arc::new(SnapshotRegistry::new(snapshot))
}

/// A running relay.
pub struct Relay {
    pub addr: SocketAddr,
    pub telemetry: Arc<UsageTelemetry>,
    pub shutdown: Shutdown,
    pub server: tokio::task::JoinHandle<Result<(), std::io::Error>>,
}

impl Relay {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn log_url(&self, name: &str, query: &str) -> String {
        self.url(&format!("/api/v1/namespaces/default/workloads/{}/log{}", name, query))
    }
}

/// Start a relay on an ephemeral port in front of `registry`.
pub async fn start_relay(registry: Arc<SnapshotRegistry>) -> Relay {
    log_relay::net::tls::install_crypto_provider();
    let config = RelayConfig::default();
    let telemetry = Arc::new(UsageTelemetry::new());
    let server = HttpServer::new(&config, registry, telemetry.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    let server = tokio::spawn(server.run(listener, receiver));

    Relay {
        addr,
        telemetry,
        shutdown,
        server,
    }
}

/// Client that never reuses connections between tests.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .build()
        .unwrap()
}
