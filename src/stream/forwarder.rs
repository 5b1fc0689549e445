//! Forwarding of agent log streams to the client.
//!
//! # Flow
//! ```text
//! open():   one GET to the endpoint (no retries)
//!           → connect/TLS failure   → Connect / TlsVerification (+ counter)
//!           → 3xx                   → RedirectNotAllowed, body untouched
//!           → non-2xx               → BackendStatus with capped body
//!           → 2xx                   → LogStream
//! copy_to(): backend chunk → sink write [→ flush] → next chunk
//!           → backend EOF           → Completed
//!           → token / sink closed   → Cancelled
//!           → backend read error    → Body (after flushing what was written)
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{HeaderValue, LOCATION};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::http::X_REQUEST_ID;
use crate::locator::Endpoint;
use crate::net::Transport;
use crate::observability::UsageTelemetry;
use crate::stream::checker::{classify_status, error_body_text, is_tls_verification_error, ResponseClass, MAX_ERROR_BODY_BYTES};

/// Error type for forwarding failures.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("invalid location for agent {agent}: {reason}")]
    InvalidLocation { agent: String, reason: String },

    #[error("redirects are not allowed: agent {agent} answered {status} (location: {})", .location.as_deref().unwrap_or("<none>"))]
    RedirectNotAllowed {
        agent: String,
        status: u16,
        location: Option<String>,
    },

    #[error("agent {agent} answered {status}: {body}")]
    BackendStatus { agent: String, status: u16, body: String },

    #[error("TLS verification of agent {agent} failed: {source}")]
    TlsVerification {
        agent: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to reach agent {agent}: {source}")]
    Connect {
        agent: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("agent {agent} did not answer within {timeout:?}")]
    Timeout { agent: String, timeout: Duration },

    #[error("stream from agent {agent} failed after {bytes} bytes: {source}")]
    Body {
        agent: String,
        bytes: u64,
        #[source]
        source: reqwest::Error,
    },

    #[error("request cancelled")]
    Cancelled,
}

/// How a stream ended, when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The agent closed the stream.
    Completed { bytes: u64 },
    /// The request was cancelled or the client went away.
    Cancelled { bytes: u64 },
}

impl StreamOutcome {
    pub fn bytes(&self) -> u64 {
        match self {
            StreamOutcome::Completed { bytes } | StreamOutcome::Cancelled { bytes } => *bytes,
        }
    }
}

/// Opens agent streams with redirect, status and TLS policy applied.
#[derive(Debug, Clone)]
pub struct Forwarder {
    telemetry: Arc<UsageTelemetry>,
    response_header_timeout: Duration,
}

impl Forwarder {
    pub fn new(telemetry: Arc<UsageTelemetry>, response_header_timeout: Duration) -> Self {
        Self {
            telemetry,
            response_header_timeout,
        }
    }

    /// Issue the single outbound request and check the response head.
    pub async fn open(
        &self,
        endpoint: &Endpoint,
        transport: Transport,
        request_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<LogStream, StreamError> {
        let agent = endpoint.agent.clone();
        let url = endpoint.url().map_err(|e| StreamError::InvalidLocation {
            agent: agent.clone(),
            reason: e.to_string(),
        })?;

        let mut request = transport.client().get(url);
        if let Some(token) = transport.bearer_token() {
            request = request.bearer_auth(token);
        }
        if let Some(id) = request_id.and_then(|id| HeaderValue::from_str(id).ok()) {
            request = request.header(X_REQUEST_ID, id);
        }

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(StreamError::Cancelled),
            result = tokio::time::timeout(self.response_header_timeout, request.send()) => match result {
                Err(_) => {
                    return Err(StreamError::Timeout {
                        agent,
                        timeout: self.response_header_timeout,
                    })
                }
                Ok(Err(source)) => return Err(self.classify_send_error(agent, source)),
                Ok(Ok(response)) => response,
            },
        };

        let status = response.status();
        match classify_status(status) {
            ResponseClass::Stream => {
                tracing::debug!(agent = %agent, status = %status, "Agent stream opened");
                Ok(LogStream {
                    agent,
                    response,
                    _transport: transport,
                })
            }
            ResponseClass::Redirect => {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                tracing::warn!(agent = %agent, status = %status, location = ?location, "Agent attempted redirect");
                Err(StreamError::RedirectNotAllowed {
                    agent,
                    status: status.as_u16(),
                    location,
                })
            }
            ResponseClass::Error => {
                let body = read_capped(response, cancel).await;
                tracing::warn!(agent = %agent, status = %status, "Agent rejected log request");
                Err(StreamError::BackendStatus {
                    agent,
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }

    fn classify_send_error(&self, agent: String, source: reqwest::Error) -> StreamError {
        if is_tls_verification_error(&source) {
            self.telemetry.record_tls_failure();
            tracing::warn!(agent = %agent, error = %source, "Agent TLS verification failed");
            StreamError::TlsVerification { agent, source }
        } else {
            tracing::warn!(agent = %agent, error = %source, "Agent connection failed");
            StreamError::Connect { agent, source }
        }
    }
}

async fn read_capped(response: reqwest::Response, cancel: &CancellationToken) -> String {
    let mut body = Vec::new();
    let mut chunks = std::pin::pin!(response.bytes_stream());
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = chunks.next() => next,
        };
        match next {
            Some(Ok(chunk)) => {
                body.extend_from_slice(&chunk);
                if body.len() >= MAX_ERROR_BODY_BYTES {
                    break;
                }
            }
            Some(Err(e)) => {
                tracing::debug!(error = %e, "Failed reading agent error body");
                break;
            }
            None => break,
        }
    }
    error_body_text(&body)
}

/// An open agent stream. Dropping it closes the agent connection.
#[derive(Debug)]
pub struct LogStream {
    agent: String,
    response: reqwest::Response,
    _transport: Transport,
}

impl LogStream {
    pub fn agent(&self) -> &str {
        &self.agent
    }

    /// Copy the agent's bytes to `sink` in order and unmodified.
    ///
    /// With `flush_per_write` every chunk is flushed before the next read.
    /// A write error means the client is gone and ends the copy as
    /// cancelled. The agent connection is closed on return in every case.
    pub async fn copy_to<W>(
        self,
        sink: &mut W,
        flush_per_write: bool,
        cancel: &CancellationToken,
    ) -> Result<StreamOutcome, StreamError>
    where
        W: AsyncWrite + Unpin,
    {
        let agent = self.agent;
        let mut body = std::pin::pin!(self.response.bytes_stream());
        let mut bytes: u64 = 0;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let _ = sink.flush().await;
                    return Ok(StreamOutcome::Cancelled { bytes });
                }
                next = body.next() => next,
            };

            let chunk = match next {
                None => {
                    if sink.flush().await.is_err() {
                        return Ok(StreamOutcome::Cancelled { bytes });
                    }
                    tracing::debug!(agent = %agent, bytes, "Agent closed stream");
                    return Ok(StreamOutcome::Completed { bytes });
                }
                Some(Err(source)) => {
                    let _ = sink.flush().await;
                    return Err(StreamError::Body { agent, bytes, source });
                }
                Some(Ok(chunk)) => chunk,
            };

            let written = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(StreamOutcome::Cancelled { bytes }),
                result = write_chunk(sink, &chunk, flush_per_write) => result,
            };
            if let Err(e) = written {
                tracing::debug!(agent = %agent, bytes, error = %e, "Client went away");
                return Ok(StreamOutcome::Cancelled { bytes });
            }
            bytes += chunk.len() as u64;
        }
    }
}

async fn write_chunk<W>(sink: &mut W, chunk: &[u8], flush: bool) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    sink.write_all(chunk).await?;
    if flush {
        sink.flush().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AgentConnectionConfig, AgentScheme, TimeoutConfig};
    use crate::net::TransportBuilder;
    use std::net::SocketAddr;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Serve one connection with a canned response, then close.
    async fn serve_once(response: Vec<u8>) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let _ = socket.write_all(&response).await;
            let _ = socket.shutdown().await;
        });
        addr
    }

    /// Serve chunked output until the peer disconnects, then report it.
    async fn serve_forever(closed: oneshot::Sender<()>) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let head = b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nTransfer-Encoding: chunked\r\n\r\n";
            if socket.write_all(head).await.is_err() {
                return;
            }
            loop {
                if socket.write_all(b"5\r\ntick\n\r\n").await.is_err() {
                    let _ = closed.send(());
                    return;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        });
        addr
    }

    fn endpoint(addr: SocketAddr) -> Endpoint {
        Endpoint {
            agent: "agent-a".into(),
            scheme: AgentScheme::Http,
            host: addr.ip().to_string(),
            port: addr.port(),
            path: "/containerLogs/default/web-1/nginx".into(),
            query: Vec::new(),
        }
    }

    fn transport(endpoint: &Endpoint) -> Transport {
        TransportBuilder::new(AgentConnectionConfig::default(), &TimeoutConfig::default())
            .build(endpoint, false)
            .unwrap()
    }

    fn forwarder() -> (Forwarder, Arc<UsageTelemetry>) {
        let telemetry = Arc::new(UsageTelemetry::new());
        (Forwarder::new(telemetry.clone(), Duration::from_secs(5)), telemetry)
    }

    /// Sink that records the order of writes and flushes.
    #[derive(Default)]
    struct RecordingSink {
        events: Vec<String>,
        data: Vec<u8>,
    }

    impl AsyncWrite for RecordingSink {
        fn poll_write(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
            self.events.push("write".into());
            self.data.extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            self.events.push("flush".into());
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn success_body_copied_verbatim() {
        let addr = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 12\r\nConnection: close\r\n\r\nline1\nline2\n".to_vec(),
        )
        .await;
        let endpoint = endpoint(addr);
        let (forwarder, _) = forwarder();
        let cancel = CancellationToken::new();

        let stream = forwarder.open(&endpoint, transport(&endpoint), None, &cancel).await.unwrap();
        let mut sink = Vec::new();
        let outcome = stream.copy_to(&mut sink, false, &cancel).await.unwrap();

        assert_eq!(outcome, StreamOutcome::Completed { bytes: 12 });
        assert_eq!(sink, b"line1\nline2\n");
    }

    #[tokio::test]
    async fn truncated_body_fails_after_delivering_received_bytes() {
        let addr = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 100\r\nConnection: close\r\n\r\nline1\nline2\n".to_vec(),
        )
        .await;
        let endpoint = endpoint(addr);
        let (forwarder, _) = forwarder();
        let cancel = CancellationToken::new();

        let stream = forwarder.open(&endpoint, transport(&endpoint), None, &cancel).await.unwrap();
        let mut sink = Vec::new();
        let err = stream.copy_to(&mut sink, false, &cancel).await.unwrap_err();

        match err {
            StreamError::Body { agent, bytes, .. } => {
                assert_eq!(agent, "agent-a");
                assert_eq!(bytes, 12);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(sink, b"line1\nline2\n");
    }

    #[tokio::test]
    async fn redirect_is_refused() {
        let addr = serve_once(
            b"HTTP/1.1 302 Found\r\nLocation: http://elsewhere.example/\r\nContent-Length: 9\r\nConnection: close\r\n\r\nredirect!".to_vec(),
        )
        .await;
        let endpoint = endpoint(addr);
        let (forwarder, _) = forwarder();

        let err = forwarder
            .open(&endpoint, transport(&endpoint), None, &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            StreamError::RedirectNotAllowed { status, location, .. } => {
                assert_eq!(status, 302);
                assert_eq!(location.as_deref(), Some("http://elsewhere.example/"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn error_status_carries_body() {
        let addr = serve_once(
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 20\r\nConnection: close\r\n\r\ncontainer not found\n".to_vec(),
        )
        .await;
        let endpoint = endpoint(addr);
        let (forwarder, _) = forwarder();

        let err = forwarder
            .open(&endpoint, transport(&endpoint), None, &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            StreamError::BackendStatus { status, body, .. } => {
                assert_eq!(status, 404);
                assert_eq!(body, "container not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn connection_refused_is_not_a_tls_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let endpoint = endpoint(addr);
        let (forwarder, telemetry) = forwarder();
        let err = forwarder
            .open(&endpoint, transport(&endpoint), None, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, StreamError::Connect { .. }));
        assert_eq!(telemetry.tls_failures(crate::observability::MetricGeneration::Current), 0);
    }

    #[tokio::test]
    async fn follow_mode_flushes_every_chunk() {
        let (closed_tx, _closed_rx) = oneshot::channel();
        let addr = serve_forever(closed_tx).await;
        let endpoint = endpoint(addr);
        let (forwarder, _) = forwarder();
        let cancel = CancellationToken::new();

        let stream = forwarder.open(&endpoint, transport(&endpoint), None, &cancel).await.unwrap();
        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            stopper.cancel();
        });

        let mut sink = RecordingSink::default();
        let outcome = stream.copy_to(&mut sink, true, &cancel).await.unwrap();
        assert!(matches!(outcome, StreamOutcome::Cancelled { .. }));
        assert!(sink.data.starts_with(b"tick\n"));

        // Every write is followed by a flush before the next write.
        let mut previous = "flush";
        for event in &sink.events {
            if event == "write" {
                assert_eq!(previous, "flush");
            }
            previous = event;
        }
    }

    #[tokio::test]
    async fn cancellation_closes_agent_connection() {
        let (closed_tx, closed_rx) = oneshot::channel();
        let addr = serve_forever(closed_tx).await;
        let endpoint = endpoint(addr);
        let (forwarder, _) = forwarder();
        let cancel = CancellationToken::new();

        let stream = forwarder.open(&endpoint, transport(&endpoint), None, &cancel).await.unwrap();
        let copy = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let mut sink = Vec::new();
                stream.copy_to(&mut sink, true, &cancel).await
            })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();

        let outcome = copy.await.unwrap().unwrap();
        assert!(matches!(outcome, StreamOutcome::Cancelled { bytes } if bytes > 0));
        tokio::time::timeout(Duration::from_secs(5), closed_rx)
            .await
            .expect("agent connection left open")
            .unwrap();
    }

    #[tokio::test]
    async fn cancelled_before_open() {
        let (closed_tx, _closed_rx) = oneshot::channel();
        let addr = serve_forever(closed_tx).await;
        let endpoint = endpoint(addr);
        let (forwarder, _) = forwarder();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = forwarder.open(&endpoint, transport(&endpoint), None, &cancel).await.unwrap_err();
        assert!(matches!(err, StreamError::Cancelled));
    }
}
