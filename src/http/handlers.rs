//! Request handlers.

use std::io;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::{stream, StreamExt};
use serde::Serialize;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::oneshot;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;

use crate::error::LogError;
use crate::http::request::request_id;
use crate::logs::{LogOptions, LogService};
use crate::registry::SnapshotRegistry;
use crate::stream::{LogStream, StreamOutcome, StreamTracker};

/// Capacity of the in-memory pipe between the copy loop and the response body.
const PIPE_CAPACITY: usize = 64 * 1024;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<LogService>,
    pub registry: Arc<SnapshotRegistry>,
    pub tracker: StreamTracker,
    /// Parent of every stream's cancellation token; cancelled on shutdown.
    pub shutdown: CancellationToken,
}

/// `GET /api/v1/namespaces/{namespace}/workloads/{name}/log`
pub async fn stream_logs(
    State(state): State<AppState>,
    method: Method,
    Path((namespace, name)): Path<(String, String)>,
    headers: HeaderMap,
    query: Result<Query<LogOptions>, QueryRejection>,
) -> Response {
    let telemetry = state.service.telemetry().clone();
    let verb = method.as_str();

    let options = match query {
        Ok(Query(options)) => options,
        Err(rejection) => {
            let err = LogError::BadQuery(rejection.body_text());
            telemetry.record_request(verb, err.status().0.as_u16());
            return err.into_response();
        }
    };

    let request_id = request_id(&headers).map(str::to_string);
    let cancel = state.shutdown.child_token();

    let stream = match state
        .service
        .open(&namespace, &name, &options, request_id.as_deref(), &cancel)
        .await
    {
        Ok(stream) => stream,
        Err(err) => {
            let (code, reason) = err.status();
            tracing::info!(
                namespace = %namespace,
                name = %name,
                code = code.as_u16(),
                reason,
                error = %err,
                "Log request failed"
            );
            telemetry.record_request(verb, code.as_u16());
            return err.into_response();
        }
    };

    telemetry.record_request(verb, StatusCode::OK.as_u16());
    tracing::info!(
        namespace = %namespace,
        name = %name,
        agent = stream.agent(),
        follow = options.follow,
        "Streaming logs"
    );

    let body = spawn_copy(stream, &state.tracker, options.flush_per_write(), cancel);
    let mut response = Response::new(body);
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// Run the copy loop in its own task, feeding a pipe that backs the
/// response body. A mid-stream agent failure surfaces as a body error
/// after everything already copied has been delivered. Dropping the body
/// cancels the copy loop.
fn spawn_copy(stream: LogStream, tracker: &StreamTracker, flush_per_write: bool, cancel: CancellationToken) -> Body {
    let (reader, writer) = tokio::io::duplex(PIPE_CAPACITY);
    let (failure_tx, failure_rx) = oneshot::channel::<io::Error>();
    let guard = tracker.track();
    let cancel_on_drop = cancel.clone().drop_guard();

    tokio::spawn(async move {
        let agent = stream.agent().to_string();
        let mut writer = BufWriter::new(writer);
        match stream.copy_to(&mut writer, flush_per_write, &cancel).await {
            Ok(StreamOutcome::Completed { bytes }) => {
                let _ = writer.shutdown().await;
                tracing::debug!(stream_id = guard.id(), agent = %agent, bytes, "Log stream completed");
            }
            Ok(StreamOutcome::Cancelled { bytes }) => {
                tracing::debug!(stream_id = guard.id(), agent = %agent, bytes, "Log stream cancelled");
            }
            Err(err) => {
                tracing::warn!(stream_id = guard.id(), agent = %agent, error = %err, "Log stream failed");
                let _ = failure_tx.send(io::Error::other(err.to_string()));
            }
        }
    });

    // Held by the body; an idle follow stream stops when the client leaves.
    let failure = stream::once(async move {
        let _cancel_on_drop = cancel_on_drop;
        failure_rx.await
    })
    .filter_map(|received| async move { received.ok().map(Err::<Bytes, io::Error>) });
    Body::from_stream(ReaderStream::new(reader).chain(failure))
}

/// `GET /healthz`
pub async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Serialize)]
pub struct RelayStatus {
    pub version: &'static str,
    pub registry_generation: u64,
    pub agents: usize,
    pub workloads: usize,
    pub active_streams: u64,
}

/// `GET /status`
pub async fn status(State(state): State<AppState>) -> Json<RelayStatus> {
    let snapshot = state.registry.current();
    Json(RelayStatus {
        version: env!("CARGO_PKG_VERSION"),
        registry_generation: state.registry.generation(),
        agents: snapshot.agent_count(),
        workloads: snapshot.workload_count(),
        active_streams: state.tracker.active_count(),
    })
}
