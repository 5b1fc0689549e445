//! Log request options.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const STREAM_ALL: &str = "All";
pub const STREAM_STDOUT: &str = "Stdout";
pub const STREAM_STDERR: &str = "Stderr";

/// Options accepted by the log endpoint, one field per query parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogOptions {
    /// Container to read from. May be omitted for single-container workloads.
    pub container: Option<String>,
    /// Keep the stream open and forward new output as it is produced.
    pub follow: bool,
    /// Read the logs of the previous, terminated instance of the container.
    pub previous: bool,
    /// Relative start of the window, in seconds before now.
    pub since_seconds: Option<i64>,
    /// Absolute start of the window.
    pub since_time: Option<DateTime<Utc>>,
    /// Absolute end of the window.
    pub until_time: Option<DateTime<Utc>>,
    /// Prefix each line with its timestamp.
    pub timestamps: bool,
    /// Number of lines from the end of the log to start with.
    pub tail_lines: Option<i64>,
    /// Upper bound on bytes returned by the agent.
    pub limit_bytes: Option<i64>,
    /// Which output stream to read: `All`, `Stdout` or `Stderr`.
    pub stream: Option<String>,
    /// Accept whatever serving certificate the agent presents.
    #[serde(rename = "insecureSkipTLSVerifyBackend")]
    pub insecure_skip_tls_verify_backend: bool,
}

impl LogOptions {
    /// The selected stream if it narrows output to stdout or stderr.
    pub fn specific_stream(&self) -> Option<&str> {
        self.stream.as_deref().filter(|s| *s != STREAM_ALL)
    }

    /// Follow-mode output is flushed per write to keep tailing latency low.
    pub fn flush_per_write(&self) -> bool {
        self.follow
    }
}
