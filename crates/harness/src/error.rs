//! Error types for the harness

use std::process::ExitStatus;
use std::time::Duration;

use htsprobe_common::DecodeError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures of the server process lifecycle
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server not ready after {attempts} probe(s) in {elapsed:?}")]
    ReadinessTimeout { attempts: u32, elapsed: Duration },

    #[error("server exited before becoming ready ({status})")]
    PrematureExit {
        status: ExitStatus,
        /// Most recent output lines, both streams interleaved as received
        output: Vec<String>,
    },

    #[error("failed to signal pid {pid}: {reason}")]
    Signal { pid: u32, reason: String },

    #[error("process I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure fetching a single segment
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP {status}")]
    Status { status: u16 },

    #[error("invalid data URI: {0}")]
    InvalidDataUri(String),

    #[error("failed to read body: {0}")]
    Body(String),
}

/// Failure turning a ticket into one payload
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("segment {index} ({url}) failed: {cause}")]
    SegmentFetch {
        index: usize,
        url: String,
        #[source]
        cause: FetchError,
    },

    #[error("ticket lists no segments")]
    EmptyTicket,
}

/// Failure issuing a protocol query
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server rejected query (HTTP {status}): {error}: {message}")]
    Rejected {
        status: u16,
        error: String,
        message: String,
    },

    #[error("unexpected HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid ticket: {0}")]
    InvalidTicket(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl QueryError {
    /// Whether the server could not be reached at all
    pub fn is_unreachable(&self) -> bool {
        matches!(self, QueryError::Transport(e) if e.is_connect() || e.is_timeout())
    }
}

/// Which side of the conversation a failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorLayer {
    /// The server process, or reaching it
    Server,
    /// A query, its ticket, or the data it pointed at
    Query,
    /// Local configuration, files, or reports
    Harness,
}

impl std::fmt::Display for ErrorLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorLayer::Server => write!(f, "server"),
            ErrorLayer::Query => write!(f, "query"),
            ErrorLayer::Harness => write!(f, "harness"),
        }
    }
}

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("scenario error: {0}")]
    Scenario(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl HarnessError {
    pub fn layer(&self) -> ErrorLayer {
        match self {
            HarnessError::Supervisor(_) => ErrorLayer::Server,
            HarnessError::Query(e) if e.is_unreachable() => ErrorLayer::Server,
            HarnessError::Query(_)
            | HarnessError::Fetch(_)
            | HarnessError::Resolve(_)
            | HarnessError::Decode(_) => ErrorLayer::Query,
            HarnessError::Scenario(_)
            | HarnessError::Config(_)
            | HarnessError::Io(_)
            | HarnessError::Json(_)
            | HarnessError::Yaml(_) => ErrorLayer::Harness,
        }
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;
