//! Child output relays
//!
//! One task per output stream reads lines and publishes them as
//! [`ServerEvent::Log`] on the supervisor's broadcast channel. Lines within
//! a stream keep their order; there is no ordering across streams.

use std::collections::VecDeque;
use std::sync::Arc;

use htsprobe_common::ServerState;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamKind::Stdout => write!(f, "stdout"),
            StreamKind::Stderr => write!(f, "stderr"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub stream: StreamKind,
    pub line: String,
}

/// Everything observable about a supervised server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    Log(LogLine),
    State { state: ServerState },
}

/// Most recent output lines across both streams
///
/// Kept so a server that dies during startup can be diagnosed without a
/// subscriber having been attached.
pub(crate) struct OutputTail {
    lines: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl OutputTail {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            lines: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub(crate) fn push(&self, line: String) {
        let mut lines = self.lines.lock();
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    pub(crate) fn snapshot(&self) -> Vec<String> {
        self.lines.lock().iter().cloned().collect()
    }

    pub(crate) fn clear(&self) {
        self.lines.lock().clear();
    }
}

/// Spawn a relay draining `reader` until end of stream or cancellation
///
/// A cancelled relay publishes nothing further and drops its stream.
pub(crate) fn spawn_relay<R>(
    stream: StreamKind,
    reader: R,
    events: broadcast::Sender<ServerEvent>,
    tail: Arc<OutputTail>,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::with_capacity(256);
        loop {
            buf.clear();
            let read = tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!(%stream, "relay cancelled");
                    break;
                }

                read = reader.read_until(b'\n', &mut buf) => read,
            };

            match read {
                Ok(0) => {
                    debug!(%stream, "relay reached end of stream");
                    break;
                }
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf)
                        .trim_end_matches(['\n', '\r'])
                        .to_string();
                    debug!(target: "htsprobe::server", %stream, "{}", line);
                    tail.push(line.clone());
                    // No subscribers is fine
                    let _ = events.send(ServerEvent::Log(LogLine { stream, line }));
                }
                Err(e) => {
                    warn!(%stream, error = %e, "relay read failed");
                    break;
                }
            }
        }
    })
}
