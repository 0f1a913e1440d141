//! Readiness probing

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, trace};

/// One readiness check against a server
///
/// Implementations must bound their own duration by `timeout`; the
/// supervisor never waits on a probe longer than that.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, base_url: &str, timeout: Duration) -> bool;
}

/// `GET {base}/service-info`, ready when it answers 200
#[derive(Clone, Default)]
pub struct HttpHealthProbe {
    client: reqwest::Client,
}

impl HttpHealthProbe {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self, base_url: &str, timeout: Duration) -> bool {
        let url = format!("{}/service-info", base_url.trim_end_matches('/'));
        match self.client.get(&url).timeout(timeout).send().await {
            Ok(resp) if resp.status() == reqwest::StatusCode::OK => true,
            Ok(resp) => {
                debug!(status = resp.status().as_u16(), "readiness probe not ready");
                false
            }
            Err(e) => {
                // Connection refused is expected while the server is starting
                if e.is_connect() {
                    trace!(url = %url, "readiness probe: connection refused");
                } else {
                    debug!(url = %url, error = %e, "readiness probe failed");
                }
                false
            }
        }
    }
}
