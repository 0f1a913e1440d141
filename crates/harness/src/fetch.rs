//! Fetching individual ticket segments

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use htsprobe_common::Segment;
use tracing::{debug, warn};

use crate::error::FetchError;

/// Bytes of one segment plus what the server said about them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentBody {
    pub bytes: Bytes,
    pub status: u16,
    /// Advisory only; never used to interpret the bytes
    pub content_type: Option<String>,
}

/// Transport used to GET a segment URL
///
/// Non-2xx responses are failures.
#[async_trait]
pub trait SegmentTransport: Send + Sync {
    async fn get(
        &self,
        url: &str,
        headers: &BTreeMap<String, String>,
    ) -> Result<SegmentBody, FetchError>;
}

/// reqwest-backed transport
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Transport(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SegmentTransport for HttpTransport {
    async fn get(
        &self,
        url: &str,
        headers: &BTreeMap<String, String>,
    ) -> Result<SegmentBody, FetchError> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status = status.as_u16(), "segment fetch returned error status");
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Body(e.to_string()))?;

        debug!(url = %url, status = status.as_u16(), bytes = bytes.len(), "fetched segment");
        Ok(SegmentBody {
            bytes,
            status: status.as_u16(),
            content_type,
        })
    }
}

/// Fetches one segment, decoding `data:` URIs locally
#[derive(Clone)]
pub struct SegmentFetcher {
    transport: Arc<dyn SegmentTransport>,
}

impl SegmentFetcher {
    pub fn new(transport: Arc<dyn SegmentTransport>) -> Self {
        Self { transport }
    }

    pub async fn fetch(&self, segment: &Segment) -> Result<SegmentBody, FetchError> {
        if segment.is_inline() {
            let body = decode_data_uri(&segment.url)?;
            debug!(bytes = body.bytes.len(), class = %segment.class, "decoded inline segment");
            return Ok(body);
        }
        self.transport.get(&segment.url, &segment.headers).await
    }
}

/// `data:[<mediatype>][;base64],<data>`
fn decode_data_uri(uri: &str) -> Result<SegmentBody, FetchError> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| FetchError::InvalidDataUri("missing data: scheme".to_string()))?;
    let (meta, data) = rest
        .split_once(',')
        .ok_or_else(|| FetchError::InvalidDataUri("missing ',' separator".to_string()))?;

    let (media_type, is_base64) = match meta.strip_suffix(";base64") {
        Some(media_type) => (media_type, true),
        None => (meta, false),
    };

    let bytes = if is_base64 {
        STANDARD
            .decode(data)
            .map_err(|e| FetchError::InvalidDataUri(e.to_string()))?
    } else {
        percent_decode(data)?
    };

    Ok(SegmentBody {
        bytes: Bytes::from(bytes),
        status: 200,
        content_type: (!media_type.is_empty()).then(|| media_type.to_string()),
    })
}

fn percent_decode(data: &str) -> Result<Vec<u8>, FetchError> {
    let raw = data.as_bytes();
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'%' {
            let hex = raw
                .get(i + 1..i + 3)
                .and_then(|h| std::str::from_utf8(h).ok())
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or_else(|| {
                    FetchError::InvalidDataUri(format!("bad percent escape at offset {}", i))
                })?;
            out.push(hex);
            i += 3;
        } else {
            out.push(raw[i]);
            i += 1;
        }
    }
    Ok(out)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use parking_lot::Mutex;

    /// In-memory transport recording every requested URL
    #[derive(Default)]
    pub struct FakeTransport {
        bodies: BTreeMap<String, Result<Vec<u8>, u16>>,
        pub requests: Mutex<Vec<(String, BTreeMap<String, String>)>>,
    }

    impl FakeTransport {
        pub fn with(mut self, url: &str, body: &[u8]) -> Self {
            self.bodies.insert(url.to_string(), Ok(body.to_vec()));
            self
        }

        pub fn failing(mut self, url: &str, status: u16) -> Self {
            self.bodies.insert(url.to_string(), Err(status));
            self
        }

        pub fn requested_urls(&self) -> Vec<String> {
            self.requests.lock().iter().map(|(u, _)| u.clone()).collect()
        }
    }

    #[async_trait]
    impl SegmentTransport for FakeTransport {
        async fn get(
            &self,
            url: &str,
            headers: &BTreeMap<String, String>,
        ) -> Result<SegmentBody, FetchError> {
            self.requests
                .lock()
                .push((url.to_string(), headers.clone()));
            match self.bodies.get(url) {
                Some(Ok(bytes)) => Ok(SegmentBody {
                    bytes: Bytes::from(bytes.clone()),
                    status: 200,
                    content_type: Some("application/octet-stream".to_string()),
                }),
                Some(Err(status)) => Err(FetchError::Status { status: *status }),
                None => Err(FetchError::Transport(format!("connection refused: {}", url))),
            }
        }
    }
}
