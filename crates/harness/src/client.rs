//! htsget protocol client

use std::time::Duration;

use htsprobe_common::{DataClass, Endpoint, Format, Ticket};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::QueryError;

/// Characters of a non-protocol error body kept for diagnostics
const ERROR_BODY_PREVIEW: usize = 500;

/// Optional query parameters for a ticket request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<Format>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<DataClass>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<u64>,
}

impl QueryParams {
    fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(format) = &self.format {
            pairs.push(("format", format.as_str().to_string()));
        }
        if let Some(class) = &self.class {
            pairs.push(("class", class.as_str().to_string()));
        }
        if let Some(name) = &self.reference_name {
            pairs.push(("referenceName", name.clone()));
        }
        if let Some(start) = self.start {
            pairs.push(("start", start.to_string()));
        }
        if let Some(end) = self.end {
            pairs.push(("end", end.to_string()));
        }
        pairs
    }
}

#[derive(Deserialize)]
struct Envelope<T> {
    htsget: T,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    message: String,
}

/// Client for one htsget server
#[derive(Clone)]
pub struct HtsgetClient {
    base_url: Url,
    client: reqwest::Client,
}

impl HtsgetClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, QueryError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Self::with_client(base_url, client)
    }

    pub fn with_client(base_url: &str, client: reqwest::Client) -> Result<Self, QueryError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| QueryError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(QueryError::InvalidUrl(format!(
                "{} cannot be used as a base URL",
                base_url
            )));
        }
        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    /// Underlying HTTP client, shared with segment fetching
    pub fn http(&self) -> &reqwest::Client {
        &self.client
    }

    /// `GET {base}/service-info`
    pub async fn service_info(&self) -> Result<serde_json::Value, QueryError> {
        let url = self.url(&["service-info"], &[])?;
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(rejection(status.as_u16(), &body));
        }
        serde_json::from_str(&body)
            .map_err(|e| QueryError::InvalidTicket(format!("service-info is not JSON: {}", e)))
    }

    /// Request a ticket for `id` on `endpoint`
    pub async fn query(
        &self,
        endpoint: Endpoint,
        id: &str,
        params: &QueryParams,
    ) -> Result<Ticket, QueryError> {
        let url = self.url(&[endpoint.as_str(), id], &params.pairs())?;
        info!(url = %url, "querying ticket");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status != reqwest::StatusCode::OK {
            let err = rejection(status.as_u16(), &body);
            warn!(status = status.as_u16(), error = %err, "ticket request failed");
            return Err(err);
        }

        let envelope: Envelope<Ticket> =
            serde_json::from_str(&body).map_err(|e| QueryError::InvalidTicket(e.to_string()))?;
        let ticket = envelope.htsget;
        debug!(
            format = %ticket.format,
            segments = ticket.segments.len(),
            "received ticket"
        );
        Ok(ticket)
    }

    fn url(&self, segments: &[&str], query: &[(&str, String)]) -> Result<Url, QueryError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| QueryError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in query {
                pairs.append_pair(name, value);
            }
        }
        Ok(url)
    }
}

/// Protocol error body if there is one, otherwise a status error
fn rejection(status: u16, body: &str) -> QueryError {
    match serde_json::from_str::<Envelope<ErrorBody>>(body) {
        Ok(envelope) => QueryError::Rejected {
            status,
            error: envelope.htsget.error,
            message: envelope.htsget.message,
        },
        Err(_) => QueryError::Status {
            status,
            body: body.chars().take(ERROR_BODY_PREVIEW).collect(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> HtsgetClient {
        HtsgetClient::new(base, Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_query_url_with_params() {
        let params = QueryParams {
            format: Some(Format::Cram),
            reference_name: Some("chr1".to_string()),
            start: Some(0),
            end: Some(1000),
            ..Default::default()
        };
        let url = client("http://127.0.0.1:8090")
            .url(&["reads", "sample1"], &params.pairs())
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:8090/reads/sample1?format=CRAM&referenceName=chr1&start=0&end=1000"
        );
    }

    #[test]
    fn test_base_path_and_id_escaping() {
        let url = client("http://h/api/")
            .url(&["variants", "a b/c"], &[])
            .unwrap();
        assert_eq!(url.as_str(), "http://h/api/variants/a%20b%2Fc");
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            HtsgetClient::new("not a url", Duration::from_secs(1)),
            Err(QueryError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_rejection_parsing() {
        let body = r#"{"htsget":{"error":"NotFound","message":"No such accession"}}"#;
        match rejection(404, body) {
            QueryError::Rejected {
                status,
                error,
                message,
            } => {
                assert_eq!(status, 404);
                assert_eq!(error, "NotFound");
                assert_eq!(message, "No such accession");
            }
            other => panic!("unexpected {:?}", other),
        }

        assert!(matches!(
            rejection(502, "<html>bad gateway</html>"),
            QueryError::Status { status: 502, .. }
        ));
    }
}
