//! Scenario runner: query, resolve, decode and check

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use htsprobe_common::{decode, DecodedSummary, Ticket};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::client::HtsgetClient;
use crate::error::{ErrorLayer, HarnessError, HarnessResult};
use crate::fetch::{HttpTransport, SegmentFetcher};
use crate::resolver::TicketResolver;
use crate::scenario::{Expectations, Scenario};
use crate::server::ProcessSupervisor;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

impl CheckResult {
    fn new(name: &str, passed: bool, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            passed,
            detail: detail.into(),
        }
    }
}

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub checks: Vec<CheckResult>,
    pub ticket: Option<Ticket>,
    pub payload_bytes: Option<usize>,
    pub payload_sha256: Option<String>,
    pub summary: Option<DecodedSummary>,
    pub error: Option<String>,
    pub error_layer: Option<ErrorLayer>,
}

impl ScenarioResult {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            success: false,
            duration_ms: 0,
            checks: Vec::new(),
            ticket: None,
            payload_bytes: None,
            payload_sha256: None,
            summary: None,
            error: None,
            error_layer: None,
        }
    }
}

/// Result of running a set of scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub started_at: DateTime<Utc>,
    pub base_url: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub results: Vec<ScenarioResult>,
}

impl SuiteResult {
    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

/// Runs scenarios against one server
pub struct ScenarioRunner {
    client: HtsgetClient,
    resolver: TicketResolver,
}

impl ScenarioRunner {
    /// Segments are fetched with the client's own HTTP connection pool
    pub fn new(client: HtsgetClient) -> Self {
        let transport = HttpTransport::from_client(client.http().clone());
        let resolver = TicketResolver::new(SegmentFetcher::new(Arc::new(transport)));
        Self::with_resolver(client, resolver)
    }

    pub fn with_resolver(client: HtsgetClient, resolver: TicketResolver) -> Self {
        Self { client, resolver }
    }

    /// Start the server, run every scenario, stop the server
    ///
    /// The server is stopped even when scenarios fail; only a failure to
    /// start it is an error.
    pub async fn run_supervised(
        &self,
        supervisor: &mut ProcessSupervisor,
        scenarios: &[Scenario],
    ) -> HarnessResult<SuiteResult> {
        supervisor.start().await?;
        let suite = self.run_all(scenarios).await;
        match supervisor.stop().await {
            Ok(outcome) => info!(%outcome, "server stopped after run"),
            Err(e) => warn!(error = %e, "failed to stop server cleanly"),
        }
        Ok(suite)
    }

    /// Run scenarios in order; a failing scenario never stops the suite
    pub async fn run_all(&self, scenarios: &[Scenario]) -> SuiteResult {
        let started_at = Utc::now();
        let start = Instant::now();
        let mut results = Vec::with_capacity(scenarios.len());

        info!(count = scenarios.len(), base_url = %self.client.base_url(), "running scenarios");

        for scenario in scenarios {
            let result = self.run(scenario).await;
            if result.success {
                info!("✓ {} ({} ms)", result.name, result.duration_ms);
            } else {
                error!(
                    "✗ {} - {}",
                    result.name,
                    result.error.as_deref().unwrap_or("check failed")
                );
            }
            results.push(result);
        }

        let passed = results.iter().filter(|r| r.success).count();
        let failed = results.len() - passed;
        let duration_ms = start.elapsed().as_millis() as u64;
        info!(passed, failed, duration_ms, "scenario results");

        SuiteResult {
            started_at,
            base_url: self.client.base_url().to_string(),
            total: results.len(),
            passed,
            failed,
            duration_ms,
            results,
        }
    }

    pub async fn run(&self, scenario: &Scenario) -> ScenarioResult {
        let start = Instant::now();
        debug!(name = %scenario.name, "running scenario");

        let mut result = ScenarioResult::new(&scenario.name);
        if let Err(e) = self.execute(scenario, &mut result).await {
            result.error_layer = Some(e.layer());
            result.error = Some(e.to_string());
        }
        result.duration_ms = start.elapsed().as_millis() as u64;
        result.success = result.error.is_none() && result.checks.iter().all(|c| c.passed);
        result
    }

    async fn execute(&self, scenario: &Scenario, result: &mut ScenarioResult) -> HarnessResult<()> {
        let query = &scenario.query;
        let expect = &scenario.expect;

        let ticket = self
            .client
            .query(query.endpoint, &query.id, &query.params)
            .await?;
        result.checks.extend(check_ticket(expect, &ticket));
        result.ticket = Some(ticket.clone());

        if !expect.decode {
            return Ok(());
        }

        let payload = self.resolver.resolve(&ticket).await?;
        result.payload_bytes = Some(payload.len());
        result.payload_sha256 = Some(payload.sha256_hex());
        result.checks.push(CheckResult::new(
            "segment_sizes",
            payload.is_consistent(),
            format!("{:?} = {} bytes", payload.segment_sizes, payload.len()),
        ));

        let summary = decode(payload).map_err(HarnessError::from)?;
        result.checks.extend(check_summary(expect, &summary));
        result.summary = Some(summary);
        Ok(())
    }
}

fn check_ticket(expect: &Expectations, ticket: &Ticket) -> Vec<CheckResult> {
    let mut checks = Vec::new();
    if let Some(format) = &expect.format {
        checks.push(CheckResult::new(
            "format",
            &ticket.format == format,
            format!("expected {}, got {}", format, ticket.format),
        ));
    }
    if let Some(min) = expect.min_segments {
        checks.push(CheckResult::new(
            "min_segments",
            ticket.segments.len() >= min,
            format!("expected at least {}, got {}", min, ticket.segments.len()),
        ));
    }
    checks
}

fn check_summary(expect: &Expectations, summary: &DecodedSummary) -> Vec<CheckResult> {
    let mut checks = Vec::new();

    for name in &expect.reference_names_include {
        let found = summary.reference_names().iter().any(|r| r == name);
        checks.push(CheckResult::new(
            "reference_name",
            found,
            format!("{} {}", name, if found { "present" } else { "missing" }),
        ));
    }

    for sample in &expect.samples_include {
        let found = summary.sample_names().iter().any(|s| s == sample);
        checks.push(CheckResult::new(
            "sample",
            found,
            format!("{} {}", sample, if found { "present" } else { "missing" }),
        ));
    }

    if let Some(min) = expect.min_records {
        let check = match summary.record_total() {
            Some(total) => CheckResult::new(
                "min_records",
                total >= min,
                format!("expected at least {}, got {}", min, total),
            ),
            None => CheckResult::new(
                "min_records",
                false,
                "payload format does not expose a record count",
            ),
        };
        checks.push(check);
    }
    checks
}

/// Write suite results as pretty JSON, creating parent directories
pub fn write_results(results: &SuiteResult, path: &Path) -> HarnessResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(results)?;
    std::fs::write(path, json)?;
    info!("Results written to: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use htsprobe_common::{AlignmentContainer, AlignmentSummary, Bounded, Format, Segment};

    fn alignment(refs: &[&str], reads: u64) -> DecodedSummary {
        DecodedSummary::Alignment(AlignmentSummary {
            container: AlignmentContainer::Bam,
            reference_names: Bounded::from_vec(refs.iter().map(|r| r.to_string()).collect(), 10),
            mapped_count: reads,
            unmapped_count: 0,
            reads: Bounded {
                items: Vec::new(),
                total: reads,
            },
            records_decoded: true,
        })
    }

    #[test]
    fn test_ticket_checks() {
        let expect = Expectations {
            format: Some(Format::Cram),
            min_segments: Some(2),
            ..Default::default()
        };
        let ticket = Ticket::new(
            Format::Bam,
            vec![Segment::new("http://h/0", Default::default())],
        );
        let checks = check_ticket(&expect, &ticket);
        assert_eq!(checks.len(), 2);
        assert!(checks.iter().all(|c| !c.passed));
        assert_eq!(checks[0].detail, "expected CRAM, got BAM");
    }

    #[test]
    fn test_summary_checks() {
        let expect = Expectations {
            reference_names_include: vec!["chr1".to_string(), "chrX".to_string()],
            min_records: Some(5),
            ..Default::default()
        };
        let checks = check_summary(&expect, &alignment(&["chr1", "chr2"], 7));
        let passed: Vec<bool> = checks.iter().map(|c| c.passed).collect();
        assert_eq!(passed, vec![true, false, true]);
        assert_eq!(checks[1].detail, "chrX missing");
    }

    #[test]
    fn test_min_records_needs_a_count() {
        let expect = Expectations {
            min_records: Some(1),
            ..Default::default()
        };
        let summary = DecodedSummary::Raw(htsprobe_common::RawPreview {
            format: "FASTA".to_string(),
            text: ">chr1".to_string(),
            truncated: false,
            total_bytes: 5,
        });
        let checks = check_summary(&expect, &summary);
        assert!(!checks[0].passed);
    }

    #[test]
    fn test_write_results_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("results.json");
        let suite = SuiteResult {
            started_at: Utc::now(),
            base_url: "http://127.0.0.1:8090".to_string(),
            total: 1,
            passed: 0,
            failed: 1,
            duration_ms: 3,
            results: vec![ScenarioResult {
                error: Some("server rejected query".to_string()),
                error_layer: Some(ErrorLayer::Query),
                ..ScenarioResult::new("missing")
            }],
        };
        write_results(&suite, &path).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["failed"], 1);
        assert_eq!(json["results"][0]["error_layer"], "query");
        assert!(!suite.success());
    }
}
