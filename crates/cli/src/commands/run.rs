//! Scenario suite execution

use std::path::PathBuf;

use clap::Args;
use colored::Colorize;
use htsprobe_harness::{
    write_results, ProcessSupervisor, Scenario, ScenarioResult, ScenarioRunner, SuiteResult,
};
use serde::Serialize;

use super::{failure_line, log_events, Context, SpawnArgs};
use crate::output::{
    print_error, print_info, print_list, print_success, print_value, TableDisplay,
};

#[derive(Args)]
pub struct RunArgs {
    /// Scenario directory (defaults to the configured one)
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Only run scenarios carrying this tag, repeatable
    #[arg(long)]
    pub tag: Vec<String>,

    /// Only run scenarios whose name contains this text
    #[arg(long)]
    pub name: Option<String>,

    /// Where to write the JSON report
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub spawn: SpawnArgs,
}

/// Keep scenarios matching every given filter
pub fn select(scenarios: Vec<Scenario>, tags: &[String], name: Option<&str>) -> Vec<Scenario> {
    scenarios
        .into_iter()
        .filter(|s| tags.iter().all(|t| s.has_tag(t)))
        .filter(|s| name.map_or(true, |n| s.name.contains(n)))
        .collect()
}

#[derive(Serialize)]
struct ResultDisplay {
    name: String,
    success: bool,
    duration_ms: u64,
    checks: String,
    error: String,
}

impl From<&ScenarioResult> for ResultDisplay {
    fn from(r: &ScenarioResult) -> Self {
        let passed = r.checks.iter().filter(|c| c.passed).count();
        let failed: Vec<String> = r
            .checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| format!("{}: {}", c.name, c.detail))
            .collect();
        let error = match (&r.error, &r.error_layer) {
            (Some(e), Some(layer)) => format!("[{}] {}", layer, e),
            (Some(e), None) => e.clone(),
            _ => failed.join("\n"),
        };
        Self {
            name: r.name.clone(),
            success: r.success,
            duration_ms: r.duration_ms,
            checks: format!("{}/{}", passed, r.checks.len()),
            error,
        }
    }
}

impl TableDisplay for ResultDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Scenario", "Result", "Time", "Checks", "Failure"]
    }

    fn row(&self) -> Vec<String> {
        let result = if self.success {
            "✓ pass".green().to_string()
        } else {
            "✗ fail".red().to_string()
        };
        vec![
            self.name.clone(),
            result,
            format!("{} ms", self.duration_ms),
            self.checks.clone(),
            self.error.clone(),
        ]
    }
}

pub async fn execute(args: RunArgs, ctx: &Context) -> anyhow::Result<()> {
    let dir = args.dir.unwrap_or_else(|| ctx.config.scenarios_dir.clone());
    let scenarios = select(Scenario::load_all(&dir)?, &args.tag, args.name.as_deref());
    if scenarios.is_empty() {
        print_error(&format!("No scenarios selected from {}", dir.display()));
        std::process::exit(1);
    }
    if ctx.format.is_human() {
        print_info(&format!(
            "Running {} scenario(s) from {}",
            scenarios.len(),
            dir.display()
        ));
    }

    let suite = if args.spawn.spawn {
        let config = args.spawn.server.apply(&ctx.config.server);
        let base_url = ctx.base_url.clone().unwrap_or_else(|| config.base_url());
        let runner = ScenarioRunner::new(ctx.client_for(&base_url)?);

        let mut supervisor = ProcessSupervisor::new(config);
        let relay = tokio::spawn(log_events(supervisor.subscribe()));
        let suite = runner.run_supervised(&mut supervisor, &scenarios).await;
        relay.abort();
        match suite {
            Ok(suite) => suite,
            Err(e) => {
                for line in supervisor.recent_output() {
                    eprintln!("  {}", line);
                }
                print_error(&failure_line(&e));
                std::process::exit(1);
            }
        }
    } else {
        ScenarioRunner::new(ctx.client()?).run_all(&scenarios).await
    };

    let output = args.output.unwrap_or_else(|| ctx.config.results_path.clone());
    write_results(&suite, &output)?;

    report(&suite, ctx)?;
    if ctx.format.is_human() {
        print_info(&format!("Results written to {}", output.display()));
    }

    if !suite.success() {
        std::process::exit(1);
    }
    Ok(())
}

fn report(suite: &SuiteResult, ctx: &Context) -> anyhow::Result<()> {
    if !ctx.format.is_human() {
        return print_value(suite, ctx.format);
    }

    let rows: Vec<ResultDisplay> = suite.results.iter().map(ResultDisplay::from).collect();
    print_list(&rows, ctx.format)?;

    let line = format!(
        "{} passed, {} failed in {} ms against {} (started {})",
        suite.passed,
        suite.failed,
        suite.duration_ms,
        suite.base_url,
        suite.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if suite.success() {
        print_success(&line);
    } else {
        print_error(&line);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario(name: &str, tags: &[&str]) -> Scenario {
        let yaml = format!(
            "name: {}\ntags: [{}]\nquery:\n  endpoint: reads\n  id: sample1\n",
            name,
            tags.join(", ")
        );
        Scenario::from_yaml(&yaml).unwrap()
    }

    fn names(scenarios: &[Scenario]) -> Vec<&str> {
        scenarios.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn test_select_by_tags_and_name() {
        let all = vec![
            scenario("bam-header", &["reads", "smoke"]),
            scenario("bam-chr1", &["reads"]),
            scenario("vcf-calls", &["variants", "smoke"]),
        ];

        let smoke = select(all.clone(), &["smoke".to_string()], None);
        assert_eq!(names(&smoke), vec!["bam-header", "vcf-calls"]);

        let both = select(all.clone(), &["smoke".to_string(), "reads".to_string()], None);
        assert_eq!(names(&both), vec!["bam-header"]);

        let by_name = select(all.clone(), &[], Some("bam"));
        assert_eq!(names(&by_name), vec!["bam-header", "bam-chr1"]);

        assert_eq!(select(all, &[], None).len(), 3);
    }

    #[test]
    fn test_result_row_reports_failed_checks() {
        let result: ScenarioResult = serde_json::from_value(serde_json::json!({
            "name": "bam-chr1",
            "success": false,
            "duration_ms": 12,
            "checks": [
                {"name": "format", "passed": true, "detail": "expected BAM, got BAM"},
                {"name": "reference_name", "passed": false, "detail": "chrX missing"}
            ],
            "ticket": null,
            "payload_bytes": null,
            "payload_sha256": null,
            "summary": null,
            "error": null,
            "error_layer": null
        }))
        .unwrap();

        let row = ResultDisplay::from(&result);
        assert_eq!(row.checks, "1/2");
        assert_eq!(row.error, "reference_name: chrX missing");
    }

    #[test]
    fn test_result_row_prefers_error_with_layer() {
        let result: ScenarioResult = serde_json::from_value(serde_json::json!({
            "name": "down",
            "success": false,
            "duration_ms": 1,
            "checks": [],
            "ticket": null,
            "payload_bytes": null,
            "payload_sha256": null,
            "summary": null,
            "error": "connection refused",
            "error_layer": "server"
        }))
        .unwrap();

        assert_eq!(ResultDisplay::from(&result).error, "[server] connection refused");
    }
}
