//! Ticket queries

use std::path::Path;

use anyhow::{bail, Context as _};
use clap::Args;
use colored::Colorize;
use htsprobe_common::{Endpoint, Format, Ticket, TestFixture};
use htsprobe_harness::{scan_fixtures, HarnessError, QueryParams};
use serde::Serialize;
use tracing::debug;

use super::{failure_line, maybe_spawn, ClassArg, Context, SpawnArgs};
use crate::output::{
    print_error, print_heading, print_info, print_list, print_value, TableDisplay,
};

/// What to query and with which parameters
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Fixture key (sample1.bam), fixture id, or a raw id with --endpoint
    pub target: String,

    /// Query this endpoint with TARGET as the id, skipping fixture lookup
    #[arg(long)]
    pub endpoint: Option<Endpoint>,

    /// Requested data format (BAM, CRAM, VCF, BCF)
    #[arg(long)]
    pub data_format: Option<Format>,

    /// Request only the header or only the body
    #[arg(long, value_enum)]
    pub class: Option<ClassArg>,

    /// Reference sequence to restrict the query to
    #[arg(long, alias = "chr")]
    pub reference_name: Option<String>,

    /// 0-based inclusive start on the reference
    #[arg(long, requires = "reference_name")]
    pub start: Option<u64>,

    /// 0-based exclusive end on the reference
    #[arg(long, requires = "reference_name")]
    pub end: Option<u64>,
}

/// A fully resolved query
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub endpoint: Endpoint,
    pub id: String,
    pub params: QueryParams,
}

impl TargetArgs {
    pub fn resolve(&self, data_dir: &Path) -> anyhow::Result<Target> {
        let mut params = QueryParams {
            format: self.data_format.clone(),
            class: self.class.map(Into::into),
            reference_name: self.reference_name.clone(),
            start: self.start,
            end: self.end,
        };

        let (endpoint, id) = match self.endpoint {
            Some(endpoint) => (endpoint, self.target.clone()),
            None => {
                let fixtures = scan_fixtures(data_dir);
                let fixture = select_fixture(&fixtures, &self.target).with_context(|| {
                    format!(
                        "looked in {}; pass --endpoint to query a raw id",
                        data_dir.display()
                    )
                })?;
                debug!(key = %fixture.key, "resolved fixture");
                if params.format.is_none() {
                    params.format = fixture.query_format();
                }
                (fixture.endpoint, fixture.id.clone())
            }
        };

        Ok(Target {
            endpoint,
            id,
            params,
        })
    }
}

/// Find a fixture by key, or by id when the id is unambiguous
pub fn select_fixture<'a>(
    fixtures: &'a [TestFixture],
    target: &str,
) -> anyhow::Result<&'a TestFixture> {
    if let Some(fixture) = fixtures.iter().find(|f| f.key == target) {
        return Ok(fixture);
    }

    let by_id: Vec<&TestFixture> = fixtures.iter().filter(|f| f.id == target).collect();
    match by_id.as_slice() {
        [] => bail!("no fixture named {}", target),
        [fixture] => Ok(*fixture),
        many => {
            let keys: Vec<&str> = many.iter().map(|f| f.key.as_str()).collect();
            bail!("{} is ambiguous, use one of: {}", target, keys.join(", "))
        }
    }
}

#[derive(Args)]
pub struct QueryArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    #[command(flatten)]
    pub spawn: SpawnArgs,
}

#[derive(Serialize)]
struct SegmentDisplay {
    index: usize,
    class: String,
    url: String,
    headers: String,
}

impl TableDisplay for SegmentDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["#", "Class", "URL", "Headers"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.index.to_string(),
            self.class.clone(),
            self.url.clone(),
            self.headers.clone(),
        ]
    }
}

/// Data URIs can be long; keep the table readable
const URL_DISPLAY_CHARS: usize = 96;

fn short_url(url: &str) -> String {
    match url.char_indices().nth(URL_DISPLAY_CHARS) {
        Some((i, _)) => format!("{}…", &url[..i]),
        None => url.to_string(),
    }
}

/// Human rendering of a ticket
pub fn print_ticket(ticket: &Ticket, ctx: &Context) -> anyhow::Result<()> {
    print_heading(&format!(
        "Ticket: {} with {} segment(s)",
        ticket.format.to_string().cyan(),
        ticket.segments.len()
    ));
    if let Some(md5) = &ticket.md5 {
        println!("   md5: {}", md5.dimmed());
    }
    let rows: Vec<SegmentDisplay> = ticket
        .segments
        .iter()
        .enumerate()
        .map(|(index, s)| SegmentDisplay {
            index,
            class: s.class.to_string(),
            url: short_url(&s.url),
            headers: s
                .headers
                .iter()
                .map(|(k, v)| format!("{}: {}", k, v))
                .collect::<Vec<_>>()
                .join("\n"),
        })
        .collect();
    print_list(&rows, ctx.format)
}

pub async fn execute(args: QueryArgs, ctx: &Context) -> anyhow::Result<()> {
    let data_dir = args
        .spawn
        .server
        .data_dir
        .clone()
        .unwrap_or_else(|| ctx.config.server.data_dir.clone());
    let target = args.target.resolve(&data_dir)?;

    let (server, base_url) = maybe_spawn(ctx, &args.spawn).await?;
    let outcome: Result<Ticket, HarnessError> = async {
        let client = ctx
            .client_for(&base_url)
            .map_err(|e| HarnessError::Config(e.to_string()))?;
        if ctx.format.is_human() {
            print_info(&format!("GET {}/{}/{}", base_url, target.endpoint, target.id));
        }
        Ok(client
            .query(target.endpoint, &target.id, &target.params)
            .await?)
    }
    .await;

    if let Some(server) = server {
        server.stop().await;
    }

    let ticket = match outcome {
        Ok(ticket) => ticket,
        Err(e) => {
            print_error(&failure_line(&e));
            std::process::exit(1);
        }
    };

    if ctx.format.is_human() {
        print_ticket(&ticket, ctx)
    } else {
        print_value(&ticket, ctx.format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn fixture(id: &str, display_type: &str, endpoint: Endpoint) -> TestFixture {
        TestFixture {
            id: id.to_string(),
            name: format!("{}.{}", id, display_type.to_lowercase()),
            display_type: display_type.to_string(),
            endpoint,
            size_bytes: 10,
            path: PathBuf::from(format!("/data/{}", id)),
            key: format!("{}.{}", id, display_type.to_lowercase()),
        }
    }

    fn args(target: &str) -> TargetArgs {
        TargetArgs {
            target: target.to_string(),
            endpoint: None,
            data_format: None,
            class: None,
            reference_name: None,
            start: None,
            end: None,
        }
    }

    #[test]
    fn test_select_by_key_then_id() {
        let fixtures = vec![
            fixture("sample1", "BAM", Endpoint::Reads),
            fixture("sample1", "CRAM", Endpoint::Reads),
            fixture("calls", "VCF", Endpoint::Variants),
        ];
        assert_eq!(select_fixture(&fixtures, "sample1.cram").unwrap().display_type, "CRAM");
        assert_eq!(select_fixture(&fixtures, "calls").unwrap().endpoint, Endpoint::Variants);

        let err = select_fixture(&fixtures, "sample1").unwrap_err().to_string();
        assert!(err.contains("sample1.bam, sample1.cram"));
        assert!(select_fixture(&fixtures, "nothing").is_err());
    }

    #[test]
    fn test_explicit_endpoint_skips_lookup() {
        let target = TargetArgs {
            endpoint: Some(Endpoint::Variants),
            reference_name: Some("chr20".to_string()),
            start: Some(100),
            ..args("remote-id")
        }
        .resolve(Path::new("/nonexistent"))
        .unwrap();
        assert_eq!(target.endpoint, Endpoint::Variants);
        assert_eq!(target.id, "remote-id");
        assert_eq!(target.params.start, Some(100));
    }

    #[test]
    fn test_fixture_supplies_format() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sample1.cram"), b"CRAM").unwrap();

        let target = args("sample1.cram").resolve(dir.path()).unwrap();
        assert_eq!(target.endpoint, Endpoint::Reads);
        assert_eq!(target.id, "sample1");
        assert_eq!(target.params.format, Some(Format::Cram));

        let overridden = TargetArgs {
            data_format: Some(Format::Bam),
            ..args("sample1")
        }
        .resolve(dir.path())
        .unwrap();
        assert_eq!(overridden.params.format, Some(Format::Bam));
    }

    #[test]
    fn test_short_url() {
        assert_eq!(short_url("http://h/a"), "http://h/a");
        let long = format!("data:;base64,{}", "A".repeat(200));
        let short = short_url(&long);
        assert_eq!(short.chars().count(), URL_DISPLAY_CHARS + 1);
        assert!(short.ends_with('…'));
    }
}
