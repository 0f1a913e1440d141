//! Fixture catalog listing

use std::path::PathBuf;

use clap::Args;
use htsprobe_common::TestFixture;
use htsprobe_harness::scan_fixtures;
use serde::Serialize;

use super::Context;
use crate::output::{print_list, print_warning, TableDisplay};

#[derive(Args)]
pub struct FixturesArgs {
    /// Directory to scan (defaults to the server's data directory)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Serialize)]
struct FixtureDisplay {
    key: String,
    id: String,
    #[serde(rename = "type")]
    display_type: String,
    endpoint: String,
    size_bytes: u64,
    #[serde(skip)]
    size: String,
    path: String,
}

impl From<&TestFixture> for FixtureDisplay {
    fn from(f: &TestFixture) -> Self {
        Self {
            key: f.key.clone(),
            id: f.id.clone(),
            display_type: f.display_type.clone(),
            endpoint: f.endpoint.to_string(),
            size_bytes: f.size_bytes,
            size: f.display_size(),
            path: f.path.display().to_string(),
        }
    }
}

impl TableDisplay for FixtureDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Key", "ID", "Type", "Endpoint", "Size"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.key.clone(),
            self.id.clone(),
            self.display_type.clone(),
            self.endpoint.clone(),
            self.size.clone(),
        ]
    }
}

pub async fn execute(args: FixturesArgs, ctx: &Context) -> anyhow::Result<()> {
    let dir = args
        .data_dir
        .unwrap_or_else(|| ctx.config.server.data_dir.clone());

    let fixtures = scan_fixtures(&dir);
    if fixtures.is_empty() && ctx.format.is_human() {
        print_warning(&format!("No test files found in {}", dir.display()));
        return Ok(());
    }

    let rows: Vec<FixtureDisplay> = fixtures.iter().map(FixtureDisplay::from).collect();
    print_list(&rows, ctx.format)
}
