//! htsprobe CLI - Main Entry Point
//!
//! Drives an htsget server from the command line: health checks,
//! fixture listing, ticket queries, payload decoding, segment
//! inspection and scenario suites, optionally supervising the server
//! for the duration of a command.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use htsprobe_harness::HarnessConfig;

mod commands;
mod output;

use commands::{fetch, fixtures, inspect, query, run, serve, status, Context};

/// htsprobe - htsget client test harness
#[derive(Parser)]
#[command(name = "htsprobe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Harness configuration file
    #[arg(long, env = "HTSPROBE_CONFIG", default_value = "htsprobe.toml", global = true)]
    config: PathBuf,

    /// Server address, overriding the configuration
    #[arg(long, env = "HTSPROBE_BASE_URL", global = true)]
    base_url: Option<String>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the server's service-info endpoint
    Status,

    /// List data files available for querying
    Fixtures(fixtures::FixturesArgs),

    /// Run the server in the foreground until Ctrl+C
    Serve(serve::ServeArgs),

    /// Request a ticket
    Query(query::QueryArgs),

    /// Request a ticket, fetch every segment and decode the payload
    Fetch(fetch::FetchArgs),

    /// Fetch one segment URL and preview its body
    Inspect(inspect::InspectArgs),

    /// Run YAML scenarios and write a JSON report
    Run(run::RunArgs),

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = HarnessConfig::load(&cli.config)?;
    let ctx = Context {
        config,
        base_url: cli.base_url,
        format: cli.format,
    };

    match cli.command {
        Commands::Status => status::execute(&ctx).await?,
        Commands::Fixtures(args) => fixtures::execute(args, &ctx).await?,
        Commands::Serve(args) => serve::execute(args, &ctx).await?,
        Commands::Query(args) => query::execute(args, &ctx).await?,
        Commands::Fetch(args) => fetch::execute(args, &ctx).await?,
        Commands::Inspect(args) => inspect::execute(args, &ctx).await?,
        Commands::Run(args) => run::execute(args, &ctx).await?,
        Commands::Version => {
            println!("htsprobe v{}", env!("CARGO_PKG_VERSION"));
            println!("htsget client test harness");
            println!();
            println!("Components:");
            println!("  common: v{}", htsprobe_common::VERSION);
            println!("  formats: BAM, CRAM, VCF, BCF");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_spawn_flags_parse() {
        let cli = Cli::try_parse_from([
            "htsprobe",
            "--format",
            "json",
            "fetch",
            "sample1.bam",
            "--reference-name",
            "chr1",
            "--start",
            "0",
            "--end",
            "1000",
            "--spawn",
            "--port",
            "9100",
        ])
        .unwrap();
        match cli.command {
            Commands::Fetch(args) => {
                assert!(args.spawn.spawn);
                assert_eq!(args.spawn.server.port, Some(9100));
                assert_eq!(args.target.end, Some(1000));
            }
            _ => panic!("expected fetch"),
        }
    }

    #[test]
    fn test_start_requires_reference_name() {
        assert!(Cli::try_parse_from(["htsprobe", "query", "sample1", "--start", "5"]).is_err());
    }

    #[test]
    fn test_inspect_headers_repeat() {
        let cli = Cli::try_parse_from([
            "htsprobe",
            "inspect",
            "http://127.0.0.1:8090/data/sample1.bam",
            "-H",
            "Range=bytes=0-99",
            "--header",
            "Authorization=Bearer x",
        ])
        .unwrap();
        match cli.command {
            Commands::Inspect(args) => assert_eq!(args.headers.len(), 2),
            _ => panic!("expected inspect"),
        }
    }
}
