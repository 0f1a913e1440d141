//! CLI command implementations

pub mod fetch;
pub mod fixtures;
pub mod inspect;
pub mod query;
pub mod run;
pub mod serve;
pub mod status;

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Args, ValueEnum};
use htsprobe_common::DataClass;
use htsprobe_harness::{
    HarnessConfig, HarnessError, HtsgetClient, ProcessSupervisor, ServerConfig, ServerEvent,
    StreamKind,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::output::OutputFormat;

/// Settings shared by every command
pub struct Context {
    pub config: HarnessConfig,
    /// `--base-url`, taking precedence over the config file
    pub base_url: Option<String>,
    pub format: OutputFormat,
}

impl Context {
    pub fn base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| self.config.base_url())
    }

    pub fn client(&self) -> anyhow::Result<HtsgetClient> {
        self.client_for(&self.base_url())
    }

    pub fn client_for(&self, base_url: &str) -> anyhow::Result<HtsgetClient> {
        HtsgetClient::new(base_url, self.config.request_timeout())
            .with_context(|| format!("invalid server address {}", base_url))
    }
}

/// Options for launching a server around one command
#[derive(Args, Debug, Clone, Default)]
pub struct SpawnArgs {
    /// Start the server before the command and stop it afterwards
    #[arg(long)]
    pub spawn: bool,

    #[command(flatten)]
    pub server: ServerArgs,
}

/// Overrides for the configured server launch
#[derive(Args, Debug, Clone, Default)]
pub struct ServerArgs {
    /// Server Cargo manifest to `cargo run`
    #[arg(long)]
    pub manifest: Option<PathBuf>,

    /// Directory the server serves files from
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Port for the server to listen on
    #[arg(long)]
    pub port: Option<u16>,
}

impl ServerArgs {
    pub fn apply(&self, base: &ServerConfig) -> ServerConfig {
        let mut config = base.clone();
        if let Some(manifest) = &self.manifest {
            let launch = ServerConfig::cargo(manifest);
            config.program = launch.program;
            config.args = launch.args;
        }
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        config
    }
}

/// One-line failure report tagged with the layer that failed
pub fn failure_line(err: &HarnessError) -> String {
    format!("[{}] {}", err.layer(), err)
}

/// Segment class as a command-line value
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ClassArg {
    Header,
    Body,
}

impl From<ClassArg> for DataClass {
    fn from(class: ClassArg) -> Self {
        match class {
            ClassArg::Header => DataClass::Header,
            ClassArg::Body => DataClass::Body,
        }
    }
}

/// A server started for the duration of one command
pub struct SpawnedServer {
    supervisor: ProcessSupervisor,
    relay: tokio::task::JoinHandle<()>,
}

impl SpawnedServer {
    /// Start a server and forward its output to the log
    pub async fn start(config: ServerConfig) -> anyhow::Result<Self> {
        let mut supervisor = ProcessSupervisor::new(config);
        let relay = tokio::spawn(log_events(supervisor.subscribe()));

        if let Err(e) = supervisor.start().await {
            relay.abort();
            for line in supervisor.recent_output() {
                eprintln!("  {}", line);
            }
            return Err(e).context("failed to start server");
        }
        info!(base_url = %supervisor.base_url(), "server ready");
        Ok(Self { supervisor, relay })
    }

    pub fn base_url(&self) -> String {
        self.supervisor.base_url()
    }

    pub async fn stop(mut self) {
        match self.supervisor.stop().await {
            Ok(outcome) => info!(%outcome, "server stopped"),
            Err(e) => warn!(error = %e, "failed to stop server cleanly"),
        }
        self.relay.abort();
    }
}

/// Forward server output and state changes to the log
pub(crate) async fn log_events(mut events: tokio::sync::broadcast::Receiver<ServerEvent>) {
    loop {
        match events.recv().await {
            Ok(ServerEvent::Log(line)) => match line.stream {
                StreamKind::Stdout => debug!(target: "server", "{}", line.line),
                StreamKind::Stderr => debug!(target: "server", "[stderr] {}", line.line),
            },
            Ok(ServerEvent::State { state }) => debug!(%state, "server state"),
            Err(RecvError::Lagged(n)) => warn!(skipped = n, "server output lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}

/// Start a server when `--spawn` was given
///
/// Returns the server, if any, and the address to query.
pub async fn maybe_spawn(
    ctx: &Context,
    args: &SpawnArgs,
) -> anyhow::Result<(Option<SpawnedServer>, String)> {
    if !args.spawn {
        return Ok((None, ctx.base_url()));
    }
    let server = SpawnedServer::start(args.server.apply(&ctx.config.server)).await?;
    let base_url = ctx.base_url.clone().unwrap_or_else(|| server.base_url());
    Ok((Some(server), base_url))
}
