//! Server supervision: spawning, readiness polling and teardown

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use htsprobe_common::ServerState;
use serde::{Deserialize, Serialize};
use tokio::process::{Child, Command};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::SupervisorError;
use crate::health::{HealthProbe, HttpHealthProbe};
use crate::relay::{spawn_relay, OutputTail, ServerEvent, StreamKind};

/// Output lines retained for startup diagnostics
const OUTPUT_TAIL_LINES: usize = 200;

/// How long relays may keep draining after the child is gone
const RELAY_DRAIN: Duration = Duration::from_millis(500);

const EVENT_CAPACITY: usize = 1024;

/// How to wait for a freshly spawned server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessPolicy {
    /// Pause between probes
    pub interval_ms: u64,
    pub max_attempts: u32,
    /// Bound on each individual probe
    pub probe_timeout_ms: u64,
    /// Optional wall-clock bound on the whole loop
    pub deadline_ms: Option<u64>,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            interval_ms: 200,
            max_attempts: 30,
            probe_timeout_ms: 1000,
            deadline_ms: None,
        }
    }
}

impl ReadinessPolicy {
    fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }
}

/// Configuration for spawning a server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Program to execute
    pub program: String,

    pub args: Vec<String>,

    /// Working directory for the child (None = inherit)
    pub working_dir: Option<PathBuf>,

    /// Address the server is told to listen on
    pub host: String,
    pub port: u16,

    /// Directory of data files the server serves
    pub data_dir: PathBuf,

    /// Value for the child's RUST_LOG
    pub log_level: String,

    /// Grace period between SIGTERM and a forced kill
    pub shutdown_timeout_ms: u64,

    /// Additional environment for the child
    pub env: BTreeMap<String, String>,

    pub readiness: ReadinessPolicy,
}

/// Server checkout run by default, relative to the working directory
///
/// Points at an htsget-rs (or htsgetr) source tree cloned beside this one.
pub const DEFAULT_SERVER_MANIFEST: &str = "../htsget-rs/Cargo.toml";

fn cargo_args(manifest: &Path) -> Vec<String> {
    vec![
        "run".to_string(),
        "--manifest-path".to_string(),
        manifest.display().to_string(),
    ]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            program: "cargo".to_string(),
            args: cargo_args(Path::new(DEFAULT_SERVER_MANIFEST)),
            working_dir: None,
            host: "127.0.0.1".to_string(),
            port: 8090,
            data_dir: PathBuf::from("tests/data"),
            log_level: "info".to_string(),
            shutdown_timeout_ms: 5000,
            env: BTreeMap::new(),
            readiness: ReadinessPolicy::default(),
        }
    }
}

impl ServerConfig {
    /// Run the server from source with `cargo run --manifest-path`
    pub fn cargo(manifest: impl Into<PathBuf>) -> Self {
        Self {
            args: cargo_args(&manifest.into()),
            ..Self::default()
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// A server that answered its readiness probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerHandle {
    pub pid: u32,
    pub base_url: String,
}

/// How a stop request completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    /// Exited after SIGTERM within the grace period
    Graceful,
    /// Killed after the grace period elapsed
    Forced,
    /// The child had already exited on its own
    AlreadyExited,
    /// Nothing was running
    NotRunning,
}

impl std::fmt::Display for StopOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopOutcome::Graceful => write!(f, "server stopped"),
            StopOutcome::Forced => write!(f, "server killed"),
            StopOutcome::AlreadyExited => write!(f, "server already exited"),
            StopOutcome::NotRunning => write!(f, "no server to stop"),
        }
    }
}

/// Owns the lifecycle of one external server process
///
/// ```text
///  Stopped/Failed ──start──► Starting ──probe ok──► Running ──stop──► Stopping ──► Stopped
///                               │                      │
///                               └─exit/timeout─► Failed ◄─child died─┘
/// ```
///
/// Dropping the supervisor cancels the relays and kills the child.
pub struct ProcessSupervisor {
    config: ServerConfig,
    probe: Arc<dyn HealthProbe>,
    state: ServerState,
    child: Option<Child>,
    pid: Option<u32>,
    relays: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
    events: broadcast::Sender<ServerEvent>,
    tail: Arc<OutputTail>,
}

impl ProcessSupervisor {
    pub fn new(config: ServerConfig) -> Self {
        Self::with_probe(config, Arc::new(HttpHealthProbe::new()))
    }

    pub fn with_probe(config: ServerConfig, probe: Arc<dyn HealthProbe>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config,
            probe,
            state: ServerState::Stopped,
            child: None,
            pid: None,
            relays: Vec::new(),
            cancel: CancellationToken::new(),
            events,
            tail: Arc::new(OutputTail::new(OUTPUT_TAIL_LINES)),
        }
    }

    /// Receive output lines and state changes from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn base_url(&self) -> String {
        self.config.base_url()
    }

    /// Spawn the server and wait until it is ready
    ///
    /// A no-op returning the existing handle when already running.
    pub async fn start(&mut self) -> Result<ServerHandle, SupervisorError> {
        if self.state == ServerState::Running {
            if let Some(pid) = self.pid {
                debug!(pid, "server already running");
                return Ok(self.handle(pid));
            }
        }

        // A child that died while running is reaped before replacing it
        if self.child.is_some() {
            self.teardown().await;
        }

        self.set_state(ServerState::Starting);
        self.tail.clear();

        let mut child = match self.spawn_child() {
            Ok(child) => child,
            Err(e) => {
                self.set_state(ServerState::Failed);
                return Err(e);
            }
        };
        let pid = child.id().unwrap_or_default();
        info!(pid, base_url = %self.base_url(), "spawned server");

        self.cancel = CancellationToken::new();
        if let Some(stdout) = child.stdout.take() {
            self.relays.push(spawn_relay(
                StreamKind::Stdout,
                stdout,
                self.events.clone(),
                self.tail.clone(),
                self.cancel.clone(),
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            self.relays.push(spawn_relay(
                StreamKind::Stderr,
                stderr,
                self.events.clone(),
                self.tail.clone(),
                self.cancel.clone(),
            ));
        }
        self.child = Some(child);
        self.pid = Some(pid);

        match self.wait_until_ready().await {
            Ok(attempts) => {
                info!(pid, attempts, "server is ready");
                self.set_state(ServerState::Running);
                Ok(self.handle(pid))
            }
            Err(e) => {
                warn!(pid, error = %e, "server failed to start");
                self.set_state(ServerState::Failed);
                Err(e)
            }
        }
    }

    /// Stop the server: SIGTERM, then kill after the grace period
    pub async fn stop(&mut self) -> Result<StopOutcome, SupervisorError> {
        let Some(mut child) = self.child.take() else {
            self.finish_relays().await;
            self.pid = None;
            if self.state != ServerState::Stopped {
                self.set_state(ServerState::Stopped);
            }
            return Ok(StopOutcome::NotRunning);
        };
        let pid = self.pid.take().unwrap_or_default();

        if let Ok(Some(status)) = child.try_wait() {
            info!(pid, %status, "server had already exited");
            self.finish_relays().await;
            self.set_state(ServerState::Stopped);
            return Ok(StopOutcome::AlreadyExited);
        }

        self.set_state(ServerState::Stopping);
        info!(pid, "stopping server");

        if let Err(e) = terminate(pid) {
            warn!(pid, error = %e, "graceful signal failed, killing");
            let _ = child.kill().await;
            self.finish_relays().await;
            self.set_state(ServerState::Failed);
            return Err(e);
        }

        let outcome = match timeout(self.config.shutdown_timeout(), child.wait()).await {
            Ok(Ok(status)) => {
                debug!(pid, %status, "server exited");
                StopOutcome::Graceful
            }
            Ok(Err(e)) => {
                let _ = child.kill().await;
                self.finish_relays().await;
                self.set_state(ServerState::Failed);
                return Err(SupervisorError::Io(e));
            }
            Err(_) => {
                warn!(
                    pid,
                    timeout_ms = self.config.shutdown_timeout_ms,
                    "server ignored SIGTERM, killing"
                );
                if let Err(e) = child.kill().await {
                    self.finish_relays().await;
                    self.set_state(ServerState::Failed);
                    return Err(SupervisorError::Io(e));
                }
                StopOutcome::Forced
            }
        };

        self.finish_relays().await;
        self.set_state(ServerState::Stopped);
        Ok(outcome)
    }

    /// Whether the server is running, noticing a child that died on its own
    pub async fn is_running(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => self.state == ServerState::Running,
            Ok(Some(status)) => {
                if self.state == ServerState::Running {
                    warn!(pid = ?self.pid, %status, "server exited unexpectedly");
                    self.set_state(ServerState::Failed);
                }
                false
            }
            Err(e) => {
                warn!(error = %e, "failed to poll server process");
                false
            }
        }
    }

    /// Output lines retained from the current or last child
    pub fn recent_output(&self) -> Vec<String> {
        self.tail.snapshot()
    }

    fn handle(&self, pid: u32) -> ServerHandle {
        ServerHandle {
            pid,
            base_url: self.base_url(),
        }
    }

    fn set_state(&mut self, state: ServerState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "server state");
        }
        self.state = state;
        let _ = self.events.send(ServerEvent::State { state });
    }

    fn spawn_child(&self) -> Result<Child, SupervisorError> {
        let config = &self.config;
        let mut cmd = Command::new(&config.program);
        cmd.args(&config.args)
            .env("HTSGET_HOST", &config.host)
            .env("HTSGET_PORT", config.port.to_string())
            .env("HTSGET_DATA_DIR", &config.data_dir)
            .env("RUST_LOG", &config.log_level)
            .envs(config.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &config.working_dir {
            cmd.current_dir(dir);
        }

        cmd.spawn().map_err(|source| SupervisorError::Spawn {
            program: config.program.clone(),
            source,
        })
    }

    /// Poll the probe until ready; returns the attempts used
    ///
    /// Each health check and each pause is cut short so the loop never runs past
    /// the policy deadline.
    async fn wait_until_ready(&mut self) -> Result<u32, SupervisorError> {
        let policy = self.config.readiness.clone();
        let base_url = self.base_url();
        let started = Instant::now();
        let deadline = policy.deadline();
        let mut attempts = 0;

        while attempts < policy.max_attempts {
            if let Some(status) = self.child_exit()? {
                return Err(self.premature_exit(status).await);
            }
            let left = time_left(deadline, started);
            if left.is_some_and(|left| left.is_zero()) {
                break;
            }

            attempts += 1;
            let check_timeout = bounded(policy.probe_timeout(), left);
            let ready = timeout(check_timeout, self.probe.probe(&base_url, check_timeout))
                .await
                .unwrap_or(false);
            if ready {
                return Ok(attempts);
            }

            let left = time_left(deadline, started);
            if left.is_some_and(|left| left.is_zero()) {
                break;
            }
            if attempts == 1 {
                info!(url = %base_url, "waiting for server to become ready");
            }

            if let Some(child) = self.child.as_mut() {
                // Wake early if the child exits
                tokio::select! {
                    _ = sleep(bounded(policy.interval(), left)) => {}
                    _ = child.wait() => {}
                }
            }
        }

        if let Some(status) = self.child_exit()? {
            return Err(self.premature_exit(status).await);
        }
        self.teardown().await;
        Err(SupervisorError::ReadinessTimeout {
            attempts,
            elapsed: started.elapsed(),
        })
    }

    fn child_exit(&mut self) -> Result<Option<std::process::ExitStatus>, SupervisorError> {
        match self.child.as_mut() {
            Some(child) => Ok(child.try_wait()?),
            None => Ok(None),
        }
    }

    async fn premature_exit(&mut self, status: std::process::ExitStatus) -> SupervisorError {
        self.child = None;
        self.pid = None;
        self.finish_relays().await;
        SupervisorError::PrematureExit {
            status,
            output: self.tail.snapshot(),
        }
    }

    /// Kill and reap the child, then stop the relays
    async fn teardown(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                warn!(pid = ?self.pid, error = %e, "failed to kill server");
            }
        }
        self.pid = None;
        self.finish_relays().await;
    }

    /// Let relays drain briefly, then cancel and join them
    async fn finish_relays(&mut self) {
        let deadline = tokio::time::Instant::now() + RELAY_DRAIN;
        for mut relay in std::mem::take(&mut self.relays) {
            tokio::select! {
                _ = &mut relay => {}
                _ = tokio::time::sleep_until(deadline) => {
                    self.cancel.cancel();
                    let _ = relay.await;
                }
            }
        }
        self.cancel.cancel();
    }
}

/// Time remaining before `deadline`, if there is one
fn time_left(deadline: Option<Duration>, started: Instant) -> Option<Duration> {
    deadline.map(|deadline| deadline.saturating_sub(started.elapsed()))
}

fn bounded(wait: Duration, left: Option<Duration>) -> Duration {
    left.map_or(wait, |left| wait.min(left))
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(child) = self.child.as_mut() {
            let _ = child.start_kill();
        }
    }
}

#[cfg(unix)]
fn terminate(pid: u32) -> Result<(), SupervisorError> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid).map_err(|_| SupervisorError::Signal {
        pid,
        reason: "pid out of range".to_string(),
    })?;
    kill(Pid::from_raw(raw), Signal::SIGTERM).map_err(|errno| SupervisorError::Signal {
        pid,
        reason: errno.to_string(),
    })
}

#[cfg(not(unix))]
fn terminate(pid: u32) -> Result<(), SupervisorError> {
    Err(SupervisorError::Signal {
        pid,
        reason: "graceful termination is only supported on unix".to_string(),
    })
}
