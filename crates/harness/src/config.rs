//! Harness configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, HarnessResult};
use crate::server::ServerConfig;

/// Harness configuration, usually read from `htsprobe.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Server to query; defaults to the supervised server's address
    pub base_url: Option<String>,

    /// Directory of YAML scenarios
    pub scenarios_dir: PathBuf,

    /// Where `run` writes its JSON report
    pub results_path: PathBuf,

    /// Per-request timeout for queries and segment fetches
    pub request_timeout_ms: u64,

    /// How to launch a server when asked to supervise one
    pub server: ServerConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            scenarios_dir: PathBuf::from("scenarios"),
            results_path: PathBuf::from("target/htsprobe/results.json"),
            request_timeout_ms: 30_000,
            server: ServerConfig::default(),
        }
    }
}

impl HarnessConfig {
    /// Load configuration from file, falling back to defaults when absent
    pub fn load(path: &Path) -> HarnessResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)
                .map_err(|e| HarnessError::Config(format!("{}: {}", path.display(), e)))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> HarnessResult<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| HarnessError::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| self.server.base_url())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
