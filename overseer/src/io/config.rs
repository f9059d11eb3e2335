//! Synchronizer configuration stored in a TOML file (default `overseer.toml`).

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Which remote primitive the soft reset calls.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Teardown {
    /// Reset and kill both call `POST /kill`.
    Kill,
    /// Reset calls `POST /reset`; kill calls `POST /kill`.
    Split,
}

/// Synchronizer configuration (TOML).
///
/// Missing fields default to values that match the agent's bundled web server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SynchronizerConfig {
    /// Base URL of the agent control surface.
    pub base_url: String,

    /// Main status poll cadence.
    pub poll_interval_ms: u64,

    /// Interjection (pending question) poll cadence. Must not exceed `poll_interval_ms`.
    pub question_poll_interval_ms: u64,

    /// Planning dwell after which the agent is flagged as stuck.
    pub stall_threshold_ms: u64,

    /// Per-request timeout for control surface calls.
    pub request_timeout_ms: u64,

    pub teardown: Teardown,
}

impl Default for SynchronizerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            poll_interval_ms: 2_000,
            question_poll_interval_ms: 1_000,
            stall_threshold_ms: 30_000,
            request_timeout_ms: 10_000,
            teardown: Teardown::Kill,
        }
    }
}

impl SynchronizerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(anyhow!("base_url must be non-empty"));
        }
        if self.poll_interval_ms == 0 {
            return Err(anyhow!("poll_interval_ms must be > 0"));
        }
        if self.question_poll_interval_ms == 0 {
            return Err(anyhow!("question_poll_interval_ms must be > 0"));
        }
        if self.question_poll_interval_ms > self.poll_interval_ms {
            return Err(anyhow!(
                "question_poll_interval_ms must not exceed poll_interval_ms"
            ));
        }
        if self.stall_threshold_ms == 0 {
            return Err(anyhow!("stall_threshold_ms must be > 0"));
        }
        if self.request_timeout_ms == 0 {
            return Err(anyhow!("request_timeout_ms must be > 0"));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn question_poll_interval(&self) -> Duration {
        Duration::from_millis(self.question_poll_interval_ms)
    }

    pub fn stall_threshold(&self) -> Duration {
        Duration::from_millis(self.stall_threshold_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `SynchronizerConfig::default()`.
pub fn load_config(path: &Path) -> Result<SynchronizerConfig> {
    if !path.exists() {
        let cfg = SynchronizerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: SynchronizerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}
