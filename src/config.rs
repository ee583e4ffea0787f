//! Configuration file support.
//!
//! Conductor runs with built-in defaults; a `conductor.yaml` file adjusts
//! them. Unknown fields are preserved rather than rejected, so configs
//! written for newer versions still load.
//!
//! # File Format
//!
//! ```yaml
//! cache_ttl_minutes: 30
//! default_timeout_seconds: 300
//! max_stderr_len: 2000
//! runner_command: "my-agent-runner --json"
//! event_log: ".conductor/events.ndjson"
//! roles_file: "roles.yaml"
//! scoring:
//!   exact_match: 1.0
//!   success_pattern: 1.2
//! ```

use crate::context::ScoringWeights;
use crate::error::{ConductorError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "conductor.yaml";

fn default_cache_ttl_minutes() -> u64 {
    30
}

fn default_timeout_seconds() -> u64 {
    300
}

fn default_max_stderr_len() -> usize {
    2000
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConductorConfig {
    /// Context bundle cache time-to-live, in minutes.
    pub cache_ttl_minutes: u64,

    /// Per-task execution timeout, in seconds.
    pub default_timeout_seconds: u64,

    /// Cap on captured child stderr, in bytes.
    pub max_stderr_len: usize,

    /// Relevance scoring weights.
    pub scoring: ScoringWeights,

    /// Override for the agent runner command (default: self-invocation).
    pub runner_command: Option<String>,

    /// Audit event log path; no audit log when unset.
    pub event_log: Option<PathBuf>,

    /// Role policy overrides file.
    pub roles_file: Option<PathBuf>,

    /// Unknown fields preserved for forward compatibility.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            cache_ttl_minutes: default_cache_ttl_minutes(),
            default_timeout_seconds: default_timeout_seconds(),
            max_stderr_len: default_max_stderr_len(),
            scoring: ScoringWeights::default(),
            runner_command: None,
            event_log: None,
            roles_file: None,
            extra: BTreeMap::new(),
        }
    }
}

impl ConductorConfig {
    /// Load configuration from a YAML file, or defaults when the file does
    /// not exist.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            ConductorError::UserError(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ConductorConfig = serde_yaml::from_str(yaml).map_err(|e| {
            ConductorError::UserError(format!("failed to parse conductor.yaml: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Validation rules:
    /// - `cache_ttl_minutes` must be greater than 0
    /// - `default_timeout_seconds` must be greater than 0
    /// - Scoring weights must be non-negative
    pub fn validate(&self) -> Result<()> {
        if self.cache_ttl_minutes == 0 {
            return Err(ConductorError::UserError(
                "conductor.yaml validation failed: cache_ttl_minutes must be greater than 0"
                    .to_string(),
            ));
        }

        if self.default_timeout_seconds == 0 {
            return Err(ConductorError::UserError(
                "conductor.yaml validation failed: default_timeout_seconds must be greater than 0"
                    .to_string(),
            ));
        }

        self.scoring.validate()?;
        Ok(())
    }

    /// Cache TTL as a [`Duration`].
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_minutes * 60)
    }

    /// Task timeout as a [`Duration`].
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_seconds)
    }
}
