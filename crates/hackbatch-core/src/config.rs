//! Configuration system for hackbatch.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $HACKBATCH_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/hackbatch/config.toml
//!   3. ~/.config/hackbatch/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BatcherConfig {
    pub target: TargetConfig,
    pub policy: PolicyConfig,
    pub pool: PoolConfig,
    pub run: RunConfig,
    pub scripts: ScriptConfig,
    pub sim: SimConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Node to prepare and batch against.
    pub name: String,
}

/// Planning constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Minimum gap between two jobs' completion times, in ms.
    pub settle_gap_ms: f64,
    /// Fraction of the current resource one hack job removes.
    pub hack_fraction: f64,
    /// Relative distance from min security / max resource still considered prepared.
    pub prepare_tolerance: f64,
    /// Resource level assumed for an empty target when sizing grow.
    pub resource_floor: f64,
    /// Ceiling for security in the speculative model.
    pub max_security: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Worker that is only partly given over to batch work.
    pub home_name: String,
    /// Fraction of the home worker's capacity batch jobs may use.
    pub home_max_fraction: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Keep cycling until stopped. false = one round, then terminate.
    pub infinite: bool,
    /// Upper bound on HWGW cycles composed per round.
    pub batches_per_round: u32,
    /// Pause between rounds, in ms.
    pub cycle_pause_ms: f64,
    /// Stop composing once the schedule horizon exceeds this. 0 = unlimited.
    pub max_completion_ms: f64,
    /// Compose later cycles from the predicted state instead of a fresh snapshot.
    pub chain_speculative: bool,
    /// No new cycles while this many jobs still wait for capacity.
    pub max_pending_jobs: usize,
    /// Bounds on the wait after a capacity stall, in ms.
    pub backpressure_min_ms: f64,
    pub backpressure_max_ms: f64,
}

/// Workload script identifiers launched on workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    pub hack: String,
    pub grow: String,
    pub weaken: String,
}

/// Settings for the simulated host used by the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// JSON network description. None = built-in demo network.
    pub network_path: Option<PathBuf>,
    /// Real seconds slept per simulated second. 0 = no real pacing.
    pub time_scale: f64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            name: "n00dles".to_string(),
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            settle_gap_ms: 50.0,
            hack_fraction: 0.99,
            prepare_tolerance: 0.05,
            resource_floor: 10.0,
            max_security: crate::target::DEFAULT_MAX_SECURITY,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            home_name: "home".to_string(),
            home_max_fraction: 0.25,
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            infinite: true,
            batches_per_round: 10,
            cycle_pause_ms: 1000.0,
            max_completion_ms: 0.0,
            chain_speculative: true,
            max_pending_jobs: 64,
            backpressure_min_ms: 200.0,
            backpressure_max_ms: 10_000.0,
        }
    }
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            hack: "batcher/hack.js".to_string(),
            grow: "batcher/grow.js".to_string(),
            weaken: "batcher/weaken.js".to_string(),
        }
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            network_path: None,
            time_scale: 0.0,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("hackbatch")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl BatcherConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_file(&Self::file_path())?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse a config file, or return defaults if it does not exist.
    pub fn load_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(BatcherConfig::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("HACKBATCH_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&BatcherConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply HACKBATCH_* env var overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup. Unparseable values are ignored.
    pub fn apply_overrides<F: Fn(&str) -> Option<String>>(&mut self, lookup: F) {
        let flag = |v: String| v == "true" || v == "1";

        if let Some(v) = lookup("HACKBATCH_TARGET__NAME") {
            self.target.name = v;
        }
        if let Some(v) = lookup("HACKBATCH_POLICY__SETTLE_GAP_MS").and_then(|v| v.parse().ok()) {
            self.policy.settle_gap_ms = v;
        }
        if let Some(v) = lookup("HACKBATCH_POLICY__HACK_FRACTION").and_then(|v| v.parse().ok()) {
            self.policy.hack_fraction = v;
        }
        if let Some(v) = lookup("HACKBATCH_POOL__HOME_MAX_FRACTION").and_then(|v| v.parse().ok()) {
            self.pool.home_max_fraction = v;
        }
        if let Some(v) = lookup("HACKBATCH_RUN__INFINITE") {
            self.run.infinite = flag(v);
        }
        if let Some(v) = lookup("HACKBATCH_RUN__BATCHES_PER_ROUND").and_then(|v| v.parse().ok()) {
            self.run.batches_per_round = v;
        }
        if let Some(v) = lookup("HACKBATCH_RUN__CYCLE_PAUSE_MS").and_then(|v| v.parse().ok()) {
            self.run.cycle_pause_ms = v;
        }
        if let Some(v) = lookup("HACKBATCH_RUN__CHAIN_SPECULATIVE") {
            self.run.chain_speculative = flag(v);
        }
        if let Some(v) = lookup("HACKBATCH_SIM__NETWORK_PATH") {
            self.sim.network_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("HACKBATCH_SIM__TIME_SCALE").and_then(|v| v.parse().ok()) {
            self.sim.time_scale = v;
        }
    }
}
