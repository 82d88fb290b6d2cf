//! Configuration for the tenant update orchestrator.
//!
//! Values are layered: built-in defaults, then the TOML file, then `TUP_*`
//! environment overrides, then validation.

pub mod env;

pub use env::{EnvError, EnvParser, expand_home};

use crate::types::{EnvType, default_env_types};
use crate::versions::{VersionManager, VersionRegistry};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default cron schedule (with seconds): every 15 minutes.
pub const DEFAULT_SCHEDULE: &str = "0 */15 * * * *";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid environment overrides: {}", join(.0))]
    Env(Vec<EnvError>),

    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

fn join(errors: &[EnvError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// Cron expression (with seconds) for periodic triggers.
    #[serde(default = "default_schedule")]
    pub schedule: String,
    /// Identity of this updater build; stamped on every attempted namespace.
    #[serde(default = "default_commit")]
    pub commit: String,
    /// Location of the run-state document.
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
    /// Types covered by recovery passes.
    #[serde(default = "default_env_types")]
    pub default_env_types: Vec<EnvType>,
    #[serde(default)]
    pub update: UpdateSettings,
    #[serde(default)]
    pub version_managers: Vec<VersionManagerConfig>,
    #[serde(default)]
    pub executor: ExecutorConfig,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            schedule: default_schedule(),
            commit: default_commit(),
            state_path: default_state_path(),
            default_env_types: default_env_types(),
            update: UpdateSettings::default(),
            version_managers: Vec::new(),
            executor: ExecutorConfig::default(),
        }
    }
}

/// Pacing and timeout knobs of an update run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSettings {
    /// A run without progress for this long is considered crashed.
    #[serde(default = "default_retry_sleep", with = "duration_str")]
    pub retry_sleep: Duration,
    /// Pause between two tenant updates within a cluster.
    #[serde(default = "default_time_gap", with = "duration_str")]
    pub time_gap: Duration,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// How long to wait for the run-state lock.
    #[serde(default = "default_lock_timeout", with = "duration_str")]
    pub lock_timeout: Duration,
}

impl Default for UpdateSettings {
    fn default() -> Self {
        Self {
            retry_sleep: default_retry_sleep(),
            time_gap: default_time_gap(),
            batch_size: default_batch_size(),
            lock_timeout: default_lock_timeout(),
        }
    }
}

impl UpdateSettings {
    /// Sleep before rechecking a run that looks alive: timeout plus 10%.
    pub fn recheck_delay(&self) -> Duration {
        self.retry_sleep + self.retry_sleep / 10
    }
}

/// One template group and the environment types it feeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionManagerConfig {
    pub name: String,
    pub env_types: Vec<EnvType>,
    pub version: String,
}

/// External command run once per tenant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

fn default_schedule() -> String {
    DEFAULT_SCHEDULE.to_string()
}

fn default_commit() -> String {
    concat!("tupd-", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_state_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("tup")
        .join("state.json")
}

fn default_retry_sleep() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_time_gap() -> Duration {
    Duration::from_millis(500)
}

fn default_batch_size() -> usize {
    100
}

fn default_lock_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Default config file location: `<config dir>/tup/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("tup").join("config.toml"))
}

impl UpdaterConfig {
    /// Load from `path` (or the default location if present), apply env overrides, validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env(&mut EnvParser::new())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Layer `TUP_*` overrides on top of the current values.
    pub fn apply_env(&mut self, parser: &mut EnvParser) -> Result<(), ConfigError> {
        if let Some(schedule) = parser.get_string("SCHEDULE") {
            self.schedule = schedule;
        }
        if let Some(commit) = parser.get_string("COMMIT") {
            self.commit = commit;
        }
        if let Some(path) = parser.get_path("STATE_PATH") {
            self.state_path = path;
        }
        if let Some(retry_sleep) = parser.get_duration("RETRY_SLEEP") {
            self.update.retry_sleep = retry_sleep;
        }
        if let Some(time_gap) = parser.get_duration("TIME_GAP") {
            self.update.time_gap = time_gap;
        }
        if let Some(lock_timeout) = parser.get_duration("LOCK_TIMEOUT") {
            self.update.lock_timeout = lock_timeout;
        }
        if let Some(batch_size) = parser.get_usize_range("BATCH_SIZE", 1, 10_000) {
            self.update.batch_size = batch_size;
        }
        if parser.has_errors() {
            return Err(ConfigError::Env(parser.take_errors()));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if let Err(e) = cron::Schedule::from_str(&self.schedule) {
            problems.push(format!("schedule '{}' is not a valid cron expression: {e}", self.schedule));
        }
        if self.commit.trim().is_empty() {
            problems.push("commit must not be empty".to_string());
        }
        if self.update.batch_size == 0 {
            problems.push("update.batch_size must be > 0".to_string());
        }
        if self.update.retry_sleep.is_zero() {
            problems.push("update.retry_sleep must be > 0".to_string());
        }
        if self.default_env_types.is_empty() {
            problems.push("default_env_types must not be empty".to_string());
        }

        let mut names = HashSet::new();
        for manager in &self.version_managers {
            if !names.insert(manager.name.as_str()) {
                problems.push(format!("version manager '{}' is defined twice", manager.name));
            }
            if manager.env_types.is_empty() {
                problems.push(format!("version manager '{}' has no env_types", manager.name));
            }
            if manager.version.trim().is_empty() {
                problems.push(format!("version manager '{}' has an empty version", manager.name));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }

    pub fn version_registry(&self) -> VersionRegistry {
        VersionRegistry::new(
            self.version_managers
                .iter()
                .map(|m| VersionManager::new(m.name.clone(), m.env_types.clone(), m.version.clone()))
                .collect(),
        )
    }
}

/// Durations as humantime strings ("30m", "500ms").
mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
pub(crate) fn env_test_lock() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
