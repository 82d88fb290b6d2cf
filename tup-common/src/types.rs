//! Common types used across tenant update components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Environment types every full (unfiltered) update pass covers by default.
pub const DEFAULT_ENV_TYPES: [&str; 5] = ["user", "che", "jenkins", "run", "stage"];

/// A named deployment target category of a tenant's resources.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvType(pub String);

impl EnvType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EnvType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EnvType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// The built-in default type set as owned values.
pub fn default_env_types() -> Vec<EnvType> {
    DEFAULT_ENV_TYPES.iter().map(|t| EnvType::from(*t)).collect()
}

/// `{type -> target version}` map of one update pass.
pub type TypeVersions = BTreeMap<EnvType, String>;

/// Provisioning state of a single namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamespaceState {
    Provisioning,
    Updating,
    #[default]
    Ready,
    Failed,
}

/// A tenant's provisioned unit for one environment type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Namespace {
    pub name: String,
    #[serde(rename = "type")]
    pub env_type: EnvType,
    /// Currently deployed version.
    pub version: String,
    #[serde(default)]
    pub state: NamespaceState,
    /// URL of the cluster the namespace lives in.
    pub cluster: String,
    /// Commit of the updater that last touched this namespace.
    #[serde(default)]
    pub updated_by: String,
    pub updated_at: DateTime<Utc>,
}

impl Namespace {
    /// Whether this namespace must be refreshed to reach `target`.
    pub fn needs_update(&self, target: &str) -> bool {
        self.version != target || self.state == NamespaceState::Failed
    }
}

/// Tenant identity as seen by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    /// Identifier of the owning user on the cluster.
    pub os_username: String,
}

/// A tenant together with its namespaces, as persisted in an inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantRecord {
    #[serde(flatten)]
    pub tenant: Tenant,
    #[serde(default)]
    pub namespaces: Vec<Namespace>,
}

/// Status of the (singleton) tenants update run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Nothing owed; also the state of a record that never ran.
    #[default]
    Finished,
    Updating,
    Failed,
    Killed,
    Incomplete,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Finished => write!(f, "finished"),
            Self::Updating => write!(f, "updating"),
            Self::Failed => write!(f, "failed"),
            Self::Killed => write!(f, "killed"),
            Self::Incomplete => write!(f, "incomplete"),
        }
    }
}

/// The singleton run-state record.
///
/// Only ever read or written through a [`crate::Repository`], i.e. while the
/// exclusive run-state lock is held.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub status: RunStatus,
    /// Last recorded progress; used to detect crashed or stuck runs.
    pub last_time_updated: DateTime<Utc>,
    pub failed_count: u32,
    /// Kill switch. Operators set it to false to stop a run cooperatively.
    pub can_continue: bool,
    /// Current-version markers, keyed by version manager name.
    #[serde(default)]
    pub versions: BTreeMap<String, String>,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            status: RunStatus::Finished,
            last_time_updated: DateTime::<Utc>::UNIX_EPOCH,
            failed_count: 0,
            can_continue: true,
            versions: BTreeMap::new(),
        }
    }
}

impl RunState {
    /// Whether `last_time_updated` is older than `timeout` relative to `now`.
    pub fn is_older_than(&self, timeout: std::time::Duration, now: DateTime<Utc>) -> bool {
        let timeout = chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::MAX);
        match now.checked_sub_signed(timeout) {
            Some(cutoff) => self.last_time_updated < cutoff,
            None => false,
        }
    }
}
