//! Version registry: which template versions the fleet should run.
//!
//! A [`VersionManager`] owns the target version of one template group and
//! the environment types it feeds. Its marker on the [`RunState`] says which
//! version the last fully covering run rolled out.

use crate::filter::UpdateFilter;
use crate::types::{EnvType, RunState};
use tracing::debug;

/// Version bookkeeping for one group of environment types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionManager {
    pub name: String,
    pub env_types: Vec<EnvType>,
    /// Current target version of the group's templates.
    pub version: String,
}

impl VersionManager {
    pub fn new(name: impl Into<String>, env_types: Vec<EnvType>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            env_types,
            version: version.into(),
        }
    }

    pub fn is_version_up_to_date(&self, run_state: &RunState) -> bool {
        run_state
            .versions
            .get(&self.name)
            .is_some_and(|current| current == &self.version)
    }

    pub fn set_current_version(&self, run_state: &mut RunState) {
        run_state
            .versions
            .insert(self.name.clone(), self.version.clone());
    }

    fn is_covered_by(&self, filter: &UpdateFilter) -> bool {
        self.env_types.iter().all(|t| filter.accepts(t))
    }
}

/// Ordered, process-wide set of version managers.
#[derive(Debug, Clone, Default)]
pub struct VersionRegistry {
    managers: Vec<VersionManager>,
}

impl VersionRegistry {
    pub fn new(managers: Vec<VersionManager>) -> Self {
        Self { managers }
    }

    pub fn managers(&self) -> &[VersionManager] {
        &self.managers
    }

    /// Env types of every manager whose marker lags its target version.
    pub fn outdated_env_types(&self, run_state: &RunState) -> Vec<EnvType> {
        let mut types: Vec<EnvType> = Vec::new();
        for manager in &self.managers {
            if manager.is_version_up_to_date(run_state) {
                continue;
            }
            debug!(
                manager = %manager.name,
                target = %manager.version,
                current = ?run_state.versions.get(&manager.name),
                "version manager is outdated"
            );
            for env_type in &manager.env_types {
                if !types.contains(env_type) {
                    types.push(env_type.clone());
                }
            }
        }
        types
    }

    /// Complete version of a type: every covering manager's version, joined.
    pub fn target_version(&self, env_type: &EnvType) -> Option<String> {
        let parts: Vec<&str> = self
            .managers
            .iter()
            .filter(|m| m.env_types.contains(env_type))
            .map(|m| m.version.as_str())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("_"))
        }
    }

    /// Commit every manager fully inside the filter. Returns committed names.
    pub fn commit_covered(&self, filter: &UpdateFilter, run_state: &mut RunState) -> Vec<String> {
        let mut committed = Vec::new();
        for manager in &self.managers {
            if manager.is_covered_by(filter) {
                manager.set_current_version(run_state);
                committed.push(manager.name.clone());
            }
        }
        committed
    }
}
