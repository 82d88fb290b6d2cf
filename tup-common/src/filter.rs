//! Filter policy restricting which environment types and cluster a run visits.
//!
//! Only the unrestricted filter lets a run finish as `Finished`; any
//! restriction downgrades a clean run to `Incomplete`.

use crate::types::EnvType;

/// Limit reported for the unrestricted type filter.
pub const NO_LIMIT: &str = "no-limit";

/// Restriction on environment types.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EnvTypeFilter {
    #[default]
    All,
    Only(EnvType),
}

impl EnvTypeFilter {
    pub fn accepts(&self, env_type: &EnvType) -> bool {
        match self {
            Self::All => true,
            Self::Only(only) => only == env_type,
        }
    }

    /// Human-readable limit, used in logs.
    pub fn limit(&self) -> &str {
        match self {
            Self::All => NO_LIMIT,
            Self::Only(only) => only.as_str(),
        }
    }
}

/// Full filter of one trigger: type restriction plus optional cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateFilter {
    pub env_types: EnvTypeFilter,
    pub cluster: Option<String>,
}

impl UpdateFilter {
    pub fn unrestricted() -> Self {
        Self::default()
    }

    pub fn only_type(env_type: impl Into<EnvType>) -> Self {
        Self {
            env_types: EnvTypeFilter::Only(env_type.into()),
            cluster: None,
        }
    }

    /// Narrow the filter to one cluster. Blank names mean "any cluster".
    pub fn with_cluster(mut self, cluster: impl Into<String>) -> Self {
        let cluster = cluster.into();
        self.cluster = if cluster.trim().is_empty() {
            None
        } else {
            Some(cluster)
        };
        self
    }

    pub fn accepts(&self, env_type: &EnvType) -> bool {
        self.env_types.accepts(env_type)
    }

    pub fn cluster(&self) -> Option<&str> {
        self.cluster.as_deref()
    }

    pub fn is_restricted(&self) -> bool {
        self.env_types != EnvTypeFilter::All || self.cluster.is_some()
    }
}
