//! Shared building blocks for the tenant update orchestrator.
//!
//! Everything the daemon needs that is not orchestration itself lives here:
//! the run-state model, the filter policy, the version registry, the
//! lock-guarded repository contract and its stores, and configuration.

pub mod config;
pub mod errors;
pub mod filter;
pub mod inventory;
pub mod repository;
pub mod store;
pub mod testing;
pub mod types;
pub mod versions;

pub use config::{
    ConfigError, EnvParser, ExecutorConfig, UpdateSettings, UpdaterConfig, VersionManagerConfig,
};
pub use errors::{ExecutorError, StoreError};
pub use filter::{EnvTypeFilter, UpdateFilter};
pub use inventory::{TenantInventory, stale_env_types};
pub use repository::{Repository, RunStateStore, StateTransaction, TenantCatalog, transaction};
pub use store::{FileStore, MemoryStore};
pub use types::{
    DEFAULT_ENV_TYPES, EnvType, Namespace, NamespaceState, RunState, RunStatus, Tenant,
    TenantRecord, TypeVersions, default_env_types,
};
pub use versions::{VersionManager, VersionRegistry};
