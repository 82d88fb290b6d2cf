//! Tenant update orchestrator.
//!
//! [`TenantsUpdater`] decides per trigger whether an update run is owed,
//! fans out one [`ClusterRunner`] per cluster and finalizes the run state.

pub mod cluster;
pub mod context;
pub mod executor;
pub mod reporting;
pub mod scheduler;
pub mod updater;

pub use cluster::{ClusterOutcome, ClusterRunner};
pub use context::UpdateContext;
pub use executor::{CommandExecutor, Executor};
pub use reporting::{FailureReporter, ReportFields, TracingReporter};
pub use updater::{Decision, TenantsUpdater, TriggerOutcome, UpdateError, final_status};
