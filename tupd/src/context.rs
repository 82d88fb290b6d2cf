use crate::executor::Executor;
use crate::reporting::FailureReporter;
use std::sync::Arc;
use tup_common::{RunStateStore, TenantCatalog, UpdateSettings};

/// Collaborators shared by the orchestrator and every cluster runner.
#[derive(Clone)]
pub struct UpdateContext {
    pub store: Arc<dyn RunStateStore>,
    pub catalog: Arc<dyn TenantCatalog>,
    pub executor: Arc<dyn Executor>,
    pub reporter: Arc<dyn FailureReporter>,
    pub settings: UpdateSettings,
    /// Identity of this updater build, stamped on attempted namespaces.
    pub commit: String,
}
