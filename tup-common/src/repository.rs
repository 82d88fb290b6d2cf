//! Lock-guarded access to the singleton run-state record.
//!
//! Every read or write of [`RunState`] goes through a [`Repository`], which
//! wraps one open [`StateTransaction`]. A transaction holds the exclusive
//! run-state lock from `begin` until it is committed or dropped, so two
//! triggers can never both observe a non-running state and both start a run.

use crate::errors::StoreError;
use crate::types::{EnvType, Namespace, RunState, RunStatus, Tenant, TypeVersions};
use chrono::Utc;

/// Store owning the run-state record and its exclusive lock.
pub trait RunStateStore: Send + Sync {
    /// Open a transaction holding the exclusive run-state lock.
    fn begin(&self) -> Result<Box<dyn StateTransaction + '_>, StoreError>;
}

/// One open, lock-holding transaction. Dropping it without commit rolls back.
pub trait StateTransaction {
    fn load(&mut self) -> Result<RunState, StoreError>;

    fn save(&mut self, state: &RunState) -> Result<(), StoreError>;

    fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Run-state operations available inside a transaction.
pub struct Repository<'a> {
    tx: Box<dyn StateTransaction + 'a>,
}

impl<'a> Repository<'a> {
    pub fn new(tx: Box<dyn StateTransaction + 'a>) -> Self {
        Self { tx }
    }

    pub fn get_tenants_update(&mut self) -> Result<RunState, StoreError> {
        self.tx.load()
    }

    pub fn save_tenants_update(&mut self, state: &RunState) -> Result<(), StoreError> {
        self.tx.save(state)
    }

    /// Reset counters and the kill switch and mark the run as updating.
    pub fn prepare_for_updating(&mut self) -> Result<(), StoreError> {
        self.modify(|state| {
            state.status = RunStatus::Updating;
            state.failed_count = 0;
            state.can_continue = true;
            state.last_time_updated = Utc::now();
        })
    }

    pub fn update_status(&mut self, status: RunStatus) -> Result<(), StoreError> {
        self.modify(|state| state.status = status)
    }

    pub fn update_last_time_updated(&mut self) -> Result<(), StoreError> {
        self.modify(|state| state.last_time_updated = Utc::now())
    }

    pub fn increment_failed_count(&mut self) -> Result<(), StoreError> {
        self.modify(|state| state.failed_count = state.failed_count.saturating_add(1))
    }

    pub fn can_continue(&mut self) -> Result<bool, StoreError> {
        Ok(self.tx.load()?.can_continue)
    }

    /// Flip the kill switch; the running pass stops before its next tenant.
    pub fn request_stop(&mut self) -> Result<(), StoreError> {
        self.modify(|state| state.can_continue = false)
    }

    pub fn commit(self) -> Result<(), StoreError> {
        self.tx.commit()
    }

    fn modify(&mut self, change: impl FnOnce(&mut RunState)) -> Result<(), StoreError> {
        let mut state = self.tx.load()?;
        change(&mut state);
        self.tx.save(&state)
    }
}

/// Run `work` as one unit of work under the run-state lock.
///
/// Commits when `work` returns `Ok`; on `Err` the transaction is dropped,
/// which rolls back and releases the lock.
pub fn transaction<T, E>(
    store: &dyn RunStateStore,
    work: impl FnOnce(&mut Repository<'_>) -> Result<T, E>,
) -> Result<T, E>
where
    E: From<StoreError>,
{
    let mut repo = Repository::new(store.begin()?);
    let value = work(&mut repo)?;
    repo.commit()?;
    Ok(value)
}

/// Tenant and namespace queries needed to plan an update pass.
pub trait TenantCatalog: Send + Sync {
    /// Distinct clusters holding at least one outdated namespace.
    fn clusters_to_update(
        &self,
        versions: &TypeVersions,
        commit: &str,
    ) -> Result<Vec<String>, StoreError>;

    /// Up to `limit` tenants of `cluster` with outdated namespaces, most overdue first.
    fn tenants_to_update(
        &self,
        versions: &TypeVersions,
        limit: usize,
        commit: &str,
        cluster: &str,
    ) -> Result<Vec<Tenant>, StoreError>;

    /// Current namespaces of a tenant.
    fn namespaces(&self, tenant_id: &str) -> Result<Vec<Namespace>, StoreError>;

    /// Report the outcome of one tenant update back to the inventory.
    fn record_attempt(
        &self,
        tenant_id: &str,
        env_types: &[EnvType],
        versions: &TypeVersions,
        commit: &str,
        succeeded: bool,
    ) -> Result<(), StoreError>;
}
