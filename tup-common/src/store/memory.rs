//! In-memory store: the run-state mutex is held for a whole transaction.

use crate::errors::StoreError;
use crate::inventory::TenantInventory;
use crate::repository::{RunStateStore, StateTransaction, TenantCatalog};
use crate::types::{EnvType, Namespace, RunState, Tenant, TenantRecord, TypeVersions};
use std::sync::{Mutex, MutexGuard, RwLock};

#[derive(Debug, Default)]
pub struct MemoryStore {
    run_state: Mutex<RunState>,
    inventory: RwLock<TenantInventory>,
}

impl MemoryStore {
    pub fn new(run_state: RunState) -> Self {
        Self {
            run_state: Mutex::new(run_state),
            inventory: RwLock::new(TenantInventory::default()),
        }
    }

    pub fn with_tenants(self, records: Vec<TenantRecord>) -> Self {
        Self {
            inventory: RwLock::new(TenantInventory::new(records)),
            ..self
        }
    }

    /// Committed run state, read under the lock.
    pub fn snapshot(&self) -> Result<RunState, StoreError> {
        Ok(self.lock_state()?.clone())
    }

    pub fn inventory(&self) -> Result<TenantInventory, StoreError> {
        self.inventory
            .read()
            .map(|inv| inv.clone())
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, RunState>, StoreError> {
        self.run_state
            .lock()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    fn read_inventory<T>(&self, read: impl FnOnce(&TenantInventory) -> T) -> Result<T, StoreError> {
        let inventory = self
            .inventory
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        Ok(read(&inventory))
    }
}

struct MemoryTransaction<'a> {
    guard: MutexGuard<'a, RunState>,
    staged: Option<RunState>,
}

impl StateTransaction for MemoryTransaction<'_> {
    fn load(&mut self) -> Result<RunState, StoreError> {
        Ok(self.staged.clone().unwrap_or_else(|| self.guard.clone()))
    }

    fn save(&mut self, state: &RunState) -> Result<(), StoreError> {
        self.staged = Some(state.clone());
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        if let Some(state) = self.staged.take() {
            *self.guard = state;
        }
        Ok(())
    }
}

impl RunStateStore for MemoryStore {
    fn begin(&self) -> Result<Box<dyn StateTransaction + '_>, StoreError> {
        Ok(Box::new(MemoryTransaction {
            guard: self.lock_state()?,
            staged: None,
        }))
    }
}

impl TenantCatalog for MemoryStore {
    fn clusters_to_update(
        &self,
        versions: &TypeVersions,
        commit: &str,
    ) -> Result<Vec<String>, StoreError> {
        self.read_inventory(|inv| inv.clusters_to_update(versions, commit))
    }

    fn tenants_to_update(
        &self,
        versions: &TypeVersions,
        limit: usize,
        commit: &str,
        cluster: &str,
    ) -> Result<Vec<Tenant>, StoreError> {
        self.read_inventory(|inv| inv.tenants_to_update(versions, limit, commit, cluster))
    }

    fn namespaces(&self, tenant_id: &str) -> Result<Vec<Namespace>, StoreError> {
        self.read_inventory(|inv| inv.namespaces(tenant_id))?
    }

    fn record_attempt(
        &self,
        tenant_id: &str,
        env_types: &[EnvType],
        versions: &TypeVersions,
        commit: &str,
        succeeded: bool,
    ) -> Result<(), StoreError> {
        let mut inventory = self
            .inventory
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        inventory.record_attempt(tenant_id, env_types, versions, commit, succeeded)
    }
}
