use std::collections::HashSet;
use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tup_common::{
    EnvType, ExecutorError, MemoryStore, Namespace, RunStateStore, StateTransaction, StoreError,
    Tenant, TenantCatalog, TypeVersions,
};
use tupd::{Executor, FailureReporter, ReportFields};

type Hook = Box<dyn Fn(&Tenant) + Send + Sync>;

/// Records every call; fails the configured tenants; runs an optional hook per call.
#[derive(Default)]
pub struct ScriptedExecutor {
    failing: HashSet<String>,
    delay: Duration,
    hook: Option<Hook>,
    calls: Mutex<Vec<(String, Vec<EnvType>)>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, tenant_ids: &[&str]) -> Self {
        self.failing = tenant_ids.iter().map(|id| id.to_string()).collect();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn on_update(mut self, hook: impl Fn(&Tenant) + Send + Sync + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    pub fn calls(&self) -> Vec<(String, Vec<EnvType>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn tenant_ids(&self) -> Vec<String> {
        self.calls().into_iter().map(|(id, _)| id).collect()
    }
}

impl Executor for ScriptedExecutor {
    fn update(
        &self,
        tenant: &Tenant,
        _acting_user: Option<&str>,
        env_types: &[EnvType],
        _allow_self_healing: bool,
    ) -> Result<(), ExecutorError> {
        self.calls
            .lock()
            .unwrap()
            .push((tenant.id.clone(), env_types.to_vec()));
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if let Some(hook) = &self.hook {
            hook(tenant);
        }
        if self.failing.contains(&tenant.id) {
            return Err(ExecutorError::Rejected(format!("tenant {} rejected the update", tenant.id)));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<(String, String)>>,
}

impl RecordingReporter {
    pub fn messages(&self) -> Vec<String> {
        self.reports.lock().unwrap().iter().map(|(m, _)| m.clone()).collect()
    }
}

impl FailureReporter for RecordingReporter {
    fn report(&self, message: &str, err: &dyn Error, _fields: ReportFields<'_>) {
        self.reports
            .lock()
            .unwrap()
            .push((message.to_string(), err.to_string()));
    }
}

/// Delegates to a [`MemoryStore`] but fails batch queries for one cluster.
pub struct FlakyCatalog {
    pub inner: Arc<MemoryStore>,
    pub broken_cluster: String,
}

impl TenantCatalog for FlakyCatalog {
    fn clusters_to_update(&self, versions: &TypeVersions, commit: &str) -> Result<Vec<String>, StoreError> {
        self.inner.clusters_to_update(versions, commit)
    }

    fn tenants_to_update(
        &self,
        versions: &TypeVersions,
        limit: usize,
        commit: &str,
        cluster: &str,
    ) -> Result<Vec<Tenant>, StoreError> {
        if cluster == self.broken_cluster {
            return Err(StoreError::UnknownTenant(format!("catalog unavailable for {cluster}")));
        }
        self.inner.tenants_to_update(versions, limit, commit, cluster)
    }

    fn namespaces(&self, tenant_id: &str) -> Result<Vec<Namespace>, StoreError> {
        self.inner.namespaces(tenant_id)
    }

    fn record_attempt(
        &self,
        tenant_id: &str,
        env_types: &[EnvType],
        versions: &TypeVersions,
        commit: &str,
        succeeded: bool,
    ) -> Result<(), StoreError> {
        self.inner
            .record_attempt(tenant_id, env_types, versions, commit, succeeded)
    }
}

/// A run-state store whose lock can never be acquired.
pub struct UnavailableStore;

impl RunStateStore for UnavailableStore {
    fn begin(&self) -> Result<Box<dyn StateTransaction + '_>, StoreError> {
        Err(StoreError::LockTimeout {
            path: "/var/lib/tup/state.json.lock".into(),
            waited: Duration::from_secs(30),
        })
    }
}
