use super::mocks::{RecordingReporter, ScriptedExecutor};
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tup_common::{
    EnvType, MemoryStore, Namespace, NamespaceState, RunState, Tenant, TenantCatalog,
    TenantRecord, UpdateSettings, VersionManager, VersionRegistry, default_env_types,
};
use tupd::{TenantsUpdater, UpdateContext};

pub const COMMIT: &str = "tupd-test-build";

/// A tenant with one namespace per `(type, version)` in `cluster`.
///
/// `age_secs` sets how long ago the namespaces were last touched; older
/// tenants are fetched first.
pub fn record(id: &str, cluster: &str, age_secs: i64, namespaces: &[(&str, &str)]) -> TenantRecord {
    let updated_at = Utc::now() - ChronoDuration::seconds(age_secs);
    TenantRecord {
        tenant: Tenant {
            id: id.to_string(),
            os_username: format!("{id}-user"),
        },
        namespaces: namespaces
            .iter()
            .map(|(env_type, version)| Namespace {
                name: format!("{id}-{env_type}"),
                env_type: EnvType::from(*env_type),
                version: version.to_string(),
                state: NamespaceState::Ready,
                cluster: cluster.to_string(),
                updated_by: "previous-build".to_string(),
                updated_at,
            })
            .collect(),
    }
}

/// `(type, version)` pairs of a tenant's namespaces, in namespace order.
pub fn versions_of(catalog: &dyn TenantCatalog, tenant_id: &str) -> Vec<(String, String)> {
    catalog
        .namespaces(tenant_id)
        .unwrap()
        .into_iter()
        .map(|ns| (ns.env_type.to_string(), ns.version))
        .collect()
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub executor: Arc<ScriptedExecutor>,
    pub reporter: Arc<RecordingReporter>,
    pub registry: Arc<VersionRegistry>,
    pub settings: UpdateSettings,
}

impl Harness {
    pub fn new(state: RunState, tenants: Vec<TenantRecord>, managers: Vec<VersionManager>) -> Self {
        Self {
            store: Arc::new(MemoryStore::new(state).with_tenants(tenants)),
            executor: Arc::new(ScriptedExecutor::new()),
            reporter: Arc::new(RecordingReporter::default()),
            registry: Arc::new(VersionRegistry::new(managers)),
            settings: UpdateSettings {
                time_gap: Duration::ZERO,
                ..UpdateSettings::default()
            },
        }
    }

    pub fn with_executor(mut self, executor: ScriptedExecutor) -> Self {
        self.executor = Arc::new(executor);
        self
    }

    pub fn with_settings(mut self, settings: UpdateSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn context(&self) -> UpdateContext {
        UpdateContext {
            store: self.store.clone(),
            catalog: self.store.clone(),
            executor: self.executor.clone(),
            reporter: self.reporter.clone(),
            settings: self.settings.clone(),
            commit: COMMIT.to_string(),
        }
    }

    pub fn updater(&self) -> TenantsUpdater {
        TenantsUpdater::new(self.context(), self.registry.clone(), default_env_types())
    }

    pub fn state(&self) -> RunState {
        self.store.snapshot().unwrap()
    }
}
