//! Per-cluster batch runner.
//!
//! Drives one cluster to convergence for a fixed `{type -> target version}`
//! map: fetch a batch of outdated tenants, update them one at a time with a
//! pacing pause, record liveness, repeat until the batch comes back empty.
//! Every attempt is stamped in the catalog with the updater commit, so a
//! tenant that keeps failing is not fetched again by the same pass.
//! The kill switch is checked under lock before every tenant.

use crate::context::UpdateContext;
use serde::Serialize;
use std::collections::HashSet;
use std::thread;
use tracing::{debug, info, warn};
use tup_common::{StoreError, Tenant, TypeVersions, stale_env_types, transaction};

/// How a cluster pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum ClusterOutcome {
    /// No outdated tenants left for this pass.
    Converged { updated: usize, failed: usize },
    /// The kill switch was set.
    Stopped { updated: usize, failed: usize },
}

impl ClusterOutcome {
    pub fn updated(&self) -> usize {
        match self {
            Self::Converged { updated, .. } | Self::Stopped { updated, .. } => *updated,
        }
    }

    pub fn failed(&self) -> usize {
        match self {
            Self::Converged { failed, .. } | Self::Stopped { failed, .. } => *failed,
        }
    }

    pub fn stopped_early(&self) -> bool {
        matches!(self, Self::Stopped { .. })
    }
}

enum TenantResult {
    Updated,
    Failed,
    Skipped,
}

pub struct ClusterRunner {
    ctx: UpdateContext,
    cluster: String,
    versions: TypeVersions,
}

impl ClusterRunner {
    pub fn new(ctx: UpdateContext, cluster: impl Into<String>, versions: TypeVersions) -> Self {
        Self {
            ctx,
            cluster: cluster.into(),
            versions,
        }
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    /// Run the cluster pass. Blocking; meant for a dedicated thread.
    ///
    /// Only store failures are errors. Tenant failures are counted and reported.
    pub fn run(&self) -> Result<ClusterOutcome, StoreError> {
        let store = self.ctx.store.as_ref();
        let settings = &self.ctx.settings;
        let mut handled: HashSet<String> = HashSet::new();
        let mut updated = 0;
        let mut failed = 0;

        info!(cluster = %self.cluster, "starting cluster update");
        loop {
            let batch = self.ctx.catalog.tenants_to_update(
                &self.versions,
                settings.batch_size,
                &self.ctx.commit,
                &self.cluster,
            )?;
            let fetched = batch.len();
            let batch: Vec<Tenant> = batch
                .into_iter()
                .filter(|tenant| !handled.contains(&tenant.id))
                .collect();

            if batch.is_empty() {
                if fetched > 0 {
                    // Tenants were attempted but the catalog still lists them.
                    warn!(cluster = %self.cluster, fetched, "no unattempted tenants left in batch");
                }
                info!(cluster = %self.cluster, updated, failed, "cluster converged");
                return Ok(ClusterOutcome::Converged { updated, failed });
            }
            debug!(cluster = %self.cluster, tenants = batch.len(), "processing batch");

            for tenant in &batch {
                if !transaction(store, |repo| repo.can_continue())? {
                    warn!(cluster = %self.cluster, updated, failed, "kill switch set, stopping cluster update");
                    return Ok(ClusterOutcome::Stopped { updated, failed });
                }
                handled.insert(tenant.id.clone());

                match self.update_tenant(tenant) {
                    TenantResult::Updated => updated += 1,
                    TenantResult::Failed => failed += 1,
                    TenantResult::Skipped => continue,
                }
                if !settings.time_gap.is_zero() {
                    thread::sleep(settings.time_gap);
                }
            }

            transaction(store, |repo| repo.update_last_time_updated())?;
        }
    }

    fn update_tenant(&self, tenant: &Tenant) -> TenantResult {
        let reporter = self.ctx.reporter.as_ref();
        let fields = [
            ("tenant_id", tenant.id.as_str()),
            ("cluster", self.cluster.as_str()),
        ];

        let namespaces = match self.ctx.catalog.namespaces(&tenant.id) {
            Ok(namespaces) => namespaces,
            Err(e) => {
                reporter.report("unable to get tenant namespaces", &e, &fields);
                return TenantResult::Skipped;
            }
        };
        let env_types = stale_env_types(&namespaces, &self.versions, &self.ctx.commit);
        if env_types.is_empty() {
            debug!(tenant_id = %tenant.id, "tenant already up to date");
            return TenantResult::Skipped;
        }

        let result = self.ctx.executor.update(tenant, None, &env_types, false);
        if let Err(e) = self.ctx.catalog.record_attempt(
            &tenant.id,
            &env_types,
            &self.versions,
            &self.ctx.commit,
            result.is_ok(),
        ) {
            reporter.report("unable to record update attempt", &e, &fields);
        }

        match result {
            Ok(()) => {
                debug!(tenant_id = %tenant.id, ?env_types, "tenant updated");
                TenantResult::Updated
            }
            Err(e) => {
                reporter.report("tenant update failed", &e, &fields);
                if let Err(e) = transaction(self.ctx.store.as_ref(), |repo| repo.increment_failed_count()) {
                    reporter.report("unable to increment failed count", &e, &fields);
                }
                TenantResult::Failed
            }
        }
    }
}
