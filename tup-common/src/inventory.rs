//! In-process tenant inventory with the reference outdated-namespace queries.
//!
//! Both bundled stores keep their tenants in a [`TenantInventory`]. A
//! namespace is outdated for a pass when its type is targeted, it is behind
//! the target version or failed, and the current updater commit has not
//! already attempted it. The commit exclusion is what makes a cluster pass
//! terminate while some tenants keep failing.

use crate::errors::StoreError;
use crate::types::{EnvType, Namespace, NamespaceState, Tenant, TenantRecord, TypeVersions};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantInventory {
    records: Vec<TenantRecord>,
}

fn is_outdated(namespace: &Namespace, versions: &TypeVersions, commit: &str) -> bool {
    match versions.get(&namespace.env_type) {
        Some(target) => namespace.needs_update(target) && namespace.updated_by != commit,
        None => false,
    }
}

/// Types of `namespaces` that the current pass still has to refresh, in namespace order.
pub fn stale_env_types(namespaces: &[Namespace], versions: &TypeVersions, commit: &str) -> Vec<EnvType> {
    let mut types = Vec::new();
    for namespace in namespaces.iter().filter(|ns| is_outdated(ns, versions, commit)) {
        if !types.contains(&namespace.env_type) {
            types.push(namespace.env_type.clone());
        }
    }
    types
}

impl TenantInventory {
    pub fn new(records: Vec<TenantRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[TenantRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Insert a tenant, replacing any record with the same id.
    pub fn upsert(&mut self, record: TenantRecord) {
        match self
            .records
            .iter_mut()
            .find(|r| r.tenant.id == record.tenant.id)
        {
            Some(existing) => *existing = record,
            None => self.records.push(record),
        }
    }

    pub fn clusters_to_update(&self, versions: &TypeVersions, commit: &str) -> Vec<String> {
        let clusters: BTreeSet<&str> = self
            .records
            .iter()
            .flat_map(|r| r.namespaces.iter())
            .filter(|ns| is_outdated(ns, versions, commit))
            .map(|ns| ns.cluster.as_str())
            .collect();
        clusters.into_iter().map(str::to_string).collect()
    }

    pub fn tenants_to_update(
        &self,
        versions: &TypeVersions,
        limit: usize,
        commit: &str,
        cluster: &str,
    ) -> Vec<Tenant> {
        let mut overdue: Vec<(DateTime<Utc>, &Tenant)> = self
            .records
            .iter()
            .filter_map(|record| {
                record
                    .namespaces
                    .iter()
                    .filter(|ns| ns.cluster == cluster && is_outdated(ns, versions, commit))
                    .map(|ns| ns.updated_at)
                    .min()
                    .map(|oldest| (oldest, &record.tenant))
            })
            .collect();
        // Stable sort keeps inventory order among equally overdue tenants.
        overdue.sort_by_key(|(oldest, _)| *oldest);
        overdue
            .into_iter()
            .take(limit)
            .map(|(_, tenant)| tenant.clone())
            .collect()
    }

    pub fn namespaces(&self, tenant_id: &str) -> Result<Vec<Namespace>, StoreError> {
        self.find(tenant_id).map(|r| r.namespaces.clone())
    }

    /// Stamp the attempted namespaces with `commit` and the attempt outcome.
    pub fn record_attempt(
        &mut self,
        tenant_id: &str,
        env_types: &[EnvType],
        versions: &TypeVersions,
        commit: &str,
        succeeded: bool,
    ) -> Result<(), StoreError> {
        let record = self
            .records
            .iter_mut()
            .find(|r| r.tenant.id == tenant_id)
            .ok_or_else(|| StoreError::UnknownTenant(tenant_id.to_string()))?;
        let now = Utc::now();
        for namespace in record
            .namespaces
            .iter_mut()
            .filter(|ns| env_types.contains(&ns.env_type))
        {
            namespace.updated_by = commit.to_string();
            namespace.updated_at = now;
            if succeeded {
                if let Some(target) = versions.get(&namespace.env_type) {
                    namespace.version = target.clone();
                }
                namespace.state = NamespaceState::Ready;
            } else {
                namespace.state = NamespaceState::Failed;
            }
        }
        Ok(())
    }

    fn find(&self, tenant_id: &str) -> Result<&TenantRecord, StoreError> {
        self.records
            .iter()
            .find(|r| r.tenant.id == tenant_id)
            .ok_or_else(|| StoreError::UnknownTenant(tenant_id.to_string()))
    }
}
