//! Run-state machine for tenant updates.
//!
//! One trigger evaluates the persisted [`RunState`] under the exclusive lock
//! and decides whether to start, restart, wait for or skip an update pass.
//! A pass fans out one blocking [`ClusterRunner`] per cluster, joins them
//! all, and finalizes the run status and version markers under lock.

use crate::cluster::{ClusterOutcome, ClusterRunner};
use crate::context::UpdateContext;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{Instrument, info, info_span, warn};
use tup_common::{
    EnvType, Repository, RunState, RunStatus, StoreError, TypeVersions, UpdateFilter,
    VersionRegistry, transaction,
};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{} cluster update(s) failed: {}", .0.len(), .0.join("; "))]
    Clusters(Vec<String>),

    #[error("background task failed: {0}")]
    Task(String),
}

/// What the decision phase asks the caller to do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Nothing is owed.
    NoOp,
    /// The run was prepared; update these types.
    Resume(Vec<EnvType>),
    /// Another run looks alive; sleep and recheck once.
    Wait,
}

/// Result of one trigger, as observed by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "detail")]
pub enum TriggerOutcome {
    NothingToUpdate,
    Completed(RunStatus),
    /// Another run was still within its timeout after the recheck.
    StillRunning,
    Failed(String),
}

/// Status a finished pass ends in. The kill switch wins over failures,
/// failures over a restricted filter.
pub fn final_status(state: &RunState, filter: &UpdateFilter) -> RunStatus {
    if !state.can_continue {
        RunStatus::Killed
    } else if state.failed_count > 0 {
        RunStatus::Failed
    } else if filter.is_restricted() {
        RunStatus::Incomplete
    } else {
        RunStatus::Finished
    }
}

#[derive(Clone)]
pub struct TenantsUpdater {
    ctx: UpdateContext,
    registry: Arc<VersionRegistry>,
    default_env_types: Vec<EnvType>,
    filter: UpdateFilter,
}

impl TenantsUpdater {
    pub fn new(ctx: UpdateContext, registry: Arc<VersionRegistry>, default_env_types: Vec<EnvType>) -> Self {
        Self {
            ctx,
            registry,
            default_env_types,
            filter: UpdateFilter::unrestricted(),
        }
    }

    pub fn with_filter(mut self, filter: UpdateFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Run one update cycle now.
    pub async fn update_all_tenants(&self) -> TriggerOutcome {
        let run_id = Uuid::new_v4();
        let span = info_span!(
            "tenants_update",
            %run_id,
            env_type = %self.filter.env_types.limit(),
            cluster = self.filter.cluster().unwrap_or("all"),
        );
        self.trigger().instrument(span).await
    }

    async fn trigger(&self) -> TriggerOutcome {
        let now = Utc::now();
        let decision = match self.blocking(move |this| this.decide(now)).await {
            Ok(decision) => decision,
            Err(e) => return self.handle_update_error("unable to evaluate run state", e).await,
        };

        let decision = match decision {
            Decision::Wait => match self.wait_and_recheck().await {
                Ok(decision) => decision,
                Err(e) => return self.handle_update_error("unable to recheck run state", e).await,
            },
            other => other,
        };

        match decision {
            Decision::NoOp => TriggerOutcome::NothingToUpdate,
            Decision::Wait => TriggerOutcome::StillRunning,
            Decision::Resume(env_types) => match self.update_tenants_for_types(env_types).await {
                Ok(status) => TriggerOutcome::Completed(status),
                Err(e) => self.handle_update_error("tenant update run failed", e).await,
            },
        }
    }

    /// Decide under lock and prepare the run when one must start.
    pub fn decide(&self, now: DateTime<Utc>) -> Result<Decision, UpdateError> {
        transaction(self.ctx.store.as_ref(), |repo| {
            let state = repo.get_tenants_update()?;
            match state.status {
                RunStatus::Finished => {
                    let outdated = self.registry.outdated_env_types(&state);
                    if outdated.is_empty() {
                        info!("all version markers are current, nothing to update");
                        return Ok(Decision::NoOp);
                    }
                    info!(env_types = ?outdated, "new versions available, starting update");
                    repo.prepare_for_updating()?;
                    Ok(Decision::Resume(outdated))
                }
                RunStatus::Failed | RunStatus::Killed | RunStatus::Incomplete => {
                    info!(status = %state.status, "previous run did not finish cleanly, restarting");
                    repo.prepare_for_updating()?;
                    Ok(Decision::Resume(self.default_env_types.clone()))
                }
                RunStatus::Updating => self.decide_while_updating(repo, &state, now),
            }
        })
    }

    fn decide_while_updating(
        &self,
        repo: &mut Repository<'_>,
        state: &RunState,
        now: DateTime<Utc>,
    ) -> Result<Decision, UpdateError> {
        if state.is_older_than(self.ctx.settings.retry_sleep, now) {
            warn!(
                last_time_updated = %state.last_time_updated,
                "update run has not made progress within the retry timeout, restarting"
            );
            repo.prepare_for_updating()?;
            Ok(Decision::Resume(self.default_env_types.clone()))
        } else {
            Ok(Decision::Wait)
        }
    }

    /// Sleep once past the retry timeout, then re-evaluate a run that looked alive.
    async fn wait_and_recheck(&self) -> Result<Decision, UpdateError> {
        let delay = self.ctx.settings.recheck_delay();
        info!(
            delay = %humantime::format_duration(delay),
            "another update run is in progress, rechecking later"
        );
        tokio::time::sleep(delay).await;

        self.blocking(|this| {
            transaction(this.ctx.store.as_ref(), |repo| {
                let state = repo.get_tenants_update()?;
                // Only a run still marked Updating is rechecked for timeout. A run
                // that ended while we slept is left to the next trigger.
                if state.status != RunStatus::Updating {
                    info!(status = %state.status, "the other update run has ended");
                    return Ok(Decision::NoOp);
                }
                let decision = this.decide_while_updating(repo, &state, Utc::now())?;
                if decision == Decision::Wait {
                    info!("update run is still in progress, leaving it to the next trigger");
                }
                Ok(decision)
            })
        })
        .await
    }

    /// Update every cluster for `env_types`, then finalize the run.
    async fn update_tenants_for_types(&self, env_types: Vec<EnvType>) -> Result<RunStatus, UpdateError> {
        let versions: TypeVersions = env_types
            .iter()
            .filter(|t| self.filter.accepts(t))
            .filter_map(|t| self.registry.target_version(t).map(|v| (t.clone(), v)))
            .collect();

        let clusters = {
            let versions = versions.clone();
            self.blocking(move |this| {
                Ok(this.ctx.catalog.clusters_to_update(&versions, &this.ctx.commit)?)
            })
            .await?
        };
        let clusters: Vec<String> = clusters
            .into_iter()
            .filter(|c| self.filter.cluster().is_none_or(|only| only == c))
            .collect();
        info!(clusters = clusters.len(), ?versions, "starting update pass");

        let mut runners = JoinSet::new();
        for cluster in clusters {
            let runner = ClusterRunner::new(self.ctx.clone(), cluster, versions.clone());
            runners.spawn_blocking(move || {
                let result = runner.run();
                (runner.cluster().to_string(), result)
            });
        }

        let mut errors = Vec::new();
        while let Some(joined) = runners.join_next().await {
            match joined {
                Ok((cluster, Ok(outcome))) => log_outcome(&cluster, &outcome),
                Ok((cluster, Err(e))) => {
                    self.ctx
                        .reporter
                        .report("cluster update failed", &e, &[("cluster", cluster.as_str())]);
                    errors.push(format!("{cluster}: {e}"));
                }
                Err(e) => errors.push(format!("cluster runner panicked: {e}")),
            }
        }

        let status = self
            .blocking(|this| this.set_status_and_versions_after_update())
            .await?;

        if errors.is_empty() {
            Ok(status)
        } else {
            Err(UpdateError::Clusters(errors))
        }
    }

    fn set_status_and_versions_after_update(&self) -> Result<RunStatus, UpdateError> {
        transaction(self.ctx.store.as_ref(), |repo| {
            let mut state = repo.get_tenants_update()?;
            state.status = final_status(&state, &self.filter);
            let committed = self.registry.commit_covered(&self.filter, &mut state);
            repo.save_tenants_update(&state)?;
            info!(
                status = %state.status,
                failed_count = state.failed_count,
                ?committed,
                "update run finished"
            );
            Ok(state.status)
        })
    }

    async fn handle_update_error(&self, message: &str, err: UpdateError) -> TriggerOutcome {
        let commit = self.ctx.commit.clone();
        self.ctx.reporter.report(message, &err, &[("commit", commit.as_str())]);

        let marked = self
            .blocking(|this| {
                Ok(transaction(this.ctx.store.as_ref(), |repo| {
                    repo.update_status(RunStatus::Failed)
                })?)
            })
            .await;
        if let Err(e) = marked {
            self.ctx
                .reporter
                .report("unable to mark update run as failed", &e, &[("commit", commit.as_str())]);
        }
        TriggerOutcome::Failed(err.to_string())
    }

    /// Run store work off the async executor; the run-state lock may block.
    async fn blocking<T, F>(&self, work: F) -> Result<T, UpdateError>
    where
        T: Send + 'static,
        F: FnOnce(&TenantsUpdater) -> Result<T, UpdateError> + Send + 'static,
    {
        let this = self.clone();
        tokio::task::spawn_blocking(move || work(&this))
            .await
            .map_err(|e| UpdateError::Task(e.to_string()))?
    }
}

fn log_outcome(cluster: &str, outcome: &ClusterOutcome) {
    let summary = serde_json::to_string(outcome).unwrap_or_default();
    if outcome.stopped_early() {
        warn!(cluster, %summary, "cluster update stopped early");
    } else {
        info!(cluster, %summary, "cluster update done");
    }
}
