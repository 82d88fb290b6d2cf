use crate::common::{
    COMMIT, FlakyCatalog, Harness, RecordingReporter, ScriptedExecutor, UnavailableStore, record,
};
use std::sync::Arc;
use tup_common::{
    RunState, RunStatus, VersionManager, VersionRegistry, default_env_types, transaction,
};
use tupd::{TenantsUpdater, TriggerOutcome, UpdateContext};

const HEALTHY: &str = "https://api.healthy.example.com";
const BROKEN: &str = "https://api.broken.example.com";

#[tokio::test]
async fn cluster_error_fails_the_run_without_stopping_siblings() {
    let h = Harness::new(
        RunState::default(),
        vec![
            record("fred", HEALTHY, 20, &[("run", "1")]),
            record("gina", BROKEN, 10, &[("run", "1")]),
        ],
        vec![VersionManager::new("deploy", vec!["run".into()], "2")],
    );
    let mut ctx = h.context();
    ctx.catalog = Arc::new(FlakyCatalog {
        inner: h.store.clone(),
        broken_cluster: BROKEN.to_string(),
    });
    let updater = TenantsUpdater::new(ctx, h.registry.clone(), default_env_types());

    let outcome = updater.update_all_tenants().await;

    match outcome {
        TriggerOutcome::Failed(reason) => {
            assert!(reason.contains(BROKEN), "unexpected reason: {reason}");
            assert!(!reason.contains(HEALTHY));
        }
        other => panic!("expected Failed, got {other:?}"),
    }
    assert_eq!(h.executor.tenant_ids(), vec!["fred"]);
    let state = h.state();
    assert_eq!(state.status, RunStatus::Failed);
    assert_eq!(state.failed_count, 0);
    let messages = h.reporter.messages();
    assert!(messages.contains(&"cluster update failed".to_string()));
    assert!(messages.contains(&"tenant update run failed".to_string()));
}

#[tokio::test]
async fn failed_run_retries_the_tenant_on_the_next_trigger_with_a_new_build() {
    let h = Harness::new(
        RunState::default(),
        vec![record("hank", HEALTHY, 20, &[("run", "1")])],
        vec![VersionManager::new("deploy", vec!["run".into()], "2")],
    )
    .with_executor(ScriptedExecutor::new().failing(&["hank"]));

    assert_eq!(
        h.updater().update_all_tenants().await,
        TriggerOutcome::Completed(RunStatus::Failed)
    );

    // Same build: the failed namespace is stamped with this commit and not refetched.
    assert_eq!(
        h.updater().update_all_tenants().await,
        TriggerOutcome::Completed(RunStatus::Finished)
    );
    assert_eq!(h.executor.tenant_ids(), vec!["hank"]);

    // A new build picks it up again.
    let mut ctx = h.context();
    ctx.commit = format!("{COMMIT}-next");
    let next = TenantsUpdater::new(ctx, h.registry.clone(), default_env_types());
    transaction(h.store.as_ref(), |repo| repo.update_status(RunStatus::Failed)).unwrap();
    assert_eq!(
        next.update_all_tenants().await,
        TriggerOutcome::Completed(RunStatus::Failed)
    );
    assert_eq!(h.executor.tenant_ids(), vec!["hank", "hank"]);
}

#[tokio::test]
async fn lock_failure_is_reported_and_returned() {
    let reporter = Arc::new(RecordingReporter::default());
    let executor = Arc::new(ScriptedExecutor::new());
    let h = Harness::new(RunState::default(), vec![], vec![]);
    let ctx = UpdateContext {
        store: Arc::new(UnavailableStore),
        catalog: h.store.clone(),
        executor: executor.clone(),
        reporter: reporter.clone(),
        settings: h.settings.clone(),
        commit: COMMIT.to_string(),
    };
    let updater = TenantsUpdater::new(ctx, Arc::new(VersionRegistry::new(vec![])), default_env_types());

    let outcome = updater.update_all_tenants().await;

    assert!(matches!(outcome, TriggerOutcome::Failed(reason) if reason.contains("timed out")));
    assert_eq!(
        reporter.messages(),
        vec!["unable to evaluate run state", "unable to mark update run as failed"]
    );
    assert!(executor.calls().is_empty());
}
