use crate::common::{COMMIT, RecordingReporter, ScriptedExecutor, record};
use std::sync::Arc;
use std::time::Duration;
use tup_common::{
    FileStore, RunStatus, UpdateSettings, VersionManager, VersionRegistry, default_env_types,
    test_log, transaction,
};
use tupd::{TenantsUpdater, TriggerOutcome, UpdateContext};

const CLUSTER: &str = "https://api.file.example.com";

fn updater(store: &Arc<FileStore>, executor: &Arc<ScriptedExecutor>) -> TenantsUpdater {
    let ctx = UpdateContext {
        store: store.clone(),
        catalog: store.clone(),
        executor: executor.clone(),
        reporter: Arc::new(RecordingReporter::default()),
        settings: UpdateSettings {
            time_gap: Duration::ZERO,
            ..UpdateSettings::default()
        },
        commit: COMMIT.to_string(),
    };
    let registry = VersionRegistry::new(vec![VersionManager::new("deploy", vec!["run".into()], "2")]);
    TenantsUpdater::new(ctx, Arc::new(registry), default_env_types())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn full_run_persists_state_and_inventory() {
    test_log!("TEST START: full_run_persists_state_and_inventory");
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::open(dir.path().join("state.json"), Duration::from_secs(5)));
    for (i, id) in ["ivan", "judy", "kate"].iter().enumerate() {
        store
            .upsert_tenant(record(id, CLUSTER, 30 - i as i64, &[("run", "1")]))
            .unwrap();
    }
    let executor = Arc::new(ScriptedExecutor::new().failing(&["judy"]));

    let outcome = updater(&store, &executor).update_all_tenants().await;

    assert_eq!(outcome, TriggerOutcome::Completed(RunStatus::Failed));
    assert_eq!(executor.tenant_ids(), vec!["ivan", "judy", "kate"]);

    // A fresh handle sees everything that was committed.
    let reopened = FileStore::open(dir.path().join("state.json"), Duration::from_secs(5));
    let document = reopened.read_document().unwrap();
    assert_eq!(document.run_state.status, RunStatus::Failed);
    assert_eq!(document.run_state.failed_count, 1);
    assert_eq!(document.run_state.versions.get("deploy").map(String::as_str), Some("2"));
    let versions: Vec<&str> = document
        .tenants
        .records()
        .iter()
        .map(|r| r.namespaces[0].version.as_str())
        .collect();
    assert_eq!(versions, vec!["2", "1", "2"]);
    // The run released the lock; an impatient handle gets it straight away.
    let impatient = FileStore::open(dir.path().join("state.json"), Duration::from_millis(50));
    transaction(&impatient, |repo| repo.get_tenants_update()).unwrap();
    test_log!("TEST PASS: full_run_persists_state_and_inventory");
}

#[tokio::test]
async fn kill_through_a_second_handle_is_seen_by_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let store = Arc::new(FileStore::open(&path, Duration::from_secs(5)));
    for (i, id) in ["lena", "mike", "nora"].iter().enumerate() {
        store
            .upsert_tenant(record(id, CLUSTER, 30 - i as i64, &[("run", "1")]))
            .unwrap();
    }
    let operator = FileStore::open(&path, Duration::from_secs(5));
    let executor = Arc::new(ScriptedExecutor::new().on_update(move |tenant| {
        if tenant.id == "lena" {
            transaction(&operator, |repo| repo.request_stop()).unwrap();
        }
    }));

    let outcome = updater(&store, &executor).update_all_tenants().await;

    assert_eq!(outcome, TriggerOutcome::Completed(RunStatus::Killed));
    assert_eq!(executor.tenant_ids(), vec!["lena"]);
}
