use crate::common::{Harness, record, versions_of};
use std::collections::BTreeMap;
use tup_common::{EnvType, RunState, RunStatus, UpdateFilter, VersionManager};
use tupd::TriggerOutcome;

const EAST: &str = "https://api.east.example.com";
const WEST: &str = "https://api.west.example.com";

fn managers() -> Vec<VersionManager> {
    vec![
        VersionManager::new("deploy", vec!["run".into(), "stage".into()], "2"),
        VersionManager::new("user", vec![EnvType::from("user")], "7"),
    ]
}

fn harness() -> Harness {
    Harness::new(
        RunState::default(),
        vec![
            record("dana", EAST, 50, &[("user", "6"), ("run", "1"), ("stage", "1")]),
            record("erin", WEST, 40, &[("user", "6"), ("run", "1")]),
        ],
        managers(),
    )
}

#[tokio::test]
async fn type_filter_updates_one_type_and_ends_incomplete() {
    let h = harness();

    let outcome = h
        .updater()
        .with_filter(UpdateFilter::only_type("user"))
        .update_all_tenants()
        .await;

    assert_eq!(outcome, TriggerOutcome::Completed(RunStatus::Incomplete));
    let mut calls = h.executor.calls();
    calls.sort();
    assert_eq!(
        calls,
        vec![
            ("dana".to_string(), vec![EnvType::from("user")]),
            ("erin".to_string(), vec![EnvType::from("user")]),
        ]
    );
    // Only the group fully inside the filter gets credit.
    let expected: BTreeMap<String, String> = [("user".to_string(), "7".to_string())].into();
    assert_eq!(h.state().versions, expected);
    assert_eq!(
        versions_of(h.store.as_ref(), "dana"),
        vec![
            ("user".to_string(), "7".to_string()),
            ("run".to_string(), "1".to_string()),
            ("stage".to_string(), "1".to_string()),
        ]
    );
}

#[tokio::test]
async fn incomplete_run_is_completed_by_the_next_unrestricted_trigger() {
    let h = harness();
    h.updater()
        .with_filter(UpdateFilter::only_type("user"))
        .update_all_tenants()
        .await;

    let outcome = h.updater().update_all_tenants().await;

    assert_eq!(outcome, TriggerOutcome::Completed(RunStatus::Finished));
    let state = h.state();
    assert_eq!(state.versions.get("deploy").map(String::as_str), Some("2"));
    assert_eq!(
        versions_of(h.store.as_ref(), "erin"),
        vec![
            ("user".to_string(), "7".to_string()),
            ("run".to_string(), "2".to_string()),
        ]
    );
}

#[tokio::test]
async fn cluster_filter_only_visits_that_cluster() {
    let h = harness();

    let outcome = h
        .updater()
        .with_filter(UpdateFilter::unrestricted().with_cluster(EAST))
        .update_all_tenants()
        .await;

    assert_eq!(outcome, TriggerOutcome::Completed(RunStatus::Incomplete));
    assert_eq!(h.executor.tenant_ids(), vec!["dana"]);
    assert_eq!(h.state().versions.len(), 2);
    assert_eq!(
        versions_of(h.store.as_ref(), "erin"),
        vec![
            ("user".to_string(), "6".to_string()),
            ("run".to_string(), "1".to_string()),
        ]
    );
}

#[tokio::test]
async fn blank_cluster_name_is_unrestricted() {
    let h = harness();

    let outcome = h
        .updater()
        .with_filter(UpdateFilter::unrestricted().with_cluster("  "))
        .update_all_tenants()
        .await;

    assert_eq!(outcome, TriggerOutcome::Completed(RunStatus::Finished));
    assert_eq!(h.executor.calls().len(), 2);
}
