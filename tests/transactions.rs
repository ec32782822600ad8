//! End-to-end session and commit behaviour against the sample schema.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use configd::error::ErrorKind;
use configd::{ConfigdError, Scope};

mod common;
use common::{p, FakeRunner, NTP_RESTART};

#[test]
fn test_session_flags() {
    let store = common::store();

    let err = store.session_setup("").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(store.session_count(), 0);

    store.session_setup("s1").unwrap();
    store.session_lock("s1").unwrap();
    store.session_lock("s1").unwrap();
    assert!(store.session_locked("s1"));
    store.session_unlock("s1").unwrap();
    assert!(!store.session_locked("s1"));

    store.session_mark_saved("s1").unwrap();
    assert!(store.session_saved("s1"));
    store.session_mark_unsaved("s1").unwrap();
    assert!(!store.session_saved("s1"));

    assert!(store.session_teardown("s1"));
    assert!(!store.session_exists("s1"));
}

#[test]
fn test_set_then_discard() {
    let store = common::store();
    store.session_setup("s1").unwrap();

    store.set("s1", &p(&["system", "host-name", "r1"])).unwrap();
    assert!(store.session_changed("s1"));

    store.discard("s1").unwrap();
    store.discard("s1").unwrap();
    assert!(!store.session_changed("s1"));
    assert!(!store.node_exists("s1", Scope::Auto, &p(&["system", "host-name", "r1"])));
}

#[test]
fn test_invalid_dataplane_name() {
    let store = common::store();
    store.session_setup("s1").unwrap();

    let err = store.set("s1", &p(&["interfaces", "dataplane", "3"])).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidPath);
    assert_eq!(
        err.to_string(),
        "Configuration path: interfaces dataplane [3] is not valid\n\n\
         Must be one of the following:\n  <dpFpNpS>\n  <dpFemN>\n  <dpFsN>\n\n\
         Value validation failed\n\n\
         Set failed\n"
    );
    assert!(!store.session_changed("s1"));
}

#[test]
fn test_validate_path_does_not_mutate() {
    let store = common::store();
    store.session_setup("s1").unwrap();

    store.validate_path(&p(&["system", "host-name", "r1"])).unwrap();
    assert!(store.validate_path(&p(&["system", "bogus"])).is_err());
    assert!(!store.session_changed("s1"));
}

#[tokio::test]
async fn test_ntp_commit_reports_restart() {
    let runner = Arc::new(FakeRunner::default());
    let store = common::store_with(runner.clone(), std::path::Path::new("/nonexistent"));
    store.session_setup("s1").unwrap();

    let server = p(&["system", "ntp", "server", "3.ca.pool.ntp.org"]);
    store.set("s1", &server).unwrap();
    let output = store.commit("s1", "").await.unwrap();

    assert_eq!(output, format!("[system ntp]\n{NTP_RESTART}\n"));
    assert!(store.node_exists("s1", Scope::Running, &server));
    assert_eq!(runner.seen(), vec!["system ntp".to_string()]);
}

#[tokio::test]
async fn test_actions_run_in_priority_order() {
    let runner = Arc::new(FakeRunner::default());
    let store = common::store_with(runner.clone(), std::path::Path::new("/nonexistent"));
    store.session_setup("s1").unwrap();

    store.set("s1", &p(&["service", "ssh", "port", "22"])).unwrap();
    store.set("s1", &p(&["system", "ntp", "server", "a.pool"])).unwrap();
    store
        .set("s1", &p(&["interfaces", "dataplane", "dp0s3", "mtu", "9000"]))
        .unwrap();
    store.commit("s1", "").await.unwrap();

    assert_eq!(
        runner.seen(),
        vec![
            "interfaces dataplane dp0s3".to_string(),
            "system ntp".to_string(),
            "service ssh".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_failed_action_keeps_running() {
    let runner = Arc::new(FakeRunner::failing_on("system ntp"));
    let store = common::store_with(runner, std::path::Path::new("/nonexistent"));
    store.session_setup("s1").unwrap();

    store.set("s1", &p(&["system", "ntp", "server", "a.pool"])).unwrap();
    let err = store.commit("s1", "").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::CommitActionFailed);
    assert!(err.to_string().contains("action failed"));
    assert!(store.running().is_empty());
    assert!(store.session_changed("s1"));
}

#[tokio::test]
async fn test_second_commit_is_busy() {
    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let runner = Arc::new(FakeRunner::gated(started.clone(), release.clone()));
    let store = common::store_with(runner, std::path::Path::new("/nonexistent"));

    store.session_setup("s1").unwrap();
    store.session_setup("s2").unwrap();
    store.set("s1", &p(&["system", "ntp", "server", "a.pool"])).unwrap();
    store.set("s2", &p(&["system", "host-name", "r2"])).unwrap();

    let first = {
        let store = store.clone();
        tokio::spawn(async move { store.commit("s1", "first").await })
    };
    started.notified().await;

    let err = store.commit("s2", "second").await.unwrap_err();
    assert!(matches!(err, ConfigdError::Busy));
    assert!(err.is_retryable());

    release.notify_one();
    first.await.unwrap().unwrap();

    store.commit("s2", "second").await.unwrap();
    let running = Scope::Running;
    assert!(store.node_exists("s2", running, &p(&["system", "ntp", "server", "a.pool"])));
    assert!(store.node_exists("s2", running, &p(&["system", "host-name", "r2"])));
}

#[tokio::test]
async fn test_other_session_sees_commit() {
    let store = common::store();
    store.session_setup("s1").unwrap();
    store.session_setup("s2").unwrap();

    store.set("s2", &p(&["system", "time-zone", "Europe/Paris"])).unwrap();
    store.set("s1", &p(&["system", "host-name", "r1"])).unwrap();
    store.commit("s1", "").await.unwrap();

    assert!(store.node_exists("s2", Scope::Auto, &p(&["system", "host-name", "r1"])));
    assert!(store.node_exists("s2", Scope::Auto, &p(&["system", "time-zone", "Europe/Paris"])));
    assert!(!store.session_changed("s1"));
    assert!(store.session_changed("s2"));
}

#[tokio::test]
async fn test_save_delete_load_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let boot = dir.path().join("config.boot");
    let store = common::store_with(Arc::new(FakeRunner::default()), &boot);
    store.session_setup("s1").unwrap();

    let host = p(&["system", "host-name", "r1"]);
    store.set("s1", &host).unwrap();
    store.set("s1", &p(&["system", "login", "user", "jo", "full-name", "Jo Smith"])).unwrap();
    store.commit("s1", "").await.unwrap();
    store.save().await.unwrap();

    store.delete("s1", &host).unwrap();
    assert!(!store.node_exists("s1", Scope::Auto, &host));

    store.load("s1", &boot).await.unwrap();
    assert!(store.node_exists("s1", Scope::Auto, &host));
    assert!(store.node_exists(
        "s1",
        Scope::Auto,
        &p(&["system", "login", "user", "jo", "full-name", "Jo Smith"])
    ));
    assert!(!store.session_changed("s1"));
}

#[tokio::test]
async fn test_load_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let store = common::store();
    store.session_setup("s1").unwrap();

    let err = store.load("s1", &dir.path().join("absent.boot")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PersistenceFailed);
}

#[tokio::test]
async fn test_stalled_action_times_out() {
    let started = Arc::new(Notify::new());
    let runner = Arc::new(FakeRunner::gated(started, Arc::new(Notify::new())));
    let store = common::store_with_timeout(
        runner.clone(),
        std::path::Path::new("/nonexistent"),
        Duration::from_millis(50),
    );
    store.session_setup("s1").unwrap();

    store.set("s1", &p(&["system", "ntp", "server", "a.pool"])).unwrap();
    let err = store.commit("s1", "").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::CommitActionFailed);
    assert!(err.to_string().contains("timed out after 50ms"));
    assert!(store.running().is_empty());
    assert_eq!(runner.seen(), vec!["system ntp".to_string()]);

    // The lock is free again once the timeout fired.
    store.discard("s1").unwrap();
    assert_eq!(store.commit("s1", "").await.unwrap(), "");
}

#[tokio::test]
async fn test_loaded_leaf_with_two_values_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("twice.boot");
    std::fs::write(&file, "system {\n    host-name r1\n    host-name r2\n}\n").unwrap();
    let store = common::store();
    store.session_setup("s1").unwrap();

    store.load("s1", &file).await.unwrap();
    let err = store.validate("s1").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidPath);
    assert!(err.to_string().contains("Node accepts only one value"));

    let err = store.commit("s1", "").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidPath);
    assert!(store.running().is_empty());
}

#[tokio::test]
async fn test_second_value_on_committed_leaf_is_not_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("twice.boot");
    std::fs::write(&file, "system {\n    host-name r1\n    host-name r2\n}\n").unwrap();
    let store = common::store();
    store.session_setup("s1").unwrap();
    store.set("s1", &p(&["system", "host-name", "r1"])).unwrap();
    store.commit("s1", "").await.unwrap();

    store.load("s1", &file).await.unwrap();
    assert!(store.session_changed("s1"));
    let err = store.commit("s1", "").await.unwrap_err();
    assert!(err.to_string().contains("Node accepts only one value"));
    assert_eq!(
        store.node_get("s1", Scope::Running, &p(&["system", "host-name"])),
        p(&["r1"])
    );
}

#[tokio::test]
async fn test_merge_adds_to_candidate() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("ntp.boot");
    std::fs::write(
        &file,
        "system {\n    ntp {\n        /* upstream */\n        server a.pool\n    }\n}\n",
    )
    .unwrap();
    let store = common::store();
    store.session_setup("s1").unwrap();
    store.set("s1", &p(&["system", "host-name", "r1"])).unwrap();

    store.merge("s1", &file).await.unwrap();

    let entry = p(&["system", "ntp", "server", "a.pool"]);
    assert!(store.node_exists("s1", Scope::Candidate, &p(&["system", "host-name", "r1"])));
    assert!(store.node_exists("s1", Scope::Candidate, &entry));
    assert_eq!(
        store.node_get_comment("s1", Scope::Candidate, &entry),
        Some("upstream".to_string())
    );
    assert!(store.session_changed("s1"));
}

#[tokio::test]
async fn test_confirmed_commit_survives_until_timeout() {
    let runner = Arc::new(FakeRunner::default());
    let store = common::store_with(runner.clone(), std::path::Path::new("/nonexistent"));
    store.session_setup("s1").unwrap();
    let server = p(&["system", "ntp", "server", "a.pool"]);

    store.set("s1", &server).unwrap();
    let output = store
        .confirmed_commit("s1", "try ntp", Duration::from_millis(150))
        .await
        .unwrap();
    assert_eq!(output, format!("[system ntp]\n{NTP_RESTART}\n"));
    assert!(store.node_exists("s1", Scope::Running, &server));

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(!store.node_exists("s1", Scope::Running, &server));
    // The revert runs the ntp action again.
    assert_eq!(runner.seen(), vec!["system ntp".to_string(), "system ntp".to_string()]);
}
