mod support;

use inkpost_core::alerts::AlertGuard;
use inkpost_core::config::Disposition;
use tempfile::tempdir;

use support::{test_config, FakeSession};

#[tokio::test]
async fn queued_dialogs_are_resolved_by_rule() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let guard = AlertGuard::from_config(&config.alerts);
    let mut session = FakeSession::default();
    session.dialogs.extend([
        "이어서 작성하시겠습니까? 저장된 글이 있습니다.".to_string(),
        "Changes you made may not be saved. Leave this site?".to_string(),
        "Something unrelated".to_string(),
    ]);

    let cleared = guard.drain_default(&mut session).await;

    assert_eq!(cleared, 3);
    let dispositions: Vec<bool> = session.resolved.iter().map(|(_, accept)| *accept).collect();
    assert_eq!(dispositions, vec![false, true, true]);
    assert!(session.dialogs.is_empty());
}

#[tokio::test]
async fn unmatched_dialog_uses_the_requested_default() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let guard = AlertGuard::from_config(&config.alerts);
    let mut session = FakeSession::default();
    session.dialogs.push_back("Something unrelated".into());

    assert_eq!(guard.drain(&mut session, 3, Disposition::Dismiss).await, 1);
    assert_eq!(session.resolved, vec![("Something unrelated".to_string(), false)]);
}

#[tokio::test]
async fn sticky_dialog_stops_at_the_attempt_bound() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let guard = AlertGuard::from_config(&config.alerts);
    let mut session = FakeSession::default();
    session.sticky_dialog = Some("Leave site?".into());

    let cleared = guard.drain_default(&mut session).await;

    assert_eq!(cleared, config.alerts.max_attempts);
    assert_eq!(session.resolved.len(), config.alerts.max_attempts);
}

#[tokio::test]
async fn quiet_page_resolves_nothing() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let guard = AlertGuard::from_config(&config.alerts);
    let mut session = FakeSession::default();

    assert_eq!(guard.drain_default(&mut session).await, 0);
    assert!(session.resolved.is_empty());
}

#[tokio::test]
async fn failed_dialog_detection_counts_as_no_dialog() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let guard = AlertGuard::from_config(&config.alerts);
    let mut session = FakeSession::default();
    session.dialogs.push_back("Leave site?".into());
    session.dialog_probe_fails = true;

    assert_eq!(guard.drain_default(&mut session).await, 0);
    assert_eq!(session.calls_to("resolve_dialog"), 0);
    assert_eq!(session.dialogs.len(), 1);
}
