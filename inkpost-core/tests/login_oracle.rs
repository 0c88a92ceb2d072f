mod support;

use inkpost_core::alerts::AlertGuard;
use inkpost_core::auth::{
    LoginState, LoginStateOracle, SessionArtifact, SessionStore, SIGNAL_LOCATION,
};
use tempfile::tempdir;

use support::{auth_cookie, test_config, FakeSession, AUTH_VALUE, HOME, LOGIN, MARKER};

fn saved_artifacts(config: &inkpost_core::InkpostConfig) -> Vec<SessionArtifact> {
    SessionStore::from_config(config)
        .scope()
        .artifact_from_cookie(&auth_cookie(AUTH_VALUE))
        .into_iter()
        .collect()
}

fn oracle(config: &inkpost_core::InkpostConfig) -> LoginStateOracle {
    LoginStateOracle::from_config(config, AlertGuard::from_config(&config.alerts))
}

#[tokio::test]
async fn replayed_target_artifacts_are_confidently_authenticated() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let oracle = oracle(&config);
    let artifacts = saved_artifacts(&config);
    let mut session = FakeSession::default();

    assert!(oracle.replay(&mut session, &artifacts).await);
    let verdict = oracle.evaluate(&mut session).await;

    assert!(verdict.confident);
    assert_eq!(verdict.state, LoginState::Authenticated);
    assert_eq!(verdict.votes[0].signal, SIGNAL_LOCATION);
    assert!(verdict.positive_signals().count() >= 2);
    assert_eq!(session.visits.first().map(String::as_str), Some(HOME));
}

#[tokio::test]
async fn artifacts_for_an_unrelated_target_leave_the_verdict_unknown() {
    let dir = tempdir().unwrap();
    let example = test_config(dir.path());
    let artifacts = saved_artifacts(&example);

    let mut other = test_config(dir.path());
    other.target.id = "other-blog".into();
    other.target.canonical_domain = ".other.test".into();
    let oracle = oracle(&other);
    let mut session = FakeSession::default();

    oracle.replay(&mut session, &artifacts).await;
    let verdict = oracle.evaluate(&mut session).await;

    assert!(session.jar.is_empty(), "foreign artifacts must not be applied");
    assert!(!verdict.confident);
    assert_eq!(verdict.state, LoginState::Unknown);
}

#[tokio::test]
async fn login_page_is_never_confident_even_with_markers() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let oracle = oracle(&config);
    let mut session = FakeSession::default().signed_in();
    session.url = LOGIN.into();
    // Marker visible regardless of the page.
    session.visible.insert(MARKER.into());

    let verdict = oracle.evaluate(&mut session).await;

    assert!(!verdict.confident);
    assert!(!verdict.votes[0].positive);
}

#[tokio::test]
async fn empty_jar_on_login_page_is_unauthenticated() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let oracle = oracle(&config);
    let mut session = FakeSession::default();
    session.url = LOGIN.into();

    let verdict = oracle.evaluate(&mut session).await;
    assert_eq!(verdict.state, LoginState::Unauthenticated);
    assert!(!verdict.confident);
}

#[tokio::test]
async fn rejected_cookie_is_retried_in_reduced_form() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let oracle = oracle(&config);
    let artifacts = saved_artifacts(&config);
    let mut session = FakeSession::default();
    session.reject_full_cookies = true;

    assert!(oracle.replay(&mut session, &artifacts).await);
    assert_eq!(session.jar.len(), 1);
    let cookie = &session.jar[0];
    assert_eq!(cookie.domain.as_deref(), Some(".example.test"));
    assert!(cookie.path.is_none());
    assert!(oracle.evaluate(&mut session).await.confident);
}

#[tokio::test]
async fn navigation_is_retried_once_then_reported() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let oracle = oracle(&config);
    let artifacts = saved_artifacts(&config);

    let mut flaky = FakeSession::default();
    flaky.goto_failures = 1;
    assert!(oracle.replay(&mut flaky, &artifacts).await);
    assert_eq!(flaky.visits.len(), 2);

    let mut broken = FakeSession::default();
    broken.goto_failures = 5;
    assert!(!oracle.replay(&mut broken, &artifacts).await);
    assert_eq!(broken.visits.len(), 2);
    let verdict = oracle.evaluate(&mut broken).await;
    assert_eq!(verdict.state, LoginState::Unknown);
}

#[tokio::test]
async fn dialog_blocking_navigation_is_cleared_before_the_retry() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let oracle = oracle(&config);
    let mut session = FakeSession::default();
    session.dialog_blocks_navigation = true;
    session
        .dialogs
        .push_back("이어서 작성하시겠습니까? 저장된 글이 있습니다.".into());

    assert!(oracle.navigate(&mut session, HOME).await);
    assert_eq!(session.visits.len(), 2);
    assert_eq!(session.url, HOME);
    assert_eq!(session.resolved.len(), 1);
    assert!(!session.resolved[0].1);
}

#[tokio::test]
async fn non_transient_navigation_failure_is_not_retried() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let oracle = oracle(&config);
    let mut session = FakeSession::default();
    session.goto_fatal = true;

    assert!(!oracle.navigate(&mut session, HOME).await);
    assert_eq!(session.visits.len(), 1);
}

#[tokio::test]
async fn storage_artifacts_are_restored_during_replay() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let oracle = oracle(&config);
    let mut artifacts = saved_artifacts(&config);
    artifacts.push(SessionArtifact::storage("editor:prefs", "{\"mode\":\"html\"}", ".example.test"));
    artifacts.push(SessionArtifact::storage("foreign", "x", ".other.test"));
    let mut session = FakeSession::default();

    assert!(oracle.replay(&mut session, &artifacts).await);
    assert_eq!(
        session.storage,
        vec![("editor:prefs".to_string(), "{\"mode\":\"html\"}".to_string())]
    );
    assert_eq!(session.calls_to("storage_restore"), 1);
}
