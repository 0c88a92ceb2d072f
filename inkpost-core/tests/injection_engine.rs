mod support;

use inkpost_core::alerts::AlertGuard;
use inkpost_core::browser::DocumentContext;
use inkpost_core::editor::{
    ContentInjectionEngine, EditorMode, InjectionError, InjectionOutcome, InjectionRequest,
    PostField, EXISTING_CONTENT,
};
use inkpost_core::InkpostConfig;
use tempfile::tempdir;

use support::{
    test_config, Effect, FakeSession, CODE_SURFACE, RAW_TOGGLE, RENDERED_TOGGLE, RICH_BODY,
    RICH_FRAME, TITLE,
};

fn engine(config: &InkpostConfig) -> ContentInjectionEngine {
    ContentInjectionEngine::from_config(config, AlertGuard::from_config(&config.alerts))
}

fn rendered_composer() -> FakeSession {
    let mut session = FakeSession::composer();
    session.active.remove(RAW_TOGGLE);
    session.active.insert(RENDERED_TOGGLE.into());
    session
}

fn long_body(len: usize) -> String {
    let filler = "a".repeat(len - "<p></p>".len());
    format!("<p>{filler}</p>")
}

#[tokio::test]
async fn falls_through_to_keystrokes_when_editor_apis_are_missing() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let engine = engine(&config);
    let mut session = rendered_composer();
    session.disabled_scripts.insert("rich_editor_api");
    session.disabled_scripts.insert("nested_document_write");
    let body = long_body(5000);

    let report = engine
        .inject(
            &mut session,
            &InjectionRequest::new(PostField::Body, body.clone()).in_mode(EditorMode::Rendered),
        )
        .await
        .unwrap();

    assert_eq!(report.outcome, InjectionOutcome::Success);
    assert_eq!(report.mode, Some(EditorMode::Rendered));
    assert_eq!(report.threshold, 4500);
    let ids: Vec<_> = report
        .attempts
        .iter()
        .map(|attempt| (attempt.strategy_id.as_str(), attempt.succeeded))
        .collect();
    assert_eq!(
        ids,
        vec![
            ("rich_editor_api", false),
            ("nested_document_write", false),
            ("chunked_keystrokes", true),
        ]
    );
    assert!(report.last_attempt().unwrap().observed_length >= 5000);
    assert_eq!(session.calls_to("insert_text"), 13);
    let frame = DocumentContext::Frame(RICH_FRAME.into());
    assert_eq!(session.surface(&frame, RICH_BODY), Some(body.as_str()));
    assert_eq!(session.context, DocumentContext::TopLevel);
}

#[tokio::test]
async fn short_reads_retry_each_strategy_once_then_exhaust() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let engine = engine(&config);
    let mut session = FakeSession::composer();
    session.write_caps.insert(CODE_SURFACE.into(), 100);

    let report = engine
        .inject(&mut session, &InjectionRequest::new(PostField::Body, long_body(1000)))
        .await
        .unwrap();

    assert_eq!(report.outcome, InjectionOutcome::Exhausted);
    assert_eq!(report.mode, Some(EditorMode::RawMarkup));
    assert_eq!(report.attempts.len(), 3);
    assert!(report.attempts.iter().all(|attempt| !attempt.succeeded));
    assert!(report.attempts.iter().all(|attempt| attempt.observed_length == 100));
    assert!(report.attempts[0].evidence.contains("short read 100/900"));
    assert_eq!(session.calls_to("code_surface_api"), 2);
    assert_eq!(session.calls_to("value_assignment"), 2);
    assert_eq!(session.calls_to("focus_surface"), 2);
    assert_eq!(session.context, DocumentContext::TopLevel);
}

#[tokio::test]
async fn unavailable_strategy_is_not_retried() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let engine = engine(&config);
    let mut session = FakeSession::composer();
    session.disabled_scripts.insert("code_surface_api");

    let report = engine
        .inject(&mut session, &InjectionRequest::new(PostField::Body, "<p>short body</p>"))
        .await
        .unwrap();

    assert!(report.succeeded());
    assert_eq!(session.calls_to("code_surface_api"), 1);
    assert!(report.attempts[0].evidence.starts_with("unavailable"));
    assert_eq!(report.last_attempt().unwrap().strategy_id, "value_assignment");
}

#[tokio::test]
async fn reinjecting_identical_content_leaves_the_surface_alone() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let engine = engine(&config);
    let mut session = FakeSession::composer();
    let body = "<h2>Morning notes</h2>\n<p>Three things worth writing down today.</p>";
    let request = InjectionRequest::new(PostField::Body, body);

    let first = engine.inject(&mut session, &request).await.unwrap();
    assert_eq!(first.last_attempt().unwrap().strategy_id, "code_surface_api");
    let after_first = session.top_surface(CODE_SURFACE).unwrap().to_string();

    let second = engine.inject(&mut session, &request).await.unwrap();
    assert!(second.succeeded());
    assert_eq!(second.attempts.len(), 1);
    assert_eq!(second.attempts[0].strategy_id, EXISTING_CONTENT);
    assert_eq!(session.top_surface(CODE_SURFACE), Some(after_first.as_str()));
    assert_eq!(session.calls_to("code_surface_api"), 1);
}

#[tokio::test]
async fn mode_switch_clears_the_confirmation_dialog() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let engine = engine(&config);
    let mut session = FakeSession::composer();
    let warning = "서식이 사라질 수 있습니다. 계속하시겠습니까?";
    session.on_click.insert(
        RENDERED_TOGGLE.into(),
        vec![
            Effect::Deactivate(RAW_TOGGLE.into()),
            Effect::Activate(RENDERED_TOGGLE.into()),
            Effect::Dialog(warning.into()),
        ],
    );

    let report = engine
        .inject(
            &mut session,
            &InjectionRequest::new(PostField::Body, "<p>rendered body</p>").in_mode(EditorMode::Rendered),
        )
        .await
        .unwrap();

    assert_eq!(session.clicks, vec![RENDERED_TOGGLE.to_string()]);
    assert_eq!(session.resolved, vec![(warning.to_string(), true)]);
    assert_eq!(report.mode, Some(EditorMode::Rendered));
    assert_eq!(report.last_attempt().unwrap().strategy_id, "rich_editor_api");
    let frame = DocumentContext::Frame(RICH_FRAME.into());
    assert_eq!(session.surface(&frame, RICH_BODY), Some("<p>rendered body</p>"));
    assert_eq!(session.top_surface(CODE_SURFACE), Some(""));
}

#[tokio::test(start_paused = true)]
async fn unconfirmed_mode_switch_is_an_error() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let engine = engine(&config);
    let mut session = FakeSession::composer();

    let err = engine
        .inject(
            &mut session,
            &InjectionRequest::new(PostField::Body, "<p>body</p>").in_mode(EditorMode::Rendered),
        )
        .await
        .unwrap_err();

    match err {
        InjectionError::ModeSwitch { desired, observed, reason } => {
            assert_eq!(desired, EditorMode::Rendered);
            assert_eq!(observed, EditorMode::RawMarkup);
            assert!(reason.contains("not confirmed"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(session.calls_to("rich_editor_api"), 0);
}

#[tokio::test]
async fn missing_toggle_fails_the_switch_without_clicking() {
    let dir = tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.mode.rendered_toggle = None;
    let engine = engine(&config);
    let mut session = FakeSession::composer();

    let err = engine
        .select_mode(&mut session, EditorMode::Rendered)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no mode toggle configured"));
    assert!(session.clicks.is_empty());
}

#[tokio::test]
async fn title_goes_through_value_assignment() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let engine = engine(&config);
    let mut session = FakeSession::composer();

    let report = engine
        .inject(&mut session, &InjectionRequest::new(PostField::Title, "가을 산책 기록"))
        .await
        .unwrap();

    assert!(report.succeeded());
    assert_eq!(report.mode, None);
    assert_eq!(report.attempts.len(), 1);
    assert_eq!(session.top_surface(TITLE), Some("가을 산책 기록"));
}

#[tokio::test]
async fn blank_payload_is_rejected_before_touching_the_page() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let engine = engine(&config);
    let mut session = FakeSession::composer();

    let err = engine
        .inject(&mut session, &InjectionRequest::new(PostField::Title, "  \n "))
        .await
        .unwrap_err();
    assert!(matches!(err, InjectionError::EmptyPayload(PostField::Title)));
    assert!(session.calls.is_empty());
}

#[tokio::test]
async fn missing_surface_exhausts_with_one_entry_per_strategy() {
    let dir = tempdir().unwrap();
    let config = test_config(dir.path());
    let engine = engine(&config);
    let mut session = FakeSession::composer();
    session.remove_surface(TITLE);

    let report = engine
        .inject(&mut session, &InjectionRequest::new(PostField::Title, "title"))
        .await
        .unwrap();
    assert_eq!(report.outcome, InjectionOutcome::Exhausted);
    assert_eq!(report.attempts.len(), 2);
    assert!(report
        .attempts
        .iter()
        .all(|attempt| attempt.evidence == "no editing surface resolved"));
}
