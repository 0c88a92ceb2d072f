use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::alerts::AlertGuard;
use crate::browser::{find_text, probe_element, restore_storage, BrowserSession};
use crate::config::{InkpostConfig, OracleSection};

use super::artifact::{DomainScope, OriginKind, SessionArtifact};

pub const SIGNAL_LOCATION: &str = "location";
pub const SIGNAL_DOM_MARKERS: &str = "dom_markers";
pub const SIGNAL_CLIENT_STATE: &str = "client_state";
pub const SIGNAL_SIGN_OUT_TEXT: &str = "sign_out_text";

const DEFAULT_LOGIN_PATTERNS: &[&str] = &[
    r"(?i)/(login|signin|sign-in|auth)(\b|/|\?|$)",
    r"(?i)^https?://(accounts|login|auth)\.",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginState {
    Authenticated,
    Unauthenticated,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignalVote {
    pub signal: String,
    pub positive: bool,
}

impl SignalVote {
    pub fn new(signal: &str, positive: bool) -> Self {
        Self {
            signal: signal.to_string(),
            positive,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginVerdict {
    pub confident: bool,
    pub state: LoginState,
    pub votes: Vec<SignalVote>,
    pub decided_at: DateTime<Utc>,
}

impl LoginVerdict {
    /// Combines signal votes into a verdict.
    ///
    /// The location vote is positive when the page does not look like an
    /// authentication surface. Confidence needs that and at least one
    /// structural signal. `Unauthenticated` is reserved for a login page with
    /// no structural signal and no target cookie in the jar; every other
    /// non-confident combination is `Unknown`.
    pub fn decide(votes: Vec<SignalVote>, on_login_page: bool, holds_target_cookie: bool) -> Self {
        let location_clear = votes
            .iter()
            .find(|vote| vote.signal == SIGNAL_LOCATION)
            .map(|vote| vote.positive)
            .unwrap_or(false);
        let structural = votes
            .iter()
            .filter(|vote| vote.signal != SIGNAL_LOCATION)
            .any(|vote| vote.positive);
        let state = if location_clear && structural {
            LoginState::Authenticated
        } else if on_login_page && !structural && !holds_target_cookie {
            LoginState::Unauthenticated
        } else {
            LoginState::Unknown
        };
        Self {
            confident: state == LoginState::Authenticated,
            state,
            votes,
            decided_at: Utc::now(),
        }
    }

    /// Verdict for when no signal could be gathered.
    pub fn undecided() -> Self {
        Self {
            confident: false,
            state: LoginState::Unknown,
            votes: Vec::new(),
            decided_at: Utc::now(),
        }
    }

    pub fn positive_signals(&self) -> impl Iterator<Item = &str> {
        self.votes
            .iter()
            .filter(|vote| vote.positive)
            .map(|vote| vote.signal.as_str())
    }
}

pub struct LoginStateOracle {
    home_url: String,
    oracle: OracleSection,
    scope: DomainScope,
    login_patterns: Vec<Regex>,
    guard: AlertGuard,
}

impl LoginStateOracle {
    pub fn new(
        home_url: impl Into<String>,
        oracle: OracleSection,
        scope: DomainScope,
        login_patterns: &[String],
        guard: AlertGuard,
    ) -> Self {
        let login_patterns = if login_patterns.is_empty() {
            DEFAULT_LOGIN_PATTERNS
                .iter()
                .filter_map(|pattern| Regex::new(pattern).ok())
                .collect()
        } else {
            login_patterns
                .iter()
                .filter_map(|pattern| {
                    Regex::new(pattern)
                        .or_else(|_| Regex::new(&regex::escape(pattern)))
                        .ok()
                })
                .collect()
        };
        Self {
            home_url: home_url.into(),
            oracle,
            scope,
            login_patterns,
            guard,
        }
    }

    pub fn from_config(config: &InkpostConfig, guard: AlertGuard) -> Self {
        Self::new(
            config.target.home_url.clone(),
            config.oracle.clone(),
            DomainScope::from_config(config),
            &config.target.login_url_patterns,
            guard,
        )
    }

    pub fn scope(&self) -> &DomainScope {
        &self.scope
    }

    pub fn looks_like_login(&self, url: &str) -> bool {
        self.login_patterns.iter().any(|pattern| pattern.is_match(url))
    }

    /// Seeds a fresh jar with stored artifacts. Returns whether the replay ran
    /// to completion; a `false` result leaves the session in an unknown state.
    pub async fn replay(
        &self,
        session: &mut dyn BrowserSession,
        artifacts: &[SessionArtifact],
    ) -> bool {
        if artifacts.is_empty() {
            return false;
        }
        if let Err(err) = session.clear_cookies().await {
            warn!(error = %err, "failed to clear cookies before replay");
        }
        if !self.navigate(session, &self.home_url).await {
            return false;
        }

        let mut applied = 0usize;
        let mut foreign = 0usize;
        let mut storage = Vec::new();
        for artifact in artifacts {
            if !self.scope.matches(&artifact.domain) {
                foreign += 1;
                continue;
            }
            match artifact.origin {
                OriginKind::Storage => storage.push((artifact.name.clone(), artifact.value.clone())),
                OriginKind::Cookie => {
                    if self.apply_cookie(session, artifact).await {
                        applied += 1;
                    }
                }
            }
        }

        let restored = match restore_storage(session, &storage).await {
            Ok(count) => count,
            Err(err) => {
                warn!(error = %err, "failed to restore local storage entries");
                0
            }
        };

        let refreshed = match session.reload().await {
            Ok(()) => true,
            Err(err) => {
                debug!(error = %err, "reload after replay failed; navigating home instead");
                self.navigate(session, &self.home_url).await
            }
        };
        if !refreshed {
            return false;
        }
        info!(applied, foreign, restored, "replayed stored session");
        tokio::time::sleep(Duration::from_millis(self.oracle.settle_ms)).await;
        true
    }

    async fn apply_cookie(&self, session: &mut dyn BrowserSession, artifact: &SessionArtifact) -> bool {
        match session.set_cookie(&artifact.to_cookie()).await {
            Ok(()) => true,
            Err(err) => {
                debug!(name = %artifact.name, error = %err, "full cookie rejected; retrying reduced form");
                match session
                    .set_cookie(&artifact.reduced_cookie(self.scope.canonical()))
                    .await
                {
                    Ok(()) => true,
                    Err(err) => {
                        warn!(name = %artifact.name, error = %err, "cookie rejected in reduced form");
                        false
                    }
                }
            }
        }
    }

    /// Navigates once, retrying a single time on a transient failure after
    /// clearing any dialog the page raised.
    pub async fn navigate(&self, session: &mut dyn BrowserSession, url: &str) -> bool {
        for attempt in 1..=2 {
            match session.goto(url).await {
                Ok(()) => return true,
                Err(err) if err.is_transient() => {
                    warn!(url, attempt, error = %err, "navigation failed");
                    // A modal opened during load keeps the next navigation from committing.
                    self.guard.drain_default(session).await;
                }
                Err(err) => {
                    warn!(url, error = %err, "navigation failed; not retrying");
                    return false;
                }
            }
        }
        false
    }

    /// Gathers the independent login signals from the current page.
    pub async fn evaluate(&self, session: &mut dyn BrowserSession) -> LoginVerdict {
        self.guard.drain_default(session).await;

        let url = match session.current_url().await {
            Ok(url) => url,
            Err(err) => {
                warn!(error = %err, "cannot read current location; verdict unknown");
                return LoginVerdict::undecided();
            }
        };
        let on_login_page = self.looks_like_login(&url);
        let location_clear = !on_login_page && self.scope.matches_url(&url);

        let mut votes = vec![SignalVote::new(SIGNAL_LOCATION, location_clear)];
        votes.push(SignalVote::new(
            SIGNAL_DOM_MARKERS,
            self.any_marker_visible(session).await,
        ));
        votes.push(SignalVote::new(
            SIGNAL_CLIENT_STATE,
            self.client_state_positive(session).await,
        ));
        let sign_out = match find_text(session, &self.oracle.sign_out_texts).await {
            Ok(hit) => hit.is_some(),
            Err(err) => {
                debug!(error = %err, "sign-out text probe failed");
                false
            }
        };
        votes.push(SignalVote::new(SIGNAL_SIGN_OUT_TEXT, sign_out));

        let holds_target_cookie = match session.cookies().await {
            Ok(cookies) => cookies.iter().any(|cookie| {
                cookie
                    .domain
                    .as_deref()
                    .is_some_and(|domain| self.scope.matches(domain))
            }),
            Err(_) => true,
        };

        let verdict = LoginVerdict::decide(votes, on_login_page, holds_target_cookie);
        info!(
            url = %url,
            state = ?verdict.state,
            signals = ?verdict.positive_signals().collect::<Vec<_>>(),
            "login state evaluated"
        );
        verdict
    }

    async fn any_marker_visible(&self, session: &mut dyn BrowserSession) -> bool {
        for selector in &self.oracle.marker_selectors {
            match probe_element(session, selector).await {
                Ok(probe) if probe.visible => return true,
                Ok(_) => {}
                Err(err) => debug!(selector = %selector, error = %err, "marker probe failed"),
            }
        }
        false
    }

    async fn client_state_positive(&self, session: &mut dyn BrowserSession) -> bool {
        for expression in &self.oracle.client_state_expressions {
            match session.evaluate_expression(expression).await {
                Ok(value) if is_truthy(&value) => return true,
                Ok(_) => {}
                Err(err) => debug!(expression = %expression, error = %err, "client state probe failed"),
            }
        }
        false
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn votes(location: bool, markers: bool, client: bool, text: bool) -> Vec<SignalVote> {
        vec![
            SignalVote::new(SIGNAL_LOCATION, location),
            SignalVote::new(SIGNAL_DOM_MARKERS, markers),
            SignalVote::new(SIGNAL_CLIENT_STATE, client),
            SignalVote::new(SIGNAL_SIGN_OUT_TEXT, text),
        ]
    }

    #[test]
    fn location_alone_is_not_confident() {
        let verdict = LoginVerdict::decide(votes(true, false, false, false), false, true);
        assert!(!verdict.confident);
        assert_eq!(verdict.state, LoginState::Unknown);
    }

    #[test]
    fn structural_signal_with_clear_location_is_confident() {
        for (markers, client, text) in [(true, false, false), (false, true, false), (false, false, true)] {
            let verdict = LoginVerdict::decide(votes(true, markers, client, text), false, true);
            assert!(verdict.confident);
            assert_eq!(verdict.state, LoginState::Authenticated);
        }
    }

    #[test]
    fn negative_location_is_never_confident() {
        let verdict = LoginVerdict::decide(votes(false, true, true, true), true, true);
        assert!(!verdict.confident);
        assert_eq!(verdict.state, LoginState::Unknown);
    }

    #[test]
    fn login_page_without_any_cookie_is_unauthenticated() {
        let verdict = LoginVerdict::decide(votes(false, false, false, false), true, false);
        assert_eq!(verdict.state, LoginState::Unauthenticated);
        let expired = LoginVerdict::decide(votes(false, false, false, false), true, true);
        assert_eq!(expired.state, LoginState::Unknown);
    }

    #[test]
    fn votes_keep_their_order() {
        let verdict = LoginVerdict::decide(votes(true, true, false, false), false, true);
        let names: Vec<_> = verdict.votes.iter().map(|vote| vote.signal.as_str()).collect();
        assert_eq!(
            names,
            vec![SIGNAL_LOCATION, SIGNAL_DOM_MARKERS, SIGNAL_CLIENT_STATE, SIGNAL_SIGN_OUT_TEXT]
        );
    }

    #[test]
    fn truthiness_follows_javascript() {
        assert!(!is_truthy(&Value::Null));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(is_truthy(&json!("user-1")));
        assert!(is_truthy(&json!({ "id": 1 })));
        assert!(is_truthy(&json!(true)));
    }
}
