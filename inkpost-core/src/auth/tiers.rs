use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use crate::alerts::AlertGuard;
use crate::browser::{fill_field, BrowserSession};
use crate::config::{CredentialsSection, InkpostConfig, OperatorSection};

use super::oracle::{LoginStateOracle, LoginVerdict};
use super::store::SessionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthTier {
    CachedSession,
    Credentials,
    OperatorManual,
}

impl fmt::Display for AuthTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AuthTier::CachedSession => "cached-session",
            AuthTier::Credentials => "credentials",
            AuthTier::OperatorManual => "operator-manual",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TierStatus {
    Confirmed,
    Unconfirmed,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct TierAttempt {
    pub tier: AuthTier,
    pub status: TierStatus,
    pub verdict: Option<LoginVerdict>,
    pub note: Option<String>,
}

impl TierAttempt {
    fn skipped(tier: AuthTier, note: impl Into<String>) -> Self {
        Self {
            tier,
            status: TierStatus::Skipped,
            verdict: None,
            note: Some(note.into()),
        }
    }

    fn evaluated(tier: AuthTier, verdict: LoginVerdict, note: Option<String>) -> Self {
        let status = if verdict.confident {
            TierStatus::Confirmed
        } else {
            TierStatus::Unconfirmed
        };
        Self {
            tier,
            status,
            verdict: Some(verdict),
            note,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthOutcome {
    /// Tier that produced the confident verdict, if any.
    pub tier: Option<AuthTier>,
    pub verdict: LoginVerdict,
    pub attempts: Vec<TierAttempt>,
    pub session_saved: bool,
}

impl AuthOutcome {
    pub fn authenticated(&self) -> bool {
        self.tier.is_some() && self.verdict.confident
    }

    pub fn tiers_tried(&self) -> usize {
        self.attempts
            .iter()
            .filter(|attempt| attempt.status != TierStatus::Skipped)
            .count()
    }
}

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn from_env(section: &CredentialsSection) -> Option<Self> {
        let username = std::env::var(&section.username_env).ok()?;
        let password = std::env::var(&section.password_env).ok()?;
        if username.is_empty() || password.is_empty() {
            return None;
        }
        Some(Self::new(username, password))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Escalates cached session → credential login → operator sign-in until one
/// tier yields a confident verdict.
pub struct Authenticator {
    store: SessionStore,
    oracle: LoginStateOracle,
    guard: AlertGuard,
    home_url: String,
    credential_flow: Option<CredentialsSection>,
    credentials: Option<Credentials>,
    operator: OperatorSection,
}

impl Authenticator {
    pub fn new(
        store: SessionStore,
        oracle: LoginStateOracle,
        guard: AlertGuard,
        home_url: impl Into<String>,
        credential_flow: Option<CredentialsSection>,
        operator: OperatorSection,
    ) -> Self {
        let credentials = credential_flow.as_ref().and_then(Credentials::from_env);
        Self {
            store,
            oracle,
            guard,
            home_url: home_url.into(),
            credential_flow,
            credentials,
            operator,
        }
    }

    pub fn from_config(config: &InkpostConfig) -> Self {
        let guard = AlertGuard::from_config(&config.alerts);
        Self::new(
            SessionStore::from_config(config),
            LoginStateOracle::from_config(config, guard.clone()),
            guard,
            config.target.home_url.clone(),
            config.credentials.clone(),
            config.operator.clone(),
        )
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn oracle(&self) -> &LoginStateOracle {
        &self.oracle
    }

    pub async fn authenticate(&self, session: &mut dyn BrowserSession) -> AuthOutcome {
        let mut attempts = Vec::new();
        let mut last = LoginVerdict::undecided();

        for tier in [
            AuthTier::CachedSession,
            AuthTier::Credentials,
            AuthTier::OperatorManual,
        ] {
            let attempt = match tier {
                AuthTier::CachedSession => self.cached_tier(session).await,
                AuthTier::Credentials => self.credential_tier(session).await,
                AuthTier::OperatorManual => self.operator_tier(session).await,
            };
            if let Some(verdict) = &attempt.verdict {
                last = verdict.clone();
            }
            let confirmed = attempt.status == TierStatus::Confirmed;
            info!(%tier, status = ?attempt.status, note = ?attempt.note, "authentication tier finished");
            attempts.push(attempt);
            if confirmed {
                let session_saved = self.store.save(session).await;
                return AuthOutcome {
                    tier: Some(tier),
                    verdict: last,
                    attempts,
                    session_saved,
                };
            }
        }

        warn!(state = ?last.state, "authentication tiers exhausted");
        AuthOutcome {
            tier: None,
            verdict: last,
            attempts,
            session_saved: false,
        }
    }

    async fn cached_tier(&self, session: &mut dyn BrowserSession) -> TierAttempt {
        let artifacts = self.store.load();
        if artifacts.is_empty() {
            return TierAttempt::skipped(AuthTier::CachedSession, "no stored session");
        }
        let note = if self.oracle.replay(session, &artifacts).await {
            format!("replayed {} artifact(s)", artifacts.len())
        } else {
            "replay did not complete".to_string()
        };
        let verdict = self.oracle.evaluate(session).await;
        TierAttempt::evaluated(AuthTier::CachedSession, verdict, Some(note))
    }

    async fn credential_tier(&self, session: &mut dyn BrowserSession) -> TierAttempt {
        let Some(flow) = self.credential_flow.as_ref() else {
            return TierAttempt::skipped(AuthTier::Credentials, "credential login not configured");
        };
        let Some(credentials) = self.credentials.as_ref() else {
            return TierAttempt::skipped(
                AuthTier::Credentials,
                format!("{} / {} not set", flow.username_env, flow.password_env),
            );
        };

        if !self.oracle.navigate(session, &flow.login_url).await {
            return TierAttempt::evaluated(
                AuthTier::Credentials,
                LoginVerdict::undecided(),
                Some("login page unreachable".into()),
            );
        }
        self.guard.drain_default(session).await;

        for (selector, value) in [
            (&flow.username_selector, credentials.username.as_str()),
            (&flow.password_selector, credentials.password.as_str()),
        ] {
            match fill_field(session, selector, value).await {
                Ok(true) => {}
                Ok(false) => {
                    let verdict = self.oracle.evaluate(session).await;
                    return TierAttempt::evaluated(
                        AuthTier::Credentials,
                        verdict,
                        Some(format!("login field {selector} not found")),
                    );
                }
                Err(err) => {
                    let verdict = self.oracle.evaluate(session).await;
                    return TierAttempt::evaluated(
                        AuthTier::Credentials,
                        verdict,
                        Some(format!("login field {selector}: {err}")),
                    );
                }
            }
        }
        match session.click(&flow.submit_selector).await {
            Ok(true) => {}
            Ok(false) => warn!(selector = %flow.submit_selector, "login submit control not found"),
            Err(err) => warn!(error = %err, "login submit failed"),
        }
        self.guard.drain_default(session).await;

        let verdict = self
            .poll_verdict(
                session,
                Duration::from_secs(flow.two_factor_budget_seconds),
                Duration::from_secs(flow.poll_interval_seconds),
            )
            .await;
        TierAttempt::evaluated(
            AuthTier::Credentials,
            verdict,
            Some(format!("submitted credentials for {}", credentials.username)),
        )
    }

    async fn operator_tier(&self, session: &mut dyn BrowserSession) -> TierAttempt {
        if !self.operator.enabled {
            return TierAttempt::skipped(AuthTier::OperatorManual, "operator sign-in disabled");
        }
        let entry = self
            .credential_flow
            .as_ref()
            .map(|flow| flow.login_url.as_str())
            .unwrap_or(self.home_url.as_str());
        let on_target = session
            .current_url()
            .await
            .map(|url| self.oracle.scope().matches_url(&url) || self.oracle.looks_like_login(&url))
            .unwrap_or(false);
        if !on_target {
            self.oracle.navigate(session, entry).await;
        }
        warn!(
            budget_seconds = self.operator.manual_login_budget_seconds,
            url = %entry,
            "operator action required: sign in from the browser window"
        );
        let verdict = self
            .poll_verdict(
                session,
                Duration::from_secs(self.operator.manual_login_budget_seconds),
                Duration::from_secs(self.operator.poll_interval_seconds),
            )
            .await;
        TierAttempt::evaluated(AuthTier::OperatorManual, verdict, None)
    }

    /// Evaluates until confident or until `budget` elapses. Always evaluates
    /// at least once.
    async fn poll_verdict(
        &self,
        session: &mut dyn BrowserSession,
        budget: Duration,
        interval: Duration,
    ) -> LoginVerdict {
        let deadline = Instant::now() + budget;
        loop {
            let verdict = self.oracle.evaluate(session).await;
            if verdict.confident || Instant::now() >= deadline {
                return verdict;
            }
            sleep(interval.max(Duration::from_millis(50))).await;
        }
    }
}
