use std::time::Duration;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::browser::BrowserSession;
use crate::config::{AlertRule, AlertSection, Disposition};

/// Maps dialog text to a disposition. First matching rule wins.
#[derive(Debug, Clone)]
pub struct DialogPolicy {
    rules: Vec<(Regex, Disposition)>,
}

impl DialogPolicy {
    pub fn from_rules(rules: &[AlertRule]) -> Self {
        let rules = rules
            .iter()
            .filter_map(|rule| match Regex::new(&rule.pattern) {
                Ok(regex) => Some((regex, rule.disposition)),
                Err(err) => {
                    warn!(pattern = %rule.pattern, error = %err, "skipping invalid alert rule");
                    None
                }
            })
            .collect();
        Self { rules }
    }

    /// Rules used when the configuration names none: decline stale-draft
    /// restoration, accept navigation confirmations.
    pub fn standard() -> Self {
        let table = [
            (
                r"(?i)(resume|continue|restore|recover).{0,40}(draft|writing|post)",
                Disposition::Dismiss,
            ),
            (r"이어서 작성|저장된 글|임시저장된", Disposition::Dismiss),
            (r"(?i)(leave|reload) (this )?(site|page)", Disposition::Accept),
        ];
        let rules = table
            .iter()
            .filter_map(|(pattern, disposition)| {
                Regex::new(pattern).ok().map(|regex| (regex, *disposition))
            })
            .collect();
        Self { rules }
    }

    pub fn classify(&self, text: &str, default: Disposition) -> Disposition {
        self.rules
            .iter()
            .find(|(regex, _)| regex.is_match(text))
            .map(|(_, disposition)| *disposition)
            .unwrap_or(default)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct AlertGuard {
    policy: DialogPolicy,
    max_attempts: usize,
    detect_timeout: Duration,
    settle: Duration,
    default_disposition: Disposition,
}

impl AlertGuard {
    pub fn new(policy: DialogPolicy, section: &AlertSection) -> Self {
        Self {
            policy,
            max_attempts: section.max_attempts,
            detect_timeout: Duration::from_millis(section.detect_timeout_ms),
            settle: Duration::from_millis(section.settle_ms),
            default_disposition: section.default_disposition,
        }
    }

    pub fn from_config(section: &AlertSection) -> Self {
        let policy = if section.rules.is_empty() {
            DialogPolicy::standard()
        } else {
            DialogPolicy::from_rules(&section.rules)
        };
        Self::new(policy, section)
    }

    pub fn policy(&self) -> &DialogPolicy {
        &self.policy
    }

    pub async fn drain_default(&self, session: &mut dyn BrowserSession) -> usize {
        self.drain(session, self.max_attempts, self.default_disposition)
            .await
    }

    /// Resolves queued dialogs until none appears within the detection
    /// window or `max_attempts` polls have run. Returns how many were
    /// resolved. Never fails.
    pub async fn drain(
        &self,
        session: &mut dyn BrowserSession,
        max_attempts: usize,
        default: Disposition,
    ) -> usize {
        let mut cleared = 0;
        for _ in 0..max_attempts {
            let message = match session.pending_dialog(self.detect_timeout).await {
                Ok(Some(message)) => message,
                Ok(None) => break,
                Err(err) => {
                    debug!(error = %err, "dialog detection failed");
                    break;
                }
            };
            let disposition = self.policy.classify(&message, default);
            let accept = disposition == Disposition::Accept;
            match session.resolve_dialog(accept).await {
                Ok(()) => {
                    cleared += 1;
                    info!(message = %message, ?disposition, "resolved dialog");
                }
                Err(err) => {
                    // The dialog may have closed on its own between poll and resolve.
                    debug!(message = %message, error = %err, "dialog resolution failed");
                }
            }
            tokio::time::sleep(self.settle).await;
        }
        cleared
    }
}
