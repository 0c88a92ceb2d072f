use thiserror::Error;

pub type BrowserResult<T> = Result<T, BrowserError>;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("chromium launch failed: {0}")]
    Launch(String),
    #[error("cdp error: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("timeout waiting for {0}")]
    Timeout(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("profile error: {0}")]
    Profile(String),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("script {name} failed: {reason}")]
    Script { name: String, reason: String },
    #[error("document context unavailable: {0}")]
    ContextUnavailable(String),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl BrowserError {
    pub fn script(name: &str, reason: impl ToString) -> Self {
        BrowserError::Script {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Timing-dependent failures that the owning component may retry.
    pub fn is_transient(&self) -> bool {
        match self {
            BrowserError::Timeout(_)
            | BrowserError::Navigation(_)
            | BrowserError::ContextUnavailable(_) => true,
            BrowserError::Cdp(err) => {
                let text = err.to_string().to_lowercase();
                text.contains("timeout") || text.contains("navigat") || text.contains("detached")
            }
            _ => false,
        }
    }
}

impl From<tokio::task::JoinError> for BrowserError {
    fn from(err: tokio::task::JoinError) -> Self {
        BrowserError::Unexpected(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_timing_failures_are_transient() {
        assert!(BrowserError::Timeout("navigation".into()).is_transient());
        assert!(BrowserError::Navigation("net::ERR_TIMED_OUT".into()).is_transient());
        assert!(BrowserError::ContextUnavailable("frame #editor".into()).is_transient());
        assert!(!BrowserError::Configuration("bad url".into()).is_transient());
        assert!(!BrowserError::script("probe_element", "syntax error").is_transient());
    }
}
