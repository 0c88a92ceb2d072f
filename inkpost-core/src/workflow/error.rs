use serde::Serialize;
use thiserror::Error;

use crate::auth::LoginVerdict;
use crate::browser::BrowserError;
use crate::editor::{InjectionAttemptResult, InjectionError, PostField};

use super::report::WorkflowStep;

/// How a caller should react to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    TransientRetryable,
    StrategyExhausted,
    AuthenticationUnknown,
    OperatorRequired,
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("login state still unknown after {tiers} tier(s)")]
    AuthenticationUnknown {
        tiers: usize,
        verdict: Box<LoginVerdict>,
    },
    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),
    #[error("every strategy failed for {field}")]
    StrategyExhausted {
        field: PostField,
        last_attempt: Option<InjectionAttemptResult>,
    },
    #[error(transparent)]
    Injection(#[from] InjectionError),
    #[error("{step} not confirmed within {timeout_ms} ms")]
    Unconfirmed { step: WorkflowStep, timeout_ms: u64 },
    #[error("control {selector} not found for {step}")]
    ControlMissing { step: WorkflowStep, selector: String },
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::AuthenticationUnknown { .. } => ErrorKind::AuthenticationUnknown,
            WorkflowError::Browser(_) | WorkflowError::Unconfirmed { .. } => {
                ErrorKind::TransientRetryable
            }
            WorkflowError::StrategyExhausted { .. } => ErrorKind::StrategyExhausted,
            WorkflowError::Injection(_) | WorkflowError::ControlMissing { .. } => {
                ErrorKind::OperatorRequired
            }
        }
    }
}

pub type WorkflowResult<T> = std::result::Result<T, WorkflowError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::EditorMode;

    #[test]
    fn kinds_follow_taxonomy() {
        let auth = WorkflowError::AuthenticationUnknown {
            tiers: 3,
            verdict: Box::new(LoginVerdict::undecided()),
        };
        assert_eq!(auth.kind(), ErrorKind::AuthenticationUnknown);
        let exhausted = WorkflowError::StrategyExhausted {
            field: PostField::Body,
            last_attempt: None,
        };
        assert_eq!(exhausted.kind(), ErrorKind::StrategyExhausted);
        let mode = WorkflowError::from(InjectionError::ModeSwitch {
            desired: EditorMode::RawMarkup,
            observed: EditorMode::Rendered,
            reason: "timed out".into(),
        });
        assert_eq!(mode.kind(), ErrorKind::OperatorRequired);
        let timeout = WorkflowError::from(BrowserError::Timeout("navigation".into()));
        assert_eq!(timeout.kind(), ErrorKind::TransientRetryable);
    }
}
