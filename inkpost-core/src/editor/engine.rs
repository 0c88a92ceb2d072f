use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::alerts::AlertGuard;
use crate::browser::{BrowserResult, BrowserSession};
use crate::config::{InjectionSection, InkpostConfig, LocatorSpec, SurfacePlan};

use super::mode::{EditorMode, ModeDetector};
use super::strategy::{KeystrokeSettings, StrategyError, StrategyKind};
use super::target::{locate, InjectionTarget};
use super::verify::{payload_length, probe_snippet, InjectionVerifier, SurfaceReading};

const MODE_POLL: Duration = Duration::from_millis(200);
pub const EXISTING_CONTENT: &str = "existing_content";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PostField {
    Title,
    Body,
    Tags,
}

impl fmt::Display for PostField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PostField::Title => "title",
            PostField::Body => "body",
            PostField::Tags => "tags",
        })
    }
}

#[derive(Debug, Error)]
pub enum InjectionError {
    #[error("{0} payload is empty")]
    EmptyPayload(PostField),
    #[error("editor did not reach {desired} mode (observed {observed}): {reason}")]
    ModeSwitch {
        desired: EditorMode,
        observed: EditorMode,
        reason: String,
    },
}

pub type InjectionResult<T> = std::result::Result<T, InjectionError>;

#[derive(Debug, Clone)]
pub struct InjectionRequest {
    pub field: PostField,
    pub content: String,
    /// Body only; defaults to the configured body mode.
    pub mode: Option<EditorMode>,
}

impl InjectionRequest {
    pub fn new(field: PostField, content: impl Into<String>) -> Self {
        Self {
            field,
            content: content.into(),
            mode: None,
        }
    }

    pub fn in_mode(mut self, mode: EditorMode) -> Self {
        self.mode = Some(mode);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InjectionAttemptResult {
    pub strategy_id: String,
    pub succeeded: bool,
    pub observed_length: usize,
    pub evidence: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectionOutcome {
    Success,
    Exhausted,
}

#[derive(Debug, Clone, Serialize)]
pub struct InjectionReport {
    pub field: PostField,
    pub mode: Option<EditorMode>,
    pub outcome: InjectionOutcome,
    pub threshold: usize,
    pub attempts: Vec<InjectionAttemptResult>,
}

impl InjectionReport {
    pub fn succeeded(&self) -> bool {
        self.outcome == InjectionOutcome::Success
    }

    pub fn last_attempt(&self) -> Option<&InjectionAttemptResult> {
        self.attempts.last()
    }
}

/// Places a payload into whichever editing surface the page currently
/// offers, verifying each strategy before giving up on it.
pub struct ContentInjectionEngine {
    plans: InjectionSection,
    detector: ModeDetector,
    verifier: InjectionVerifier,
    guard: AlertGuard,
    keystrokes: KeystrokeSettings,
    retry_settle: Duration,
}

impl ContentInjectionEngine {
    pub fn new(plans: InjectionSection, detector: ModeDetector, guard: AlertGuard) -> Self {
        let verifier = InjectionVerifier::new(plans.verify_ratio);
        let keystrokes = KeystrokeSettings {
            chunk_size: plans.chunk_size,
            pause: Duration::from_millis(plans.chunk_pause_ms),
        };
        let retry_settle = Duration::from_millis(plans.retry_settle_ms);
        Self {
            plans,
            detector,
            verifier,
            guard,
            keystrokes,
            retry_settle,
        }
    }

    pub fn from_config(config: &InkpostConfig, guard: AlertGuard) -> Self {
        Self::new(
            config.injection.clone(),
            ModeDetector::new(config.mode.clone()),
            guard,
        )
    }

    pub fn detector(&self) -> &ModeDetector {
        &self.detector
    }

    pub fn verifier(&self) -> &InjectionVerifier {
        &self.verifier
    }

    pub async fn inject(
        &self,
        session: &mut dyn BrowserSession,
        request: &InjectionRequest,
    ) -> InjectionResult<InjectionReport> {
        let content = request.content.as_str();
        if content.trim().is_empty() {
            return Err(InjectionError::EmptyPayload(request.field));
        }
        let (plan, mode) = match request.field {
            PostField::Title => (&self.plans.title, None),
            PostField::Tags => (&self.plans.tags, None),
            PostField::Body => {
                let desired = request.mode.unwrap_or(self.plans.body_mode);
                let mode = self.select_mode(session, desired).await?;
                (self.plans.body.for_mode(mode), Some(mode))
            }
        };

        let payload_len = payload_length(content);
        let probe = probe_snippet(content);
        let mut report = InjectionReport {
            field: request.field,
            mode,
            outcome: InjectionOutcome::Exhausted,
            threshold: self.verifier.threshold(payload_len),
            attempts: Vec::new(),
        };

        if let Some(existing) = self.existing_content(session, plan, payload_len, &probe).await {
            info!(field = %request.field, observed = existing.observed_length, "content already present; skipping write");
            report.attempts.push(existing);
            report.outcome = InjectionOutcome::Success;
            return Ok(report);
        }

        for kind in &plan.strategies {
            let entry = self
                .run_strategy(session, *kind, &plan.locators, content, payload_len, &probe)
                .await;
            let succeeded = entry.succeeded;
            debug!(field = %request.field, strategy = %kind, succeeded, evidence = %entry.evidence, "strategy attempted");
            report.attempts.push(entry);
            if succeeded {
                info!(field = %request.field, strategy = %kind, "injection verified");
                report.outcome = InjectionOutcome::Success;
                return Ok(report);
            }
        }

        warn!(
            field = %request.field,
            attempts = report.attempts.len(),
            "all injection strategies exhausted"
        );
        Ok(report)
    }

    async fn existing_content(
        &self,
        session: &mut dyn BrowserSession,
        plan: &SurfacePlan,
        payload_len: usize,
        probe: &str,
    ) -> Option<InjectionAttemptResult> {
        let target = locate(session, &plan.locators).await?;
        let reading = self.read_target(session, &target, probe).await.ok()?;
        if !self.verifier.already_present(&reading, payload_len, probe) {
            return None;
        }
        Some(InjectionAttemptResult {
            strategy_id: EXISTING_CONTENT.to_string(),
            succeeded: true,
            observed_length: reading.length,
            evidence: format!("matching content already in {}", target.selector),
        })
    }

    /// One strategy, retried once when verification comes up short. Produces
    /// exactly one audit entry.
    async fn run_strategy(
        &self,
        session: &mut dyn BrowserSession,
        kind: StrategyKind,
        locators: &[LocatorSpec],
        content: &str,
        payload_len: usize,
        probe: &str,
    ) -> InjectionAttemptResult {
        let threshold = self.verifier.threshold(payload_len);
        let mut observed = 0;
        let mut notes = Vec::new();

        for attempt in 1..=2 {
            let Some(target) = locate(session, locators).await else {
                notes.push("no editing surface resolved".to_string());
                break;
            };
            let evidence = match self.apply_in_context(session, kind, &target, content).await {
                Ok(evidence) => evidence,
                Err(StrategyError::Unavailable(reason)) => {
                    notes.push(format!("unavailable: {reason}"));
                    break;
                }
                Err(StrategyError::Browser(err)) => {
                    notes.push(format!("browser error: {err}"));
                    break;
                }
            };
            match self.read_target(session, &target, probe).await {
                Ok(reading) => {
                    observed = reading.length;
                    if self.verifier.sufficient(&reading, payload_len) {
                        return InjectionAttemptResult {
                            strategy_id: kind.id().to_string(),
                            succeeded: true,
                            observed_length: reading.length,
                            evidence: format!(
                                "{evidence}; observed {}/{threshold} in {}",
                                reading.length, target.context
                            ),
                        };
                    }
                    notes.push(format!(
                        "{evidence}; short read {}/{threshold} on try {attempt}",
                        reading.length
                    ));
                }
                Err(err) => notes.push(format!("{evidence}; verification read failed: {err}")),
            }
            if attempt == 1 {
                sleep(self.retry_settle).await;
            }
        }

        InjectionAttemptResult {
            strategy_id: kind.id().to_string(),
            succeeded: false,
            observed_length: observed,
            evidence: notes.join(" | "),
        }
    }

    async fn apply_in_context(
        &self,
        session: &mut dyn BrowserSession,
        kind: StrategyKind,
        target: &InjectionTarget,
        content: &str,
    ) -> Result<String, StrategyError> {
        session.enter_document(&target.context).await?;
        let result = kind.apply(session, target, content, &self.keystrokes).await;
        if let Err(err) = session.exit_document().await {
            warn!(context = %target.context, error = %err, "failed to leave document after apply");
        }
        result
    }

    async fn read_target(
        &self,
        session: &mut dyn BrowserSession,
        target: &InjectionTarget,
        probe: &str,
    ) -> BrowserResult<SurfaceReading> {
        session.enter_document(&target.context).await?;
        let reading = self.verifier.read(session, target, probe).await;
        if let Err(err) = session.exit_document().await {
            warn!(context = %target.context, error = %err, "failed to leave document after read");
        }
        reading
    }

    /// Brings the editor into `desired` mode through its visible toggle.
    pub async fn select_mode(
        &self,
        session: &mut dyn BrowserSession,
        desired: EditorMode,
    ) -> InjectionResult<EditorMode> {
        let observed = self.detector.current(session).await;
        if observed == desired {
            return Ok(desired);
        }
        let section = self.detector.section();
        let toggle = match desired {
            EditorMode::Rendered => section.rendered_toggle.as_deref(),
            EditorMode::RawMarkup => section.raw_markup_toggle.as_deref(),
        };
        let switch_error = |observed, reason: String| InjectionError::ModeSwitch {
            desired,
            observed,
            reason,
        };
        let Some(toggle) = toggle else {
            return Err(switch_error(observed, "no mode toggle configured".into()));
        };
        match session.click(toggle).await {
            Ok(true) => {}
            Ok(false) => return Err(switch_error(observed, format!("toggle {toggle} not found"))),
            Err(err) => return Err(switch_error(observed, err.to_string())),
        }
        let cleared = self.guard.drain_default(session).await;
        debug!(%desired, cleared, "mode toggle clicked");

        let deadline = Instant::now() + Duration::from_millis(section.switch_timeout_ms);
        loop {
            let (mode, evidence) = self.detector.detect(session).await;
            if mode == desired {
                info!(%desired, ?evidence, "editor mode switched");
                return Ok(desired);
            }
            if Instant::now() >= deadline {
                return Err(switch_error(
                    mode,
                    format!("not confirmed within {} ms", section.switch_timeout_ms),
                ));
            }
            sleep(MODE_POLL).await;
        }
    }
}
