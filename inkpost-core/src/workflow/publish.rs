use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use crate::alerts::AlertGuard;
use crate::audit::AuditLog;
use crate::auth::Authenticator;
use crate::browser::{probe_element, wait_for_any, BrowserError, BrowserSession};
use crate::config::{InkpostConfig, TargetSection, WorkflowSection};
use crate::content::PostDraft;
use crate::editor::{ContentInjectionEngine, InjectionRequest, PostField};

use super::error::{WorkflowError, WorkflowResult};
use super::report::{PublishReport, WorkflowStep};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishOptions {
    pub save: bool,
    pub publish: bool,
}

impl PublishOptions {
    pub fn draft_only() -> Self {
        Self {
            save: true,
            publish: false,
        }
    }

    pub fn publish() -> Self {
        Self {
            save: true,
            publish: true,
        }
    }

    /// Fill the composer without saving.
    pub fn inject_only() -> Self {
        Self {
            save: false,
            publish: false,
        }
    }
}

pub struct PublishWorkflow {
    target: TargetSection,
    steps: WorkflowSection,
    published_url: Option<Regex>,
    tag_separator: String,
    authenticator: Authenticator,
    engine: ContentInjectionEngine,
    guard: AlertGuard,
    audit: Option<Arc<AuditLog>>,
}

impl PublishWorkflow {
    pub fn new(
        target: TargetSection,
        steps: WorkflowSection,
        tag_separator: impl Into<String>,
        authenticator: Authenticator,
        engine: ContentInjectionEngine,
        guard: AlertGuard,
    ) -> Self {
        let published_url = steps.published_url_pattern.as_deref().and_then(|pattern| {
            Regex::new(pattern)
                .map_err(|err| warn!(pattern, error = %err, "ignoring invalid published_url_pattern"))
                .ok()
        });
        Self {
            target,
            steps,
            published_url,
            tag_separator: tag_separator.into(),
            authenticator,
            engine,
            guard,
            audit: None,
        }
    }

    pub fn from_config(config: &InkpostConfig) -> Self {
        let guard = AlertGuard::from_config(&config.alerts);
        Self::new(
            config.target.clone(),
            config.workflow.clone(),
            config.injection.tag_separator.clone(),
            Authenticator::from_config(config),
            ContentInjectionEngine::from_config(config, guard.clone()),
            guard,
        )
    }

    pub fn with_audit(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    pub fn engine(&self) -> &ContentInjectionEngine {
        &self.engine
    }

    /// Runs every step it can and records each outcome. The report is also
    /// written to the audit log when one is attached.
    pub async fn run(
        &self,
        session: &mut dyn BrowserSession,
        draft: &PostDraft,
        options: PublishOptions,
    ) -> PublishReport {
        let mut report = PublishReport::new(&self.target.id, &draft.title, options.publish);
        info!(run_id = %report.run_id, target_id = %self.target.id, publish = options.publish, "publish run started");
        self.execute(session, draft, options, &mut report).await;
        report.finish();
        if let Some(audit) = &self.audit {
            if let Err(err) = audit.record_run(&report) {
                warn!(run_id = %report.run_id, error = %err, "failed to record publish run");
            }
        }
        info!(
            run_id = %report.run_id,
            saved = report.saved,
            published = report.published,
            "publish run finished"
        );
        report
    }

    async fn execute(
        &self,
        session: &mut dyn BrowserSession,
        draft: &PostDraft,
        options: PublishOptions,
        report: &mut PublishReport,
    ) {
        let auth = self.authenticator.authenticate(session).await;
        let authenticated = auth.authenticated();
        match auth.tier {
            Some(tier) if authenticated => {
                report.succeeded(WorkflowStep::Authenticate, format!("confirmed via {tier}"))
            }
            _ => {
                let err = WorkflowError::AuthenticationUnknown {
                    tiers: auth.tiers_tried(),
                    verdict: Box::new(auth.verdict.clone()),
                };
                report.failed(WorkflowStep::Authenticate, &err);
            }
        }
        report.auth = Some(auth);
        if !authenticated {
            report.skipped(WorkflowStep::NavigateComposer, "not authenticated");
            return;
        }

        if let Err(err) = self.open_composer(session).await {
            report.failed(WorkflowStep::NavigateComposer, &err);
            return;
        }
        report.succeeded(WorkflowStep::NavigateComposer, self.target.composer_url.clone());

        let cleared = self.guard.drain_default(session).await;
        report.succeeded(
            WorkflowStep::DrainAlerts,
            format!("{cleared} dialog(s) resolved"),
        );

        let title_ok = self
            .inject_step(session, report, WorkflowStep::InjectTitle, PostField::Title, &draft.title)
            .await;
        let body_ok = self
            .inject_step(session, report, WorkflowStep::InjectBody, PostField::Body, &draft.body)
            .await;
        let tags = draft.tags_joined(&self.tag_separator);
        if tags.is_empty() {
            report.skipped(WorkflowStep::InjectTags, "no tags");
        } else {
            self.inject_step(session, report, WorkflowStep::InjectTags, PostField::Tags, &tags)
                .await;
        }

        if !options.save {
            report.skipped(WorkflowStep::SaveDraft, "save not requested");
            report.skipped(WorkflowStep::ConfirmPublish, "save not requested");
            return;
        }
        if !(title_ok && body_ok) {
            report.skipped(WorkflowStep::SaveDraft, "title or body not injected");
            report.skipped(WorkflowStep::ConfirmPublish, "draft not saved");
            return;
        }
        match self.save_draft(session).await {
            Ok(detail) => {
                report.saved = true;
                report.succeeded(WorkflowStep::SaveDraft, detail);
            }
            Err(err) => {
                report.failed(WorkflowStep::SaveDraft, &err);
                report.skipped(WorkflowStep::ConfirmPublish, "draft not saved");
                return;
            }
        }

        if !options.publish {
            report.skipped(WorkflowStep::ConfirmPublish, "publish not requested");
            return;
        }
        match self.confirm_publish(session).await {
            Ok(detail) => {
                report.published = true;
                report.succeeded(WorkflowStep::ConfirmPublish, detail);
            }
            Err(err) => report.failed(WorkflowStep::ConfirmPublish, &err),
        }
    }

    async fn inject_step(
        &self,
        session: &mut dyn BrowserSession,
        report: &mut PublishReport,
        step: WorkflowStep,
        field: PostField,
        content: &str,
    ) -> bool {
        match self
            .engine
            .inject(session, &InjectionRequest::new(field, content))
            .await
        {
            Ok(injection) => {
                let ok = injection.succeeded();
                if ok {
                    let via = injection
                        .last_attempt()
                        .map(|attempt| attempt.strategy_id.clone())
                        .unwrap_or_default();
                    report.succeeded(step, format!("verified via {via}"));
                } else {
                    let err = WorkflowError::StrategyExhausted {
                        field,
                        last_attempt: injection.last_attempt().cloned(),
                    };
                    report.failed(step, &err);
                }
                report.injections.push(injection);
                ok
            }
            Err(err) => {
                report.failed(step, &WorkflowError::from(err));
                false
            }
        }
    }

    pub async fn open_composer(&self, session: &mut dyn BrowserSession) -> WorkflowResult<()> {
        let url = &self.target.composer_url;
        if self.authenticator.oracle().navigate(session, url).await {
            Ok(())
        } else {
            Err(BrowserError::Navigation(url.clone()).into())
        }
    }

    pub async fn save_draft(&self, session: &mut dyn BrowserSession) -> WorkflowResult<String> {
        self.click_control(session, WorkflowStep::SaveDraft, &self.steps.save_selector)
            .await?;
        self.guard.drain_default(session).await;
        if self.steps.saved_marker_selectors.is_empty() {
            return Ok("save triggered; no confirmation marker configured".into());
        }
        match wait_for_any(
            session,
            &self.steps.saved_marker_selectors,
            self.step_timeout(),
            self.poll_interval(),
        )
        .await
        {
            Some(marker) => Ok(format!("confirmed by {marker}")),
            None => Err(WorkflowError::Unconfirmed {
                step: WorkflowStep::SaveDraft,
                timeout_ms: self.steps.step_timeout_ms,
            }),
        }
    }

    /// Opens the publish layer, confirms there, then waits for a completion
    /// marker or the published URL.
    pub async fn confirm_publish(&self, session: &mut dyn BrowserSession) -> WorkflowResult<String> {
        let step = WorkflowStep::ConfirmPublish;
        self.click_control(session, step, &self.steps.publish_selector)
            .await?;
        let layer = [self.steps.publish_layer_selector.clone()];
        if wait_for_any(session, &layer, self.step_timeout(), self.poll_interval())
            .await
            .is_none()
        {
            return Err(WorkflowError::Unconfirmed {
                step,
                timeout_ms: self.steps.step_timeout_ms,
            });
        }
        self.click_control(session, step, &self.steps.publish_confirm_selector)
            .await?;
        self.guard.drain_default(session).await;

        if self.steps.published_marker_selectors.is_empty() && self.published_url.is_none() {
            return Ok("publish confirmed; no completion marker configured".into());
        }
        let deadline = Instant::now() + self.step_timeout();
        loop {
            if let (Some(pattern), Ok(url)) = (&self.published_url, session.current_url().await) {
                if pattern.is_match(&url) {
                    return Ok(format!("published at {url}"));
                }
            }
            for selector in &self.steps.published_marker_selectors {
                let visible = probe_element(session, selector)
                    .await
                    .map(|probe| probe.visible)
                    .unwrap_or(false);
                if visible {
                    return Ok(format!("confirmed by {selector}"));
                }
            }
            if Instant::now() >= deadline {
                return Err(WorkflowError::Unconfirmed {
                    step,
                    timeout_ms: self.steps.step_timeout_ms,
                });
            }
            sleep(self.poll_interval()).await;
        }
    }

    async fn click_control(
        &self,
        session: &mut dyn BrowserSession,
        step: WorkflowStep,
        selector: &str,
    ) -> WorkflowResult<()> {
        if session.click(selector).await? {
            Ok(())
        } else {
            Err(WorkflowError::ControlMissing {
                step,
                selector: selector.to_string(),
            })
        }
    }

    fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.steps.step_timeout_ms)
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.steps.poll_interval_ms.max(10))
    }
}
