use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;
use tracing::{info, warn};

use inkpost_core::auth::{AuthOutcome, TierStatus};
use inkpost_core::browser::{BrowserAutomation, BrowserLauncher, ChromiumSession, LaunchOverrides};
use inkpost_core::workflow::{PublishOptions, PublishReport, PublishWorkflow, StepStatus, WorkflowStep};
use inkpost_core::{AuditLog, Authenticator, InkpostConfig};

use super::draft::{self, DraftArgs};
use crate::{AppContext, AppError, DisplayFallback, Result};

#[derive(Args, Debug, Clone, Default)]
pub struct AuthArgs {
    /// Show the browser window (needed for operator sign-in)
    #[arg(long)]
    pub headful: bool,
}

#[derive(Args, Debug, Clone)]
pub struct PublishArgs {
    #[command(flatten)]
    pub draft: DraftArgs,
    /// Save the draft but stop before publishing
    #[arg(long)]
    pub draft_only: bool,
    /// Show the browser window
    #[arg(long)]
    pub headful: bool,
}

/// A launched browser with its single page session.
struct BrowserRun {
    browser: BrowserAutomation,
    session: ChromiumSession,
}

impl BrowserRun {
    async fn start(config: &InkpostConfig, headful: bool) -> Result<Self> {
        let launcher = BrowserLauncher::new(config)?;
        let overrides = LaunchOverrides {
            headless: headful.then_some(false),
        };
        let browser = launcher.launch_with_overrides(overrides).await?;
        match browser.new_session().await {
            Ok(session) => Ok(Self { browser, session }),
            Err(err) => {
                if let Err(shutdown) = browser.shutdown().await {
                    warn!(error = %shutdown, "browser shutdown failed");
                }
                Err(err.into())
            }
        }
    }

    async fn finish(self) {
        let Self { browser, session } = self;
        drop(session);
        if let Err(err) = browser.shutdown().await {
            warn!(error = %err, "browser shutdown failed");
        }
    }
}

/// Races `work` against Ctrl-C.
async fn interruptible<T>(work: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::select! {
        result = work => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupt received; shutting the browser down");
            Err(AppError::Interrupted)
        }
    }
}

pub async fn authenticate(context: &AppContext, args: &AuthArgs) -> Result<AuthReport> {
    let config = context.config();
    let authenticator = Authenticator::from_config(config);
    let mut run = BrowserRun::start(config, args.headful).await?;
    let outcome = interruptible(async { Ok(authenticator.authenticate(&mut run.session).await) }).await;
    run.finish().await;
    Ok(AuthReport::from_outcome(&config.target.id, &outcome?))
}

pub async fn inject(context: &AppContext, args: &DraftArgs) -> Result<PublishReport> {
    run_workflow(context, args, PublishOptions::inject_only(), false).await
}

pub async fn publish(context: &AppContext, args: &PublishArgs) -> Result<PublishReport> {
    let options = if args.draft_only {
        PublishOptions::draft_only()
    } else {
        PublishOptions::publish()
    };
    run_workflow(context, &args.draft, options, args.headful).await
}

async fn run_workflow(
    context: &AppContext,
    args: &DraftArgs,
    options: PublishOptions,
    headful: bool,
) -> Result<PublishReport> {
    let config = context.config();
    let post = draft::resolve(context, args).await?;
    let mut workflow = PublishWorkflow::from_config(config);
    match AuditLog::from_config(config) {
        Ok(audit) => workflow = workflow.with_audit(Arc::new(audit)),
        Err(err) => warn!(error = %err, "audit log unavailable; run will not be recorded"),
    }
    info!(title = %post.title, publish = options.publish, "starting browser run");

    let mut run = BrowserRun::start(config, headful).await?;
    let report = interruptible(async { Ok(workflow.run(&mut run.session, &post, options).await) }).await;
    run.finish().await;
    report
}

/// Inject-only runs succeed when every attempted field verified.
pub fn ensure_injected(report: &PublishReport) -> Result<()> {
    match report.first_failure() {
        Some(record) => Err(AppError::RunFailed(format!("{}: {}", record.step, record.detail))),
        None if report.injections.is_empty() => Err(AppError::RunFailed("nothing was injected".into())),
        None => Ok(()),
    }
}

pub fn ensure_success(report: &PublishReport) -> Result<()> {
    if report.is_success() {
        return Ok(());
    }
    let reason = report
        .first_failure()
        .map(|record| format!("{}: {}", record.step, record.detail))
        .unwrap_or_else(|| "draft not saved".to_string());
    Err(AppError::RunFailed(reason))
}

#[derive(Debug, Serialize)]
pub struct AuthReport {
    pub target_id: String,
    pub tier: Option<String>,
    pub state: String,
    pub confident: bool,
    pub signals: Vec<String>,
    pub decided_at: DateTime<Utc>,
    pub session_saved: bool,
    pub attempts: Vec<TierLine>,
}

#[derive(Debug, Serialize)]
pub struct TierLine {
    pub tier: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl AuthReport {
    fn from_outcome(target_id: &str, outcome: &AuthOutcome) -> Self {
        let attempts = outcome
            .attempts
            .iter()
            .map(|attempt| TierLine {
                tier: attempt.tier.to_string(),
                status: match attempt.status {
                    TierStatus::Confirmed => "confirmed",
                    TierStatus::Unconfirmed => "unconfirmed",
                    TierStatus::Skipped => "skipped",
                }
                .to_string(),
                note: attempt.note.clone(),
            })
            .collect();
        Self {
            target_id: target_id.to_string(),
            tier: outcome.tier.map(|tier| tier.to_string()),
            state: format!("{:?}", outcome.verdict.state).to_lowercase(),
            confident: outcome.verdict.confident,
            signals: outcome
                .verdict
                .positive_signals()
                .map(str::to_string)
                .collect(),
            decided_at: outcome.verdict.decided_at,
            session_saved: outcome.session_saved,
            attempts,
        }
    }
}

impl DisplayFallback for AuthReport {
    fn display(&self) -> String {
        let mut lines = vec![format!(
            "{}: {} (confident: {}, via {})",
            self.target_id,
            self.state,
            self.confident,
            self.tier.as_deref().unwrap_or("-")
        )];
        if !self.signals.is_empty() {
            lines.push(format!("Signals: {}", self.signals.join(", ")));
        }
        for attempt in &self.attempts {
            let note = attempt
                .note
                .as_deref()
                .map(|note| format!(" ({note})"))
                .unwrap_or_default();
            lines.push(format!("  - {} {}{}", attempt.tier, attempt.status, note));
        }
        if self.session_saved {
            lines.push("Session saved".to_string());
        }
        lines.join("\n")
    }
}

impl DisplayFallback for PublishReport {
    fn display(&self) -> String {
        let mut lines = vec![format!("Run {} for {}: \"{}\"", self.run_id, self.target_id, self.title)];
        for record in &self.steps {
            let marker = match record.status {
                StepStatus::Succeeded => "OK",
                StepStatus::Failed => "FAIL",
                StepStatus::Skipped => "SKIP",
            };
            lines.push(format!("[{marker}] {} {}", record.step, record.detail));
            let field = match record.step {
                WorkflowStep::InjectTitle => "title",
                WorkflowStep::InjectBody => "body",
                WorkflowStep::InjectTags => "tags",
                _ => continue,
            };
            let injection = self
                .injections
                .iter()
                .find(|injection| injection.field.to_string() == field);
            if let Some(injection) = injection {
                for attempt in &injection.attempts {
                    lines.push(format!(
                        "    {} {} len={} {}",
                        if attempt.succeeded { "+" } else { "-" },
                        attempt.strategy_id,
                        attempt.observed_length,
                        attempt.evidence
                    ));
                }
            }
        }
        lines.push(format!("Saved: {}  Published: {}", self.saved, self.published));
        lines.join("\n")
    }
}
