use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::auth::AuthOutcome;
use crate::editor::InjectionReport;

use super::error::{ErrorKind, WorkflowError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    Authenticate,
    NavigateComposer,
    DrainAlerts,
    InjectTitle,
    InjectBody,
    InjectTags,
    SaveDraft,
    ConfirmPublish,
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WorkflowStep::Authenticate => "authenticate",
            WorkflowStep::NavigateComposer => "navigate-composer",
            WorkflowStep::DrainAlerts => "drain-alerts",
            WorkflowStep::InjectTitle => "inject-title",
            WorkflowStep::InjectBody => "inject-body",
            WorkflowStep::InjectTags => "inject-tags",
            WorkflowStep::SaveDraft => "save-draft",
            WorkflowStep::ConfirmPublish => "confirm-publish",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub step: WorkflowStep,
    pub status: StepStatus,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishReport {
    pub run_id: Uuid,
    pub target_id: String,
    pub title: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub publish_requested: bool,
    pub auth: Option<AuthOutcome>,
    pub steps: Vec<StepRecord>,
    pub injections: Vec<InjectionReport>,
    pub saved: bool,
    pub published: bool,
}

impl PublishReport {
    pub fn new(target_id: impl Into<String>, title: impl Into<String>, publish_requested: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            target_id: target_id.into(),
            title: title.into(),
            started_at: Utc::now(),
            finished_at: None,
            publish_requested,
            auth: None,
            steps: Vec::new(),
            injections: Vec::new(),
            saved: false,
            published: false,
        }
    }

    pub fn succeeded(&mut self, step: WorkflowStep, detail: impl Into<String>) {
        self.push(step, StepStatus::Succeeded, detail.into(), None);
    }

    pub fn failed(&mut self, step: WorkflowStep, error: &WorkflowError) {
        self.push(step, StepStatus::Failed, error.to_string(), Some(error.kind()));
    }

    pub fn skipped(&mut self, step: WorkflowStep, reason: impl Into<String>) {
        self.push(step, StepStatus::Skipped, reason.into(), None);
    }

    fn push(&mut self, step: WorkflowStep, status: StepStatus, detail: String, error_kind: Option<ErrorKind>) {
        self.steps.push(StepRecord {
            step,
            status,
            detail,
            error_kind,
        });
    }

    pub fn step(&self, step: WorkflowStep) -> Option<&StepRecord> {
        self.steps.iter().rev().find(|record| record.step == step)
    }

    pub fn status_of(&self, step: WorkflowStep) -> Option<StepStatus> {
        self.step(step).map(|record| record.status)
    }

    pub fn first_failure(&self) -> Option<&StepRecord> {
        self.steps
            .iter()
            .find(|record| record.status == StepStatus::Failed)
    }

    /// Saved, and published too when publishing was requested.
    pub fn is_success(&self) -> bool {
        self.saved && (!self.publish_requested || self.published)
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }
}
