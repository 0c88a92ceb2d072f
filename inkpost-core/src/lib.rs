pub mod alerts;
pub mod audit;
pub mod auth;
pub mod browser;
pub mod config;
pub mod content;
pub mod editor;
pub mod error;
pub mod workflow;

pub use alerts::{AlertGuard, DialogPolicy};
pub use audit::{AuditError, AuditLog, RunSummary};
pub use auth::{
    AuthOutcome, AuthTier, Authenticator, Credentials, DomainScope, LoginState, LoginStateOracle,
    LoginVerdict, OriginKind, SessionArtifact, SessionStore, SignalVote,
};
pub use browser::{
    BrowserAutomation, BrowserCookie, BrowserError, BrowserLauncher, BrowserResult,
    BrowserSession, ChromiumSession, DocumentContext, LaunchOverrides, ProfileManager,
};
pub use config::{load_config, InkpostConfig};
pub use content::{
    generate_with_retry, lookup_image, ContentGenerator, GenerationError, HttpContentGenerator,
    HttpImageSearch, ImageSearch, PostDraft, RetryPolicy,
};
pub use editor::{
    ContentInjectionEngine, EditorMode, InjectionAttemptResult, InjectionError,
    InjectionOutcome, InjectionReport, InjectionRequest, ModeDetector, PostField, StrategyKind,
    SurfaceKind,
};
pub use error::{ConfigError, Result};
pub use workflow::{
    ErrorKind, PublishOptions, PublishReport, PublishWorkflow, StepRecord, StepStatus,
    WorkflowError, WorkflowStep,
};
