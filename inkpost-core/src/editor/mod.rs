mod engine;
mod mode;
mod strategy;
mod target;
mod verify;

pub use engine::{
    ContentInjectionEngine, InjectionAttemptResult, InjectionError, InjectionOutcome,
    InjectionReport, InjectionRequest, InjectionResult, PostField, EXISTING_CONTENT,
};
pub use mode::{toolbar_implies_raw, EditorMode, ModeDetector, ModeEvidence};
pub use strategy::{chunk_text, KeystrokeSettings, StrategyError, StrategyKind};
pub use target::{locate, InjectionTarget, SurfaceKind};
pub use verify::{payload_length, probe_snippet, InjectionVerifier, SurfaceReading};
