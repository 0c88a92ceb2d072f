use std::fmt;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::browser::{scripts, BrowserError, BrowserSession, PageScript};

use super::target::InjectionTarget;

/// One concrete way of placing content into a surface. Ranked lists of these
/// live in configuration per editor mode and plain field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    RichEditorApi,
    NestedDocumentWrite,
    CodeSurfaceApi,
    ValueAssignment,
    ChunkedKeystrokes,
}

impl StrategyKind {
    pub fn id(&self) -> &'static str {
        match self {
            StrategyKind::RichEditorApi => "rich_editor_api",
            StrategyKind::NestedDocumentWrite => "nested_document_write",
            StrategyKind::CodeSurfaceApi => "code_surface_api",
            StrategyKind::ValueAssignment => "value_assignment",
            StrategyKind::ChunkedKeystrokes => "chunked_keystrokes",
        }
    }

    fn script(&self) -> Option<&'static PageScript> {
        match self {
            StrategyKind::RichEditorApi => Some(&scripts::RICH_EDITOR_API),
            StrategyKind::NestedDocumentWrite => Some(&scripts::NESTED_DOCUMENT_WRITE),
            StrategyKind::CodeSurfaceApi => Some(&scripts::CODE_SURFACE_API),
            StrategyKind::ValueAssignment => Some(&scripts::VALUE_ASSIGNMENT),
            StrategyKind::ChunkedKeystrokes => None,
        }
    }

    /// Runs the strategy against `target`. The caller has already entered
    /// the target's document. Returns evidence describing what was done.
    pub async fn apply(
        &self,
        session: &mut dyn BrowserSession,
        target: &InjectionTarget,
        content: &str,
        keystrokes: &KeystrokeSettings,
    ) -> Result<String, StrategyError> {
        match self.script() {
            Some(script) => apply_script(session, script, target, content).await,
            None => type_in_chunks(session, target, content, keystrokes).await,
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("strategy unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Browser(#[from] BrowserError),
}

#[derive(Debug, Clone, Copy)]
pub struct KeystrokeSettings {
    pub chunk_size: usize,
    pub pause: Duration,
}

impl KeystrokeSettings {
    fn jittered_pause(&self) -> Duration {
        let base = self.pause.as_millis() as u64;
        if base == 0 {
            return Duration::ZERO;
        }
        let jitter = rand::thread_rng().gen_range(0..=base / 2);
        Duration::from_millis(base + jitter)
    }
}

async fn apply_script(
    session: &mut dyn BrowserSession,
    script: &PageScript,
    target: &InjectionTarget,
    content: &str,
) -> Result<String, StrategyError> {
    let result = session
        .run_script(
            script,
            json!({ "selector": target.selector, "content": content }),
        )
        .await?;
    let available = result
        .get("available")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if !available {
        return Err(StrategyError::Unavailable(format!(
            "{} found no usable handle for {}",
            script.name, target.selector
        )));
    }
    let api = result.get("api").and_then(Value::as_str);
    Ok(match api {
        Some(api) => format!("{} via {api}", script.name),
        None => format!("{} on {}", script.name, target.selector),
    })
}

async fn type_in_chunks(
    session: &mut dyn BrowserSession,
    target: &InjectionTarget,
    content: &str,
    settings: &KeystrokeSettings,
) -> Result<String, StrategyError> {
    let focus = session
        .run_script(
            &scripts::FOCUS_SURFACE,
            json!({ "selector": target.selector, "clear": true }),
        )
        .await?;
    if !focus.get("focused").and_then(Value::as_bool).unwrap_or(false) {
        return Err(StrategyError::Unavailable(format!(
            "cannot focus {}",
            target.selector
        )));
    }
    let chunks = chunk_text(content, settings.chunk_size);
    for chunk in &chunks {
        session.insert_text(chunk).await?;
        let pause = settings.jittered_pause();
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }
    Ok(format!("typed {} chunk(s) into {}", chunks.len(), target.selector))
}

/// Splits on character boundaries into pieces of at most `size` chars.
pub fn chunk_text(content: &str, size: usize) -> Vec<String> {
    let size = size.max(1);
    let chars: Vec<char> = content.chars().collect();
    chars
        .chunks(size)
        .map(|chunk| chunk.iter().collect())
        .collect()
}
