use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::browser::{probe_element, scripts, BrowserSession};
use crate::config::ModeSection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditorMode {
    Rendered,
    RawMarkup,
}

impl fmt::Display for EditorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EditorMode::Rendered => "rendered",
            EditorMode::RawMarkup => "raw_markup",
        })
    }
}

/// Which layer of [`ModeDetector::detect`] produced the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeEvidence {
    Toggle,
    RawSurface,
    Toolbar,
    Default,
}

pub struct ModeDetector {
    section: ModeSection,
}

impl ModeDetector {
    pub fn new(section: ModeSection) -> Self {
        Self { section }
    }

    pub fn section(&self) -> &ModeSection {
        &self.section
    }

    pub async fn current(&self, session: &mut dyn BrowserSession) -> EditorMode {
        self.detect(session).await.0
    }

    /// Layered query: toggle state, raw-only surface, toolbar heuristic, then
    /// `Rendered`. A failing probe falls through to the next layer.
    pub async fn detect(&self, session: &mut dyn BrowserSession) -> (EditorMode, ModeEvidence) {
        for (toggle, mode) in [
            (&self.section.raw_markup_toggle, EditorMode::RawMarkup),
            (&self.section.rendered_toggle, EditorMode::Rendered),
        ] {
            let Some(selector) = toggle else { continue };
            match probe_element(session, selector).await {
                Ok(probe) if probe.found && probe.active => return (mode, ModeEvidence::Toggle),
                Ok(_) => {}
                Err(err) => debug!(selector = %selector, error = %err, "mode toggle probe failed"),
            }
        }

        for selector in &self.section.raw_surface_selectors {
            match probe_element(session, selector).await {
                Ok(probe) if probe.visible => {
                    return (EditorMode::RawMarkup, ModeEvidence::RawSurface)
                }
                Ok(_) => {}
                Err(err) => debug!(selector = %selector, error = %err, "raw surface probe failed"),
            }
        }

        if let Some(selector) = &self.section.toolbar_button_selector {
            match session
                .run_script(&scripts::TOOLBAR_STATE, json!({ "selector": selector }))
                .await
            {
                Ok(value) => {
                    let total = value.get("total").and_then(|v| v.as_u64()).unwrap_or(0);
                    let disabled = value.get("disabled").and_then(|v| v.as_u64()).unwrap_or(0);
                    if toolbar_implies_raw(total, disabled, self.section.toolbar_disabled_ratio) {
                        return (EditorMode::RawMarkup, ModeEvidence::Toolbar);
                    }
                }
                Err(err) => debug!(error = %err, "toolbar probe failed"),
            }
        }

        (EditorMode::Rendered, ModeEvidence::Default)
    }
}

/// Raw-markup editors grey out formatting controls.
pub fn toolbar_implies_raw(total: u64, disabled: u64, ratio: f64) -> bool {
    total > 0 && (disabled as f64 / total as f64) > ratio
}
