use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::browser::{probe_element, BrowserSession, DocumentContext};
use crate::config::LocatorSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceKind {
    TextField,
    RichEdit,
    Markup,
}

impl SurfaceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SurfaceKind::TextField => "text_field",
            SurfaceKind::RichEdit => "rich_edit",
            SurfaceKind::Markup => "markup",
        }
    }
}

/// A resolved editing surface. Valid for one attempt only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InjectionTarget {
    pub context: DocumentContext,
    pub selector: String,
    pub kind: SurfaceKind,
}

/// First locator whose element is visible and enabled. The session is left
/// in the top-level document.
pub async fn locate(
    session: &mut dyn BrowserSession,
    locators: &[LocatorSpec],
) -> Option<InjectionTarget> {
    for locator in locators {
        let context = DocumentContext::from_frame(locator.frame.as_deref());
        if let Err(err) = session.enter_document(&context).await {
            debug!(%context, error = %err, "cannot enter document for locator");
            continue;
        }
        let probe = probe_element(session, &locator.selector).await;
        if let Err(err) = session.exit_document().await {
            warn!(%context, error = %err, "failed to leave document after probing");
        }
        match probe {
            Ok(probe) if probe.usable() => {
                return Some(InjectionTarget {
                    context,
                    selector: locator.selector.clone(),
                    kind: locator.kind,
                });
            }
            Ok(_) => debug!(%context, selector = %locator.selector, "locator not usable"),
            Err(err) => debug!(%context, selector = %locator.selector, error = %err, "locator probe failed"),
        }
    }
    None
}
