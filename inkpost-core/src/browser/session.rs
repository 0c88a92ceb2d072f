use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::error::BrowserResult;
use super::scripts;

/// Cookie as reported by (or handed to) the live browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserCookie {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: Option<String>,
    /// Seconds since the epoch; `None` for session cookies.
    pub expires: Option<f64>,
    pub secure: bool,
    pub http_only: bool,
}

impl BrowserCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: None,
            expires: None,
            secure: false,
            http_only: false,
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }
}

/// Document a script runs against: the page itself or the document of a
/// nested frame located by selector.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentContext {
    TopLevel,
    Frame(String),
}

impl DocumentContext {
    pub fn from_frame(frame: Option<&str>) -> Self {
        match frame {
            Some(selector) => DocumentContext::Frame(selector.to_string()),
            None => DocumentContext::TopLevel,
        }
    }

    pub fn is_nested(&self) -> bool {
        matches!(self, DocumentContext::Frame(_))
    }
}

impl fmt::Display for DocumentContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentContext::TopLevel => f.write_str("top"),
            DocumentContext::Frame(selector) => write!(f, "frame({selector})"),
        }
    }
}

/// A named page script. `source` is a JavaScript function expression taking
/// `(args, doc)` and returning a JSON-serializable value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageScript {
    pub name: &'static str,
    pub source: &'static str,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct ElementProbe {
    #[serde(default)]
    pub found: bool,
    #[serde(default)]
    pub visible: bool,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub active: bool,
}

impl ElementProbe {
    pub fn usable(&self) -> bool {
        self.found && self.visible && self.enabled
    }
}

/// The single handle through which the core touches a live browser. All
/// operations are sequential; implementations are not shared between
/// workflows.
#[async_trait(?Send)]
pub trait BrowserSession {
    async fn goto(&mut self, url: &str) -> BrowserResult<()>;
    async fn reload(&mut self) -> BrowserResult<()>;
    async fn current_url(&mut self) -> BrowserResult<String>;

    async fn cookies(&mut self) -> BrowserResult<Vec<BrowserCookie>>;
    async fn set_cookie(&mut self, cookie: &BrowserCookie) -> BrowserResult<()>;
    async fn clear_cookies(&mut self) -> BrowserResult<()>;

    async fn enter_document(&mut self, context: &DocumentContext) -> BrowserResult<()>;
    async fn exit_document(&mut self) -> BrowserResult<()>;

    async fn run_script(&mut self, script: &PageScript, args: Value) -> BrowserResult<Value>;
    /// Evaluates an operator-supplied expression in the top-level window.
    async fn evaluate_expression(&mut self, expression: &str) -> BrowserResult<Value>;

    /// Clicks the first element matching `selector` in the current document.
    /// Returns `false` when nothing matched.
    async fn click(&mut self, selector: &str) -> BrowserResult<bool>;
    /// Types into whatever element currently holds focus.
    async fn insert_text(&mut self, text: &str) -> BrowserResult<()>;

    /// Waits up to `wait` for a JavaScript dialog and returns its message.
    async fn pending_dialog(&mut self, wait: Duration) -> BrowserResult<Option<String>>;
    async fn resolve_dialog(&mut self, accept: bool) -> BrowserResult<()>;
}

pub async fn probe_element(
    session: &mut dyn BrowserSession,
    selector: &str,
) -> BrowserResult<ElementProbe> {
    let value = session
        .run_script(&scripts::PROBE_ELEMENT, json!({ "selector": selector }))
        .await?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// First of `needles` present in the rendered text of the current document.
pub async fn find_text(
    session: &mut dyn BrowserSession,
    needles: &[String],
) -> BrowserResult<Option<String>> {
    if needles.is_empty() {
        return Ok(None);
    }
    let value = session
        .run_script(&scripts::TEXT_CONTAINS, json!({ "needles": needles }))
        .await?;
    Ok(value.as_str().map(str::to_string))
}

pub async fn storage_snapshot(
    session: &mut dyn BrowserSession,
) -> BrowserResult<Vec<(String, String)>> {
    let value = session
        .run_script(&scripts::STORAGE_SNAPSHOT, Value::Null)
        .await?;
    Ok(serde_json::from_value(value)?)
}

pub async fn restore_storage(
    session: &mut dyn BrowserSession,
    entries: &[(String, String)],
) -> BrowserResult<usize> {
    if entries.is_empty() {
        return Ok(0);
    }
    let value = session
        .run_script(&scripts::STORAGE_RESTORE, json!({ "entries": entries }))
        .await?;
    Ok(value.as_u64().unwrap_or(0) as usize)
}

/// Assigns `value` to an input through the native setter, firing input and
/// change events. Returns `false` when the selector matched no value field.
pub async fn fill_field(
    session: &mut dyn BrowserSession,
    selector: &str,
    value: &str,
) -> BrowserResult<bool> {
    let result = session
        .run_script(
            &scripts::VALUE_ASSIGNMENT,
            json!({ "selector": selector, "content": value }),
        )
        .await?;
    Ok(result
        .get("available")
        .and_then(Value::as_bool)
        .unwrap_or(false))
}

/// Polls until any of `selectors` is visible or `budget` elapses.
pub async fn wait_for_any(
    session: &mut dyn BrowserSession,
    selectors: &[String],
    budget: Duration,
    interval: Duration,
) -> Option<String> {
    let deadline = tokio::time::Instant::now() + budget;
    loop {
        for selector in selectors {
            // Probes fail while the page is mid-navigation; keep polling.
            let visible = probe_element(session, selector)
                .await
                .map(|probe| probe.visible)
                .unwrap_or(false);
            if visible {
                return Some(selector.clone());
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(interval).await;
    }
}
