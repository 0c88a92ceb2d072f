#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use inkpost_core::browser::{
    BrowserCookie, BrowserError, BrowserResult, BrowserSession, DocumentContext, PageScript,
};
use inkpost_core::config::{load_config, InkpostConfig};

pub const HOME: &str = "https://blog.example.test/manage";
pub const COMPOSER: &str = "https://blog.example.test/manage/newpost";
pub const LOGIN: &str = "https://blog.example.test/auth/login";
pub const AUTH_COOKIE: &str = "TSSESSION";
pub const AUTH_VALUE: &str = "live-session";
pub const MARKER: &str = "a[href*='/manage/newpost']";

pub const TITLE: &str = "#post-title-inp";
pub const TAGS: &str = "#tagText";
pub const CODE_SURFACE: &str = ".CodeMirror";
pub const RICH_FRAME: &str = "#editor-tistory_ifr";
pub const RICH_BODY: &str = "body#tinymce";
pub const RENDERED_TOGGLE: &str = "#editor-mode-kakao";
pub const RAW_TOGGLE: &str = "#editor-mode-html";

/// Fixture config with every delay collapsed and state redirected under
/// `state_dir`.
pub fn test_config(state_dir: &Path) -> InkpostConfig {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../configs/inkpost.toml");
    let mut config = load_config(path).expect("fixture config");
    config.base_dir = state_dir.to_path_buf();
    config.session.store_dir = "sessions".into();
    config.observability.audit_log = "logs/audit.jsonl".into();
    config.observability.audit_db = "audit.sqlite".into();
    config.oracle.settle_ms = 0;
    config.alerts.settle_ms = 0;
    config.alerts.detect_timeout_ms = 0;
    config.injection.chunk_pause_ms = 0;
    config.injection.retry_settle_ms = 0;
    config.mode.switch_timeout_ms = 50;
    config.workflow.step_timeout_ms = 50;
    config.workflow.poll_interval_ms = 10;
    if let Some(credentials) = config.credentials.as_mut() {
        credentials.two_factor_budget_seconds = 0;
        credentials.poll_interval_seconds = 0;
    }
    config.operator.manual_login_budget_seconds = 0;
    config.operator.poll_interval_seconds = 0;
    config
}

pub fn auth_cookie(value: &str) -> BrowserCookie {
    let mut cookie = BrowserCookie::new(AUTH_COOKIE, value).with_domain(".example.test");
    cookie.path = Some("/".into());
    cookie.expires = Some(1_900_000_000.5);
    cookie.http_only = true;
    cookie
}

#[derive(Debug, Clone)]
pub enum Effect {
    Show(String),
    Hide(String),
    Activate(String),
    Deactivate(String),
    Navigate(String),
    Dialog(String),
    AddCookie(BrowserCookie),
    /// Enables the surface and clears any write cap on it.
    ClearSurface(DocumentContext, String),
}

/// In-memory page: elements are selectors, surfaces hold text content, and
/// the login markers appear only while the jar holds the live auth cookie.
#[derive(Debug)]
pub struct FakeSession {
    pub url: String,
    pub jar: Vec<BrowserCookie>,
    pub storage: Vec<(String, String)>,
    pub reject_full_cookies: bool,
    pub goto_failures: usize,
    /// Navigation times out while a dialog is open, as it does in Chromium.
    pub dialog_blocks_navigation: bool,
    /// Navigation fails with an error that is not worth retrying.
    pub goto_fatal: bool,
    pub dialog_probe_fails: bool,
    pub context: DocumentContext,
    pub frames: HashSet<String>,
    pub visible: HashSet<String>,
    pub active: HashSet<String>,
    pub surfaces: HashMap<(DocumentContext, String), String>,
    pub write_caps: HashMap<String, usize>,
    pub disabled_scripts: HashSet<&'static str>,
    pub toolbar: (u64, u64),
    pub focused: Option<(DocumentContext, String)>,
    pub on_click: HashMap<String, Vec<Effect>>,
    pub dialogs: VecDeque<String>,
    pub sticky_dialog: Option<String>,
    pub resolved: Vec<(String, bool)>,
    pub calls: Vec<String>,
    pub clicks: Vec<String>,
    pub visits: Vec<String>,
}

impl Default for FakeSession {
    fn default() -> Self {
        Self {
            url: "about:blank".into(),
            jar: Vec::new(),
            storage: Vec::new(),
            reject_full_cookies: false,
            goto_failures: 0,
            dialog_blocks_navigation: false,
            goto_fatal: false,
            dialog_probe_fails: false,
            context: DocumentContext::TopLevel,
            frames: HashSet::new(),
            visible: HashSet::new(),
            active: HashSet::new(),
            surfaces: HashMap::new(),
            write_caps: HashMap::new(),
            disabled_scripts: HashSet::new(),
            toolbar: (0, 0),
            focused: None,
            on_click: HashMap::new(),
            dialogs: VecDeque::new(),
            sticky_dialog: None,
            resolved: Vec::new(),
            calls: Vec::new(),
            clicks: Vec::new(),
            visits: Vec::new(),
        }
    }
}

impl FakeSession {
    /// Raw-markup editor with title and tag inputs on the composer page.
    pub fn composer() -> Self {
        let mut session = Self::default();
        session.url = HOME.into();
        session.frames.insert(RICH_FRAME.into());
        session.active.insert(RAW_TOGGLE.into());
        session.visible.insert(RAW_TOGGLE.into());
        session.visible.insert(RENDERED_TOGGLE.into());
        session.add_surface(DocumentContext::TopLevel, TITLE);
        session.add_surface(DocumentContext::TopLevel, CODE_SURFACE);
        session.add_surface(DocumentContext::TopLevel, TAGS);
        session.add_surface(DocumentContext::Frame(RICH_FRAME.into()), RICH_BODY);
        session
    }

    pub fn signed_in(mut self) -> Self {
        self.jar.push(auth_cookie(AUTH_VALUE));
        self
    }

    pub fn add_surface(&mut self, context: DocumentContext, selector: &str) {
        self.surfaces.insert((context, selector.to_string()), String::new());
    }

    pub fn remove_surface(&mut self, selector: &str) {
        self.surfaces.retain(|(_, sel), _| sel != selector);
    }

    pub fn surface(&self, context: &DocumentContext, selector: &str) -> Option<&str> {
        self.surfaces
            .get(&(context.clone(), selector.to_string()))
            .map(String::as_str)
    }

    pub fn top_surface(&self, selector: &str) -> Option<&str> {
        self.surface(&DocumentContext::TopLevel, selector)
    }

    pub fn calls_to(&self, name: &str) -> usize {
        self.calls.iter().filter(|call| call.as_str() == name).count()
    }

    pub fn authenticated(&self) -> bool {
        self.url.starts_with("https://blog.example.test")
            && self.jar.iter().any(|cookie| {
                cookie.name == AUTH_COOKIE
                    && cookie.value == AUTH_VALUE
                    && cookie
                        .domain
                        .as_deref()
                        .is_some_and(|domain| domain.trim_start_matches('.').ends_with("example.test"))
            })
    }

    fn element_visible(&self, selector: &str) -> bool {
        if self.surfaces.contains_key(&(self.context.clone(), selector.to_string())) {
            return true;
        }
        if self.context != DocumentContext::TopLevel {
            return false;
        }
        self.visible.contains(selector) || (selector == MARKER && self.authenticated())
    }

    fn write(&mut self, selector: &str, content: &str, append: bool) -> bool {
        let key = (self.context.clone(), selector.to_string());
        let cap = self.write_caps.get(selector).copied();
        let Some(slot) = self.surfaces.get_mut(&key) else {
            return false;
        };
        let mut next = if append { slot.clone() } else { String::new() };
        next.push_str(content);
        if let Some(cap) = cap {
            next = next.chars().take(cap).collect();
        }
        *slot = next;
        true
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::Show(selector) => {
                self.visible.insert(selector);
            }
            Effect::Hide(selector) => {
                self.visible.remove(&selector);
            }
            Effect::Activate(selector) => {
                self.active.insert(selector);
            }
            Effect::Deactivate(selector) => {
                self.active.remove(&selector);
            }
            Effect::Navigate(url) => self.url = url,
            Effect::Dialog(message) => self.dialogs.push_back(message),
            Effect::AddCookie(cookie) => {
                self.jar.retain(|existing| existing.name != cookie.name);
                self.jar.push(cookie);
            }
            Effect::ClearSurface(context, selector) => {
                self.write_caps.remove(&selector);
                self.surfaces.insert((context, selector), String::new());
            }
        }
    }

    fn script_result(&mut self, name: &str, args: &Value) -> Value {
        let selector = args
            .get("selector")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let content = args
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        match name {
            "probe_element" => {
                let visible = self.element_visible(&selector);
                json!({
                    "found": visible,
                    "visible": visible,
                    "enabled": visible,
                    "active": self.active.contains(&selector),
                })
            }
            "text_contains" => {
                let text = if self.authenticated() { "내 블로그 로그아웃" } else { "로그인" };
                let needles: Vec<String> = serde_json::from_value(args["needles"].clone()).unwrap_or_default();
                needles
                    .into_iter()
                    .find(|needle| text.contains(needle.as_str()))
                    .map(Value::String)
                    .unwrap_or(Value::Null)
            }
            "storage_snapshot" => json!(self.storage),
            "storage_restore" => {
                let entries: Vec<(String, String)> =
                    serde_json::from_value(args["entries"].clone()).unwrap_or_default();
                let count = entries.len();
                self.storage.extend(entries);
                json!(count)
            }
            "click_element" => {
                let clicked = self.element_visible(&selector);
                if clicked {
                    self.fire_click(&selector);
                }
                json!(clicked)
            }
            "toolbar_state" => json!({ "total": self.toolbar.0, "disabled": self.toolbar.1 }),
            "rich_editor_api" | "nested_document_write" | "code_surface_api" | "value_assignment" => {
                if self.disabled_scripts.contains(name) {
                    return json!({ "available": false });
                }
                let available = self.write(&selector, &content, false);
                let api = if available { Value::from(name) } else { Value::Null };
                json!({ "available": available, "api": api })
            }
            "focus_surface" => {
                if self.disabled_scripts.contains(name) {
                    return json!({ "focused": false });
                }
                let key = (self.context.clone(), selector.clone());
                if !self.surfaces.contains_key(&key) {
                    return json!({ "focused": false });
                }
                if args.get("clear").and_then(Value::as_bool).unwrap_or(false) {
                    self.write(&selector, "", false);
                }
                self.focused = Some(key);
                json!({ "focused": true })
            }
            "read_surface" => match self.surface(&self.context.clone(), &selector) {
                Some(content) => {
                    let probe = args.get("probe").and_then(Value::as_str).unwrap_or_default();
                    let flat = flatten(content);
                    json!({
                        "found": true,
                        "length": content.encode_utf16().count(),
                        "contains": !probe.is_empty() && flat.contains(probe),
                    })
                }
                None => json!({ "found": false, "length": 0, "contains": false }),
            },
            other => panic!("unexpected script {other}"),
        }
    }

    fn fire_click(&mut self, selector: &str) {
        self.clicks.push(selector.to_string());
        if let Some(effects) = self.on_click.get(selector).cloned() {
            for effect in effects {
                self.apply(effect);
            }
        }
    }
}

fn flatten(content: &str) -> String {
    let mut out = String::new();
    let mut in_tag = false;
    for ch in content.chars() {
        match ch {
            '<' => {
                in_tag = true;
                out.push(' ');
            }
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[async_trait(?Send)]
impl BrowserSession for FakeSession {
    async fn goto(&mut self, url: &str) -> BrowserResult<()> {
        self.visits.push(url.to_string());
        self.context = DocumentContext::TopLevel;
        if self.goto_fatal {
            return Err(BrowserError::Configuration(format!("{url}: invalid url")));
        }
        if self.dialog_blocks_navigation && (self.sticky_dialog.is_some() || !self.dialogs.is_empty()) {
            return Err(BrowserError::Timeout(format!("navigation to {url}")));
        }
        if self.goto_failures > 0 {
            self.goto_failures -= 1;
            return Err(BrowserError::Navigation(format!("{url}: net::ERR_TIMED_OUT")));
        }
        self.url = url.to_string();
        Ok(())
    }

    async fn reload(&mut self) -> BrowserResult<()> {
        self.context = DocumentContext::TopLevel;
        Ok(())
    }

    async fn current_url(&mut self) -> BrowserResult<String> {
        Ok(self.url.clone())
    }

    async fn cookies(&mut self) -> BrowserResult<Vec<BrowserCookie>> {
        Ok(self.jar.clone())
    }

    async fn set_cookie(&mut self, cookie: &BrowserCookie) -> BrowserResult<()> {
        if self.reject_full_cookies && (cookie.path.is_some() || cookie.expires.is_some()) {
            return Err(BrowserError::Unexpected("Invalid cookie fields".into()));
        }
        if cookie.domain.is_none() {
            return Err(BrowserError::Unexpected("cookie needs a domain".into()));
        }
        self.jar.retain(|existing| existing.name != cookie.name);
        self.jar.push(cookie.clone());
        Ok(())
    }

    async fn clear_cookies(&mut self) -> BrowserResult<()> {
        self.jar.clear();
        Ok(())
    }

    async fn enter_document(&mut self, context: &DocumentContext) -> BrowserResult<()> {
        if let DocumentContext::Frame(selector) = context {
            if !self.frames.contains(selector) {
                return Err(BrowserError::ContextUnavailable(context.to_string()));
            }
        }
        self.context = context.clone();
        Ok(())
    }

    async fn exit_document(&mut self) -> BrowserResult<()> {
        self.context = DocumentContext::TopLevel;
        Ok(())
    }

    async fn run_script(&mut self, script: &PageScript, args: Value) -> BrowserResult<Value> {
        self.calls.push(script.name.to_string());
        Ok(self.script_result(script.name, &args))
    }

    async fn evaluate_expression(&mut self, _expression: &str) -> BrowserResult<Value> {
        Ok(Value::Null)
    }

    async fn click(&mut self, selector: &str) -> BrowserResult<bool> {
        if !self.element_visible(selector) {
            return Ok(false);
        }
        self.fire_click(selector);
        Ok(true)
    }

    async fn insert_text(&mut self, text: &str) -> BrowserResult<()> {
        self.calls.push("insert_text".into());
        let Some((context, selector)) = self.focused.clone() else {
            return Ok(());
        };
        let saved = std::mem::replace(&mut self.context, context);
        self.write(&selector, text, true);
        self.context = saved;
        Ok(())
    }

    async fn pending_dialog(&mut self, _wait: Duration) -> BrowserResult<Option<String>> {
        if self.dialog_probe_fails {
            return Err(BrowserError::Unexpected("target closed".into()));
        }
        if let Some(message) = &self.sticky_dialog {
            return Ok(Some(message.clone()));
        }
        Ok(self.dialogs.front().cloned())
    }

    async fn resolve_dialog(&mut self, accept: bool) -> BrowserResult<()> {
        self.calls.push("resolve_dialog".into());
        let message = match &self.sticky_dialog {
            Some(message) => message.clone(),
            None => self
                .dialogs
                .pop_front()
                .ok_or_else(|| BrowserError::Unexpected("no dialog open".into()))?,
        };
        self.resolved.push((message, accept));
        Ok(())
    }
}
