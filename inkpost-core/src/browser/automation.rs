use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromiumConfig};
use chromiumoxide::cdp::browser_protocol::input::InsertTextParams;
use chromiumoxide::cdp::browser_protocol::network::{
    ClearBrowserCookiesParams, CookieParam, SetUserAgentOverrideParams, TimeSinceEpoch,
};
use chromiumoxide::cdp::browser_protocol::page::{
    EventJavascriptDialogOpening, HandleJavaScriptDialogParams, NavigateParams,
};
use chromiumoxide::cdp::browser_protocol::target::CreateTargetParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::handler::viewport::Viewport as ChromiumViewport;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::config::{ChromiumSection, FlagsSection, InkpostConfig, ViewportSection};

use super::error::{BrowserError, BrowserResult};
use super::profile::{BrowserProfile, ProfileManager};
use super::scripts;
use super::session::{BrowserCookie, BrowserSession, DocumentContext, PageScript};

const DIALOG_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Default)]
pub struct LaunchOverrides {
    pub headless: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct BrowserLauncher {
    chromium: ChromiumSection,
    flags: FlagsSection,
    viewport: ViewportSection,
    profiles: ProfileManager,
}

impl BrowserLauncher {
    pub fn new(config: &InkpostConfig) -> BrowserResult<Self> {
        let profiles = ProfileManager::from_config(config)?;
        Ok(Self {
            chromium: config.chromium.clone(),
            flags: config.flags.clone(),
            viewport: config.viewport.clone(),
            profiles,
        })
    }

    pub async fn launch(&self) -> BrowserResult<BrowserAutomation> {
        self.launch_with_overrides(LaunchOverrides::default()).await
    }

    pub async fn launch_with_overrides(
        &self,
        overrides: LaunchOverrides,
    ) -> BrowserResult<BrowserAutomation> {
        self.profiles.cleanup_expired()?;
        let profile = self.profiles.allocate()?;
        let headless = overrides.headless.unwrap_or(self.chromium.headless);
        let chromium_config = self.build_chromium_config(&profile, headless)?;
        info!(
            profile = %profile.id(),
            width = self.viewport.width,
            height = self.viewport.height,
            headless,
            "Launching Chromium instance"
        );

        let (browser, mut handler) = Browser::launch(chromium_config)
            .await
            .map_err(|err| BrowserError::Launch(err.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "Chromium handler reported error");
                }
            }
        });

        profile.touch().await?;

        Ok(BrowserAutomation {
            browser,
            profile,
            handler_task: Some(handler_task),
            user_agent: self.chromium.user_agent.clone(),
            accept_language: self.flags.accept_language.clone(),
        })
    }

    fn build_chromium_config(
        &self,
        profile: &BrowserProfile,
        headless: bool,
    ) -> BrowserResult<ChromiumConfig> {
        let mut builder = ChromiumConfig::builder()
            .chrome_executable(&self.chromium.executable_path)
            .user_data_dir(profile.path())
            .viewport(ChromiumViewport {
                width: self.viewport.width,
                height: self.viewport.height,
                device_scale_factor: Some(self.viewport.device_scale_factor),
                emulating_mobile: false,
                is_landscape: self.viewport.width >= self.viewport.height,
                has_touch: false,
            });

        if !headless {
            builder = builder.with_head();
        }
        if !self.chromium.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(timeout) = self.chromium.request_timeout_seconds {
            builder = builder.request_timeout(Duration::from_secs(timeout));
        }

        let mut args = vec![format!(
            "--window-size={},{}",
            self.viewport.width, self.viewport.height
        )];
        if let Some(user_agent) = &self.chromium.user_agent {
            args.push(format!("--user-agent={user_agent}"));
        }
        if self.chromium.disable_gpu {
            args.push("--disable-gpu".into());
        }
        if let Some(lang) = &self.flags.lang {
            args.push(format!("--lang={lang}"));
        }
        for feature in &self.flags.disable_blink_features {
            args.push(format!("--disable-blink-features={feature}"));
        }
        if self.flags.no_first_run {
            args.push("--no-first-run".into());
        }
        if self.flags.disable_automation_controlled {
            args.push("--disable-features=AutomationControlled".into());
        }
        if let Some(accept) = &self.flags.accept_language {
            args.push(format!("--accept-lang={accept}"));
        }
        args.push("--disable-background-timer-throttling".into());
        args.push("--password-store=basic".into());

        builder = builder.args(args);

        builder.build().map_err(BrowserError::Configuration)
    }
}

/// A running Chromium instance. Callers must reach [`BrowserAutomation::shutdown`]
/// on every exit path.
#[derive(Debug)]
pub struct BrowserAutomation {
    browser: Browser,
    profile: BrowserProfile,
    handler_task: Option<JoinHandle<()>>,
    user_agent: Option<String>,
    accept_language: Option<String>,
}

impl BrowserAutomation {
    pub fn profile(&self) -> &BrowserProfile {
        &self.profile
    }

    pub async fn new_session(&self) -> BrowserResult<ChromiumSession> {
        let page = self
            .browser
            .new_page(CreateTargetParams::new("about:blank"))
            .await?;
        if let Some(user_agent) = &self.user_agent {
            let mut params = SetUserAgentOverrideParams::builder().user_agent(user_agent.clone());
            if let Some(accept) = &self.accept_language {
                params = params.accept_language(accept.clone());
            }
            page.set_user_agent(params.build().map_err(BrowserError::Configuration)?)
                .await?;
        }
        ChromiumSession::attach(page).await
    }

    pub async fn shutdown(mut self) -> BrowserResult<()> {
        info!(profile = %self.profile.id(), "Shutting down Chromium instance");
        if let Err(err) = self.browser.close().await {
            warn!(error = %err, "Failed to close browser gracefully");
        }
        if let Some(handle) = self.handler_task.take() {
            if let Err(err) = handle.await {
                warn!(error = %err, "Browser handler join error");
            }
        }
        self.profile.remove();
        Ok(())
    }
}

impl Drop for BrowserAutomation {
    fn drop(&mut self) {
        if let Some(handle) = &self.handler_task {
            if !handle.is_finished() {
                warn!(
                    profile = %self.profile.id(),
                    "BrowserAutomation dropped without explicit shutdown"
                );
            }
        }
    }
}

/// [`BrowserSession`] over a single chromiumoxide page.
#[derive(Debug)]
pub struct ChromiumSession {
    page: Page,
    context: DocumentContext,
    dialog: Arc<Mutex<Option<String>>>,
    dialog_task: JoinHandle<()>,
}

impl ChromiumSession {
    pub async fn attach(page: Page) -> BrowserResult<Self> {
        let dialog = Arc::new(Mutex::new(None));
        let mut events = page
            .event_listener::<EventJavascriptDialogOpening>()
            .await?;
        let slot = Arc::clone(&dialog);
        let dialog_task = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                debug!(kind = ?event.r#type, message = %event.message, "JavaScript dialog opened");
                if let Ok(mut guard) = slot.lock() {
                    *guard = Some(event.message.clone());
                }
            }
        });
        Ok(Self {
            page,
            context: DocumentContext::TopLevel,
            dialog,
            dialog_task,
        })
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    fn current_dialog(&self) -> Option<String> {
        self.dialog.lock().ok().and_then(|guard| guard.clone())
    }

    fn clear_dialog(&self) {
        if let Ok(mut guard) = self.dialog.lock() {
            *guard = None;
        }
    }

    fn frame_selector(&self) -> BrowserResult<String> {
        Ok(match &self.context {
            DocumentContext::TopLevel => "null".to_string(),
            DocumentContext::Frame(selector) => serde_json::to_string(selector)?,
        })
    }

    async fn evaluate_value(&self, name: &str, expression: String) -> BrowserResult<Value> {
        let result = self
            .page
            .evaluate(expression)
            .await
            .map_err(|err| BrowserError::script(name, err))?;
        result
            .into_value::<Value>()
            .map_err(|err| BrowserError::script(name, err))
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        self.dialog_task.abort();
    }
}

#[async_trait(?Send)]
impl BrowserSession for ChromiumSession {
    async fn goto(&mut self, url: &str) -> BrowserResult<()> {
        self.context = DocumentContext::TopLevel;
        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(BrowserError::Configuration)?;
        match self.page.goto(params).await {
            Ok(_) => Ok(()),
            Err(CdpError::Timeout) => Err(BrowserError::Timeout(format!("navigation to {url}"))),
            Err(err) => Err(BrowserError::Navigation(format!("{url}: {err}"))),
        }
    }

    async fn reload(&mut self) -> BrowserResult<()> {
        self.context = DocumentContext::TopLevel;
        self.page
            .reload()
            .await
            .map_err(|err| BrowserError::Navigation(format!("reload: {err}")))?;
        Ok(())
    }

    async fn current_url(&mut self) -> BrowserResult<String> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    async fn cookies(&mut self) -> BrowserResult<Vec<BrowserCookie>> {
        let cookies = self.page.get_cookies().await?;
        Ok(cookies
            .into_iter()
            .map(|cookie| BrowserCookie {
                domain: (!cookie.domain.is_empty()).then(|| cookie.domain.clone()),
                path: (!cookie.path.is_empty()).then(|| cookie.path.clone()),
                expires: (!cookie.session && cookie.expires > 0.0).then_some(cookie.expires),
                secure: cookie.secure,
                http_only: cookie.http_only,
                name: cookie.name,
                value: cookie.value,
            })
            .collect())
    }

    async fn set_cookie(&mut self, cookie: &BrowserCookie) -> BrowserResult<()> {
        let mut builder = CookieParam::builder()
            .name(cookie.name.clone())
            .value(cookie.value.clone())
            .secure(cookie.secure)
            .http_only(cookie.http_only);
        if let Some(domain) = &cookie.domain {
            builder = builder.domain(domain.clone());
        }
        if let Some(path) = &cookie.path {
            builder = builder.path(path.clone());
        }
        if let Some(expires) = cookie.expires {
            builder = builder.expires(TimeSinceEpoch::new(expires));
        }
        let param = builder.build().map_err(BrowserError::Configuration)?;
        self.page.set_cookie(param).await?;
        Ok(())
    }

    async fn clear_cookies(&mut self) -> BrowserResult<()> {
        self.page.execute(ClearBrowserCookiesParams::default()).await?;
        Ok(())
    }

    async fn enter_document(&mut self, context: &DocumentContext) -> BrowserResult<()> {
        if let DocumentContext::Frame(selector) = context {
            let quoted = serde_json::to_string(selector)?;
            let reachable = self
                .evaluate_value(
                    "enter_document",
                    format!(
                        "(() => {{ const host = document.querySelector({quoted}); return Boolean(host && host.contentDocument); }})()"
                    ),
                )
                .await?;
            if !reachable.as_bool().unwrap_or(false) {
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
        let frame = self.frame_selector()?;
        let args = serde_json::to_string(&args)?;
        let expression = format!(
            "(() => {{
    const frameSelector = {frame};
    let doc = document;
    if (frameSelector !== null) {{
        const host = document.querySelector(frameSelector);
        doc = host ? host.contentDocument : null;
    }}
    if (!doc) return {{ __inkpostContextLost: true }};
    const result = ({source})({args}, doc);
    return result === undefined ? null : result;
}})()",
            source = script.source,
        );
        let value = self.evaluate_value(script.name, expression).await?;
        if value.get("__inkpostContextLost").is_some() {
            return Err(BrowserError::ContextUnavailable(self.context.to_string()));
        }
        Ok(value)
    }

    async fn evaluate_expression(&mut self, expression: &str) -> BrowserResult<Value> {
        let wrapped = format!("(() => {{ const v = ({expression}); return v === undefined ? null : v; }})()");
        self.evaluate_value("expression", wrapped).await
    }

    async fn click(&mut self, selector: &str) -> BrowserResult<bool> {
        if self.context.is_nested() {
            let clicked = self
                .run_script(&scripts::CLICK_ELEMENT, serde_json::json!({ "selector": selector }))
                .await?;
            return Ok(clicked.as_bool().unwrap_or(false));
        }
        match self.page.find_element(selector).await {
            Ok(element) => {
                element.click().await?;
                Ok(true)
            }
            Err(err) => {
                debug!(selector, error = %err, "click target not found");
                Ok(false)
            }
        }
    }

    async fn insert_text(&mut self, text: &str) -> BrowserResult<()> {
        self.page.execute(InsertTextParams::new(text)).await?;
        Ok(())
    }

    async fn pending_dialog(&mut self, wait: Duration) -> BrowserResult<Option<String>> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(message) = self.current_dialog() {
                return Ok(Some(message));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            sleep(DIALOG_POLL).await;
        }
    }

    async fn resolve_dialog(&mut self, accept: bool) -> BrowserResult<()> {
        let result = self
            .page
            .execute(HandleJavaScriptDialogParams::new(accept))
            .await;
        self.clear_dialog();
        result?;
        Ok(())
    }
}
