use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::editor::{EditorMode, StrategyKind, SurfaceKind};
use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct InkpostConfig {
    pub target: TargetSection,
    pub session: SessionSection,
    pub oracle: OracleSection,
    #[serde(default)]
    pub credentials: Option<CredentialsSection>,
    #[serde(default)]
    pub operator: OperatorSection,
    #[serde(default)]
    pub alerts: AlertSection,
    pub mode: ModeSection,
    pub injection: InjectionSection,
    pub workflow: WorkflowSection,
    #[serde(default)]
    pub generation: Option<GenerationSection>,
    #[serde(default)]
    pub images: Option<ImageSection>,
    pub chromium: ChromiumSection,
    #[serde(default)]
    pub flags: FlagsSection,
    #[serde(default)]
    pub viewport: ViewportSection,
    pub observability: ObservabilitySection,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl InkpostConfig {
    /// Relative paths in the file are resolved against the directory that
    /// holds the config file.
    pub fn resolve_path<P: AsRef<Path>>(&self, candidate: P) -> PathBuf {
        let path = candidate.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.target.id.trim().is_empty() {
            return Err("target.id must not be empty".into());
        }
        if self.target.canonical_domain.trim_start_matches('.').is_empty() {
            return Err("target.canonical_domain must not be empty".into());
        }
        let ratio = self.injection.verify_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(format!(
                "injection.verify_ratio must be in (0, 1], got {ratio}"
            ));
        }
        if self.injection.chunk_size == 0 {
            return Err("injection.chunk_size must be positive".into());
        }
        for (name, plan) in [
            ("injection.title", &self.injection.title),
            ("injection.tags", &self.injection.tags),
            ("injection.body.rendered", &self.injection.body.rendered),
            ("injection.body.raw_markup", &self.injection.body.raw_markup),
        ] {
            if plan.locators.is_empty() {
                return Err(format!("{name}.locators must not be empty"));
            }
            if plan.strategies.is_empty() {
                return Err(format!("{name}.strategies must not be empty"));
            }
        }
        for rule in &self.alerts.rules {
            if let Err(err) = regex::Regex::new(&rule.pattern) {
                return Err(format!("alerts.rules pattern {:?}: {err}", rule.pattern));
            }
        }
        if let Some(pattern) = &self.workflow.published_url_pattern {
            if let Err(err) = regex::Regex::new(pattern) {
                return Err(format!("workflow.published_url_pattern {pattern:?}: {err}"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetSection {
    /// Stable identifier used to key the session store.
    pub id: String,
    pub home_url: String,
    pub composer_url: String,
    /// Cookie domain assigned to artifacts that carry none, e.g. `.example.test`.
    pub canonical_domain: String,
    #[serde(default)]
    pub login_url_patterns: Vec<String>,
}

impl TargetSection {
    pub fn registrable_domain(&self) -> &str {
        self.canonical_domain.trim_start_matches('.')
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionSection {
    pub store_dir: String,
    #[serde(default)]
    pub auth_artifact_names: Vec<String>,
    #[serde(default = "default_true")]
    pub capture_storage: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OracleSection {
    #[serde(default)]
    pub marker_selectors: Vec<String>,
    #[serde(default)]
    pub client_state_expressions: Vec<String>,
    #[serde(default)]
    pub sign_out_texts: Vec<String>,
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsSection {
    pub login_url: String,
    pub username_selector: String,
    pub password_selector: String,
    pub submit_selector: String,
    #[serde(default = "default_username_env")]
    pub username_env: String,
    #[serde(default = "default_password_env")]
    pub password_env: String,
    #[serde(default = "default_two_factor_budget")]
    pub two_factor_budget_seconds: u64,
    #[serde(default = "default_poll_seconds")]
    pub poll_interval_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OperatorSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_manual_budget")]
    pub manual_login_budget_seconds: u64,
    #[serde(default = "default_poll_seconds")]
    pub poll_interval_seconds: u64,
}

impl Default for OperatorSection {
    fn default() -> Self {
        Self {
            enabled: true,
            manual_login_budget_seconds: default_manual_budget(),
            poll_interval_seconds: default_poll_seconds(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Accept,
    Dismiss,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertRule {
    pub pattern: String,
    pub disposition: Disposition,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertSection {
    #[serde(default = "default_alert_attempts")]
    pub max_attempts: usize,
    #[serde(default = "default_detect_timeout")]
    pub detect_timeout_ms: u64,
    #[serde(default = "default_alert_settle")]
    pub settle_ms: u64,
    #[serde(default = "default_disposition")]
    pub default_disposition: Disposition,
    #[serde(default)]
    pub rules: Vec<AlertRule>,
}

impl Default for AlertSection {
    fn default() -> Self {
        Self {
            max_attempts: default_alert_attempts(),
            detect_timeout_ms: default_detect_timeout(),
            settle_ms: default_alert_settle(),
            default_disposition: default_disposition(),
            rules: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModeSection {
    pub rendered_toggle: Option<String>,
    pub raw_markup_toggle: Option<String>,
    #[serde(default)]
    pub raw_surface_selectors: Vec<String>,
    pub toolbar_button_selector: Option<String>,
    #[serde(default = "default_toolbar_ratio")]
    pub toolbar_disabled_ratio: f64,
    #[serde(default = "default_switch_timeout")]
    pub switch_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocatorSpec {
    /// Selector of the frame element hosting the surface; `None` means the
    /// top-level document.
    #[serde(default)]
    pub frame: Option<String>,
    pub selector: String,
    pub kind: SurfaceKind,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SurfacePlan {
    pub locators: Vec<LocatorSpec>,
    pub strategies: Vec<StrategyKind>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BodySurfaces {
    pub rendered: SurfacePlan,
    pub raw_markup: SurfacePlan,
}

impl BodySurfaces {
    pub fn for_mode(&self, mode: EditorMode) -> &SurfacePlan {
        match mode {
            EditorMode::Rendered => &self.rendered,
            EditorMode::RawMarkup => &self.raw_markup,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InjectionSection {
    #[serde(default = "default_verify_ratio")]
    pub verify_ratio: f64,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_pause")]
    pub chunk_pause_ms: u64,
    #[serde(default = "default_retry_settle")]
    pub retry_settle_ms: u64,
    #[serde(default = "default_body_mode")]
    pub body_mode: EditorMode,
    #[serde(default = "default_tag_separator")]
    pub tag_separator: String,
    pub title: SurfacePlan,
    pub body: BodySurfaces,
    pub tags: SurfacePlan,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowSection {
    pub save_selector: String,
    #[serde(default)]
    pub saved_marker_selectors: Vec<String>,
    pub publish_selector: String,
    pub publish_layer_selector: String,
    pub publish_confirm_selector: String,
    #[serde(default)]
    pub published_marker_selectors: Vec<String>,
    pub published_url_pattern: Option<String>,
    #[serde(default = "default_step_timeout")]
    pub step_timeout_ms: u64,
    #[serde(default = "default_poll_ms")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerationSection {
    pub endpoint: String,
    #[serde(default = "default_generation_attempts")]
    pub max_attempts: usize,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
    #[serde(default = "default_request_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageSection {
    pub endpoint: String,
    #[serde(default = "default_request_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChromiumSection {
    pub executable_path: String,
    pub headless: bool,
    pub sandbox: bool,
    #[serde(default)]
    pub disable_gpu: bool,
    pub profile_dir: String,
    #[serde(default = "default_profile_ttl")]
    pub profile_ttl_hours: u64,
    pub request_timeout_seconds: Option<u64>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlagsSection {
    #[serde(default)]
    pub no_first_run: bool,
    #[serde(default)]
    pub disable_automation_controlled: bool,
    #[serde(default)]
    pub disable_blink_features: Vec<String>,
    pub lang: Option<String>,
    pub accept_language: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ViewportSection {
    pub width: u32,
    pub height: u32,
    pub device_scale_factor: f64,
}

impl Default for ViewportSection {
    fn default() -> Self {
        Self {
            width: 1366,
            height: 900,
            device_scale_factor: 1.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilitySection {
    pub audit_log: String,
    pub audit_db: String,
}

fn default_true() -> bool {
    true
}
fn default_settle_ms() -> u64 {
    1500
}
fn default_username_env() -> String {
    "INKPOST_USERNAME".into()
}
fn default_password_env() -> String {
    "INKPOST_PASSWORD".into()
}
fn default_two_factor_budget() -> u64 {
    180
}
fn default_manual_budget() -> u64 {
    300
}
fn default_poll_seconds() -> u64 {
    3
}
fn default_alert_attempts() -> usize {
    5
}
fn default_detect_timeout() -> u64 {
    400
}
fn default_alert_settle() -> u64 {
    300
}
fn default_disposition() -> Disposition {
    Disposition::Accept
}
fn default_toolbar_ratio() -> f64 {
    0.6
}
fn default_switch_timeout() -> u64 {
    5000
}
fn default_verify_ratio() -> f64 {
    0.9
}
fn default_chunk_size() -> usize {
    400
}
fn default_chunk_pause() -> u64 {
    40
}
fn default_retry_settle() -> u64 {
    500
}
fn default_body_mode() -> EditorMode {
    EditorMode::RawMarkup
}
fn default_tag_separator() -> String {
    ",".into()
}
fn default_step_timeout() -> u64 {
    10_000
}
fn default_poll_ms() -> u64 {
    250
}
fn default_generation_attempts() -> usize {
    3
}
fn default_backoff_ms() -> u64 {
    1000
}
fn default_jitter_ms() -> u64 {
    250
}
fn default_request_timeout() -> u64 {
    60
}
fn default_profile_ttl() -> u64 {
    24
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<InkpostConfig> {
    let path = path.as_ref();
    let mut config: InkpostConfig = load_toml(path)?;
    config.base_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    config.validate().map_err(|reason| ConfigError::Invalid {
        reason,
        path: path.to_path_buf(),
    })?;
    Ok(config)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_path() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/inkpost.toml")
    }

    #[test]
    fn load_fixture_config() {
        let config = load_config(fixture_path()).expect("fixture should parse");
        assert_eq!(config.target.id, "example-blog");
        assert_eq!(config.target.registrable_domain(), "example.test");
        assert_eq!(config.injection.body_mode, EditorMode::RawMarkup);
        assert_eq!(
            config.injection.body.rendered.strategies,
            vec![
                StrategyKind::RichEditorApi,
                StrategyKind::NestedDocumentWrite,
                StrategyKind::ChunkedKeystrokes,
            ]
        );
        assert!(config.alerts.rules.len() >= 2);
        assert!(config.credentials.is_some());
    }

    #[test]
    fn relative_paths_resolve_against_config_dir() {
        let config = load_config(fixture_path()).unwrap();
        let resolved = config.resolve_path(&config.session.store_dir);
        assert!(resolved.starts_with(&config.base_dir));
        assert_eq!(
            config.resolve_path("/var/lib/inkpost"),
            PathBuf::from("/var/lib/inkpost")
        );
    }

    #[test]
    fn validate_rejects_out_of_range_ratio() {
        let mut config = load_config(fixture_path()).unwrap();
        config.injection.verify_ratio = 1.5;
        let err = config.validate().unwrap_err();
        assert!(err.contains("verify_ratio"));
    }

    #[test]
    fn validate_rejects_empty_strategy_list() {
        let mut config = load_config(fixture_path()).unwrap();
        config.injection.tags.strategies.clear();
        assert!(config.validate().unwrap_err().contains("injection.tags"));
    }
}
