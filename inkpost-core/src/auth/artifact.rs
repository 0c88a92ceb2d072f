use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::browser::BrowserCookie;
use crate::config::InkpostConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginKind {
    Cookie,
    Storage,
}

/// A persisted credential fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionArtifact {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub expires: Option<i64>,
    pub origin: OriginKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
}

impl SessionArtifact {
    pub fn storage(name: impl Into<String>, value: impl Into<String>, domain: &str) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.to_string(),
            expires: None,
            origin: OriginKind::Storage,
            path: None,
            secure: false,
            http_only: false,
        }
    }

    /// Full cookie form used for the first replay attempt.
    pub fn to_cookie(&self) -> BrowserCookie {
        BrowserCookie {
            name: self.name.clone(),
            value: self.value.clone(),
            domain: Some(self.domain.clone()),
            path: self.path.clone(),
            expires: self.expires.map(|secs| secs as f64),
            secure: self.secure,
            http_only: self.http_only,
        }
    }

    /// Name, value and canonical domain only; for sessions that reject the
    /// full form.
    pub fn reduced_cookie(&self, canonical_domain: &str) -> BrowserCookie {
        BrowserCookie::new(self.name.clone(), self.value.clone()).with_domain(canonical_domain)
    }
}

/// Lenient on-disk shape: records missing a name or value are dropped on
/// load instead of failing the whole file.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct StoredArtifact {
    pub name: Option<String>,
    pub value: Option<String>,
    pub domain: Option<String>,
    pub expires: Option<f64>,
    pub origin: Option<OriginKind>,
    pub path: Option<String>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
}

impl StoredArtifact {
    pub fn into_artifact(self, scope: &DomainScope, fallback: OriginKind) -> Option<SessionArtifact> {
        let name = self.name.filter(|name| !name.is_empty())?;
        let value = self.value?;
        let domain = self
            .domain
            .filter(|domain| !domain.trim().is_empty())
            .unwrap_or_else(|| scope.canonical().to_string());
        Some(SessionArtifact {
            name,
            value,
            domain,
            expires: self.expires.and_then(normalize_expiry),
            origin: self.origin.unwrap_or(fallback),
            path: self.path,
            secure: self.secure,
            http_only: self.http_only,
        })
    }
}

/// Float expiries become whole epoch seconds; session markers (zero,
/// negative, non-finite) become `None`.
pub fn normalize_expiry(expires: f64) -> Option<i64> {
    if expires.is_finite() && expires > 0.0 {
        Some(expires.trunc() as i64)
    } else {
        None
    }
}

/// Which domains count as the target's own.
#[derive(Debug, Clone)]
pub struct DomainScope {
    registrable: String,
    canonical: String,
    auth_names: HashSet<String>,
}

impl DomainScope {
    pub fn new(canonical_domain: &str, auth_names: &[String]) -> Self {
        let registrable = canonical_domain.trim().trim_start_matches('.').to_lowercase();
        Self {
            canonical: canonical_domain.trim().to_lowercase(),
            registrable,
            auth_names: auth_names.iter().cloned().collect(),
        }
    }

    pub fn from_config(config: &InkpostConfig) -> Self {
        Self::new(
            &config.target.canonical_domain,
            &config.session.auth_artifact_names,
        )
    }

    pub fn registrable(&self) -> &str {
        &self.registrable
    }

    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    pub fn matches(&self, domain: &str) -> bool {
        let domain = domain.trim().trim_start_matches('.').to_lowercase();
        if domain.is_empty() || self.registrable.is_empty() {
            return false;
        }
        domain == self.registrable
            || domain
                .strip_suffix(self.registrable.as_str())
                .is_some_and(|prefix| prefix.ends_with('.'))
    }

    pub fn matches_url(&self, url: &str) -> bool {
        Url::parse(url)
            .ok()
            .and_then(|parsed| parsed.host_str().map(|host| self.matches(host)))
            .unwrap_or(false)
    }

    /// Domain-scoped cookies must match; domainless ones survive only when
    /// their name is a known authentication artifact.
    pub fn admits(&self, cookie: &BrowserCookie) -> bool {
        match cookie.domain.as_deref().map(str::trim) {
            Some(domain) if !domain.is_empty() => self.matches(domain),
            _ => self.auth_names.contains(&cookie.name),
        }
    }

    pub fn artifact_from_cookie(&self, cookie: &BrowserCookie) -> Option<SessionArtifact> {
        if !self.admits(cookie) || cookie.name.is_empty() {
            return None;
        }
        let domain = cookie
            .domain
            .as_deref()
            .map(str::trim)
            .filter(|domain| !domain.is_empty())
            .unwrap_or(self.canonical.as_str())
            .to_string();
        Some(SessionArtifact {
            name: cookie.name.clone(),
            value: cookie.value.clone(),
            domain,
            expires: cookie.expires.and_then(normalize_expiry),
            origin: OriginKind::Cookie,
            path: cookie.path.clone(),
            secure: cookie.secure,
            http_only: cookie.http_only,
        })
    }
}
