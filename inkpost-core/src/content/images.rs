use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ImageSection;

use super::GenerationError;

#[async_trait]
pub trait ImageSearch: Send + Sync {
    async fn search(&self, keyword: &str) -> Result<Option<String>, GenerationError>;
}

pub struct HttpImageSearch {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpImageSearch {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn from_section(section: &ImageSection) -> Result<Self, GenerationError> {
        Self::new(
            section.endpoint.clone(),
            Duration::from_secs(section.timeout_seconds),
        )
    }
}

#[async_trait]
impl ImageSearch for HttpImageSearch {
    async fn search(&self, keyword: &str) -> Result<Option<String>, GenerationError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", keyword)])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GenerationError::Status(status.as_u16()));
        }
        let body: Value = serde_json::from_slice(&response.bytes().await?)?;
        Ok(first_image_url(&body))
    }
}

/// Accepts `{"url": ..}`, `{"images": [{"url": ..}]}`, `{"results": [..]}`
/// or a bare array of strings or objects.
pub(crate) fn first_image_url(body: &Value) -> Option<String> {
    let pick = |item: &Value| -> Option<String> {
        match item {
            Value::String(url) => Some(url.clone()),
            Value::Object(map) => ["url", "image_url", "src"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str))
                .map(str::to_string),
            _ => None,
        }
    };
    let candidates = match body {
        Value::Array(items) => items.clone(),
        Value::Object(map) => {
            if let Some(url) = pick(body) {
                return Some(url).filter(|url| url.starts_with("http"));
            }
            ["images", "results", "items"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_array).cloned())
                .unwrap_or_default()
        }
        _ => Vec::new(),
    };
    candidates
        .iter()
        .filter_map(pick)
        .find(|url| url.starts_with("http"))
}

/// Any failure degrades to no image.
pub async fn lookup_image(search: &dyn ImageSearch, keyword: &str) -> Option<String> {
    if keyword.trim().is_empty() {
        return None;
    }
    match search.search(keyword).await {
        Ok(Some(url)) => {
            debug!(keyword, url = %url, "image found");
            Some(url)
        }
        Ok(None) => None,
        Err(err) => {
            warn!(keyword, error = %err, "image search failed; continuing without image");
            None
        }
    }
}
