mod generator;
mod images;
mod retry;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use generator::{generate_with_retry, ContentGenerator, HttpContentGenerator};
pub use images::{lookup_image, HttpImageSearch, ImageSearch};
pub use retry::{RetryOutcome, RetryPolicy};

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("generated post is missing {0}")]
    EmptyField(&'static str),
    #[error("generation endpoint not configured")]
    NotConfigured,
}

impl GenerationError {
    /// Transport failures and server-side statuses are worth another try;
    /// malformed or empty content is not.
    pub fn is_transient(&self) -> bool {
        match self {
            GenerationError::Transport(_) => true,
            GenerationError::Status(code) => *code >= 500 || *code == 429,
            _ => false,
        }
    }
}

/// Post content ready for injection. `body` is markup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostDraft {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl PostDraft {
    pub fn new(title: impl Into<String>, body: impl Into<String>, tags: Vec<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            tags,
        }
    }

    pub fn validate(&self) -> Result<(), GenerationError> {
        if self.title.trim().is_empty() {
            return Err(GenerationError::EmptyField("title"));
        }
        if self.body.trim().is_empty() {
            return Err(GenerationError::EmptyField("body"));
        }
        if !self.tags.iter().any(|tag| !tag.trim().is_empty()) {
            return Err(GenerationError::EmptyField("tags"));
        }
        Ok(())
    }

    /// Trimmed, non-empty, de-duplicated tags in their original order.
    pub fn clean_tags(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for tag in &self.tags {
            let tag = tag.trim();
            if !tag.is_empty() && !out.iter().any(|seen| seen == tag) {
                out.push(tag.to_string());
            }
        }
        out
    }

    pub fn tags_joined(&self, separator: &str) -> String {
        self.clean_tags().join(separator)
    }

    /// Prepends a lead image to the body.
    pub fn with_lead_image(mut self, url: &str, alt: &str) -> Self {
        let figure = format!(
            "<p><img src=\"{}\" alt=\"{}\"></p>\n",
            escape_attr(url),
            escape_attr(alt)
        );
        self.body = figure + &self.body;
        self
    }
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
