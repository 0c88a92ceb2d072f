use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::GenerationSection;

use super::retry::RetryPolicy;
use super::{GenerationError, PostDraft};

#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, topic: &str) -> Result<PostDraft, GenerationError>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    topic: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    title: String,
    #[serde(default, alias = "body_markup", alias = "content")]
    body: String,
    #[serde(default)]
    tags: TagList,
}

/// Endpoints answer with either a list or a comma-separated string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TagList {
    List(Vec<String>),
    Joined(String),
}

impl Default for TagList {
    fn default() -> Self {
        TagList::List(Vec::new())
    }
}

impl TagList {
    fn into_vec(self) -> Vec<String> {
        match self {
            TagList::List(tags) => tags,
            TagList::Joined(joined) => joined.split(',').map(|tag| tag.trim().to_string()).collect(),
        }
    }
}

pub struct HttpContentGenerator {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpContentGenerator {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn from_section(section: &GenerationSection) -> Result<Self, GenerationError> {
        Self::new(
            section.endpoint.clone(),
            Duration::from_secs(section.timeout_seconds),
        )
    }
}

#[async_trait]
impl ContentGenerator for HttpContentGenerator {
    async fn generate(&self, topic: &str) -> Result<PostDraft, GenerationError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&GenerateRequest { topic })
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GenerationError::Status(status.as_u16()));
        }
        let body: GenerateResponse = serde_json::from_slice(&response.bytes().await?)?;
        Ok(PostDraft::new(body.title, body.body, body.tags.into_vec()))
    }
}

/// Calls the generator under `policy`, validating every response before
/// accepting it. Empty fields are retried like transient failures.
pub async fn generate_with_retry(
    generator: &dyn ContentGenerator,
    topic: &str,
    policy: &RetryPolicy,
) -> Result<PostDraft, GenerationError> {
    let outcome = policy
        .run(
            |_| async move {
                let draft = generator.generate(topic).await?;
                draft.validate()?;
                Ok::<_, GenerationError>(draft)
            },
            |err: &GenerationError| err.is_transient() || matches!(err, GenerationError::EmptyField(_)),
        )
        .await?;
    info!(topic, attempts = outcome.attempts, title = %outcome.result.title, "content generated");
    Ok(outcome.result)
}
