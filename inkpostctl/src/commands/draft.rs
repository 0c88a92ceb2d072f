use std::fs;
use std::path::PathBuf;

use clap::Args;
use tracing::{info, warn};

use inkpost_core::content::{
    generate_with_retry, lookup_image, GenerationError, HttpContentGenerator, HttpImageSearch,
    PostDraft, RetryPolicy,
};
use inkpost_core::InkpostConfig;

use crate::{AppContext, AppError, DisplayFallback, Result};

#[derive(Args, Debug, Clone)]
pub struct GenerateArgs {
    /// Topic handed to the content collaborator
    #[arg(long)]
    pub topic: String,
    /// Keyword for a lead image
    #[arg(long)]
    pub image_keyword: Option<String>,
}

/// Where the post comes from: a generated topic, or an explicit title and
/// body file.
#[derive(Args, Debug, Clone, Default)]
pub struct DraftArgs {
    /// Generate the post from this topic
    #[arg(long, conflicts_with_all = ["title", "body_file"])]
    pub topic: Option<String>,
    /// Post title
    #[arg(long)]
    pub title: Option<String>,
    /// File holding the body markup
    #[arg(long)]
    pub body_file: Option<PathBuf>,
    /// Comma-separated tags
    #[arg(long, value_delimiter = ',')]
    pub tags: Vec<String>,
    /// Keyword for a lead image
    #[arg(long)]
    pub image_keyword: Option<String>,
}

pub async fn generate(context: &AppContext, args: &GenerateArgs) -> Result<PostDraft> {
    let draft = generate_draft(context.config(), &args.topic).await?;
    Ok(with_image(context.config(), draft, args.image_keyword.as_deref()).await)
}

pub async fn resolve(context: &AppContext, args: &DraftArgs) -> Result<PostDraft> {
    let config = context.config();
    let mut draft = match &args.topic {
        Some(topic) => generate_draft(config, topic).await?,
        None => manual_draft(args)?,
    };
    if !args.tags.is_empty() {
        draft.tags = args.tags.clone();
    }
    draft.validate()?;
    Ok(with_image(config, draft, args.image_keyword.as_deref()).await)
}

fn manual_draft(args: &DraftArgs) -> Result<PostDraft> {
    let title = args
        .title
        .clone()
        .ok_or_else(|| AppError::InvalidInput("--title or --topic is required".into()))?;
    let path = args
        .body_file
        .as_ref()
        .ok_or_else(|| AppError::InvalidInput("--body-file or --topic is required".into()))?;
    let body = fs::read_to_string(path)?;
    Ok(PostDraft::new(title, body, args.tags.clone()))
}

async fn generate_draft(config: &InkpostConfig, topic: &str) -> Result<PostDraft> {
    let section = config
        .generation
        .as_ref()
        .ok_or(GenerationError::NotConfigured)?;
    let generator = HttpContentGenerator::from_section(section)?;
    let policy = RetryPolicy::from_section(section);
    info!(topic, endpoint = %section.endpoint, "requesting generated post");
    Ok(generate_with_retry(&generator, topic, &policy).await?)
}

async fn with_image(config: &InkpostConfig, draft: PostDraft, keyword: Option<&str>) -> PostDraft {
    let (Some(keyword), Some(section)) = (keyword, config.images.as_ref()) else {
        return draft;
    };
    let search = match HttpImageSearch::from_section(section) {
        Ok(search) => search,
        Err(err) => {
            warn!(error = %err, "image search unavailable");
            return draft;
        }
    };
    match lookup_image(&search, keyword).await {
        Some(url) => draft.with_lead_image(&url, keyword),
        None => draft,
    }
}

impl DisplayFallback for PostDraft {
    fn display(&self) -> String {
        let preview: String = self.body.chars().take(160).collect();
        format!(
            "Title: {}\nTags: {}\nBody ({} chars): {}",
            self.title,
            self.tags_joined(", "),
            self.body.chars().count(),
            preview.replace('\n', " ")
        )
    }
}
