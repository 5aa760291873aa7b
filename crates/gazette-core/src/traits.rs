//! Collaborator traits — the seams between the pipeline and the outside
//! world. Each external dependency (preferences store, content source,
//! generation service, delivery transport) sits behind a trait object so
//! cycles can be exercised end-to-end with in-memory fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{Article, RenderedEmail, Subscription};

/// The external preferences store. The pipeline reads it fresh each
/// cycle and only ever writes `is_active`.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<Option<Subscription>>;
    async fn set_active(&self, user_id: &str, active: bool) -> Result<()>;
}

/// The external content-fetch API: recent articles for one category.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn fetch(&self, category: &str, since: DateTime<Utc>) -> Result<Vec<Article>>;
}

/// The external text-generation service.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

/// The outbound delivery channel.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, email: &RenderedEmail) -> Result<()>;
}
