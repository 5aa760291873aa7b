//! Per-category fan-out and merge.
//!
//! Categories are fetched concurrently; each contributes at most
//! `per_category` items, concatenated in category order. A failing
//! category is logged and contributes nothing — the aggregate itself
//! never fails, and an empty result is a valid outcome.

use chrono::{Duration, Utc};
use gazette_core::traits::ContentSource;
use gazette_core::types::Article;

/// Fetch recent articles for every category and merge them.
pub async fn fetch_all(
    source: &dyn ContentSource,
    categories: &[String],
    lookback_days: i64,
    per_category: usize,
) -> Vec<Article> {
    let since = Utc::now() - Duration::days(lookback_days);

    let fetches = categories.iter().map(|category| async move {
        match source.fetch(category, since).await {
            Ok(articles) => articles,
            Err(e) => {
                tracing::warn!("Fetch failed for category {category}: {e}");
                Vec::new()
            }
        }
    });

    let per_cat: Vec<Vec<Article>> = futures::future::join_all(fetches).await;

    per_cat
        .into_iter()
        .flat_map(|mut articles| {
            articles.truncate(per_category);
            articles
        })
        .collect()
}
