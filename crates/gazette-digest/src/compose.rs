//! Digest composition — one generation call per cycle.
//!
//! The system instruction is fixed; the user instruction embeds the
//! requested categories and the enumerated articles. An empty response
//! is fatal to the cycle: there is no partial delivery.

use gazette_core::error::{GazetteError, Result};
use gazette_core::traits::Summarizer;
use gazette_core::types::Article;

const SYSTEM_PROMPT: &str = "You are an expert newsletter editor creating a personalized newsletter. \
Write a concise, engaging summary that highlights the most important stories, \
provides context and insights, and keeps a friendly, conversational tone. \
Structure the response as a proper newsletter with a title and clear, organized \
sections, and keep it email-friendly.";

/// Build the user instruction from the category list and articles.
pub fn user_prompt(categories: &[String], articles: &[Article]) -> String {
    let listing = articles
        .iter()
        .enumerate()
        .map(|(i, a)| {
            format!(
                "{}. {}\n   {}\n   Source: {}\n",
                i + 1,
                a.title,
                a.description,
                a.url
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Create a newsletter summary for these articles from the past week.\n\
         Categories requested: {}\n\n\
         Articles:\n{}",
        categories.join(", "),
        listing
    )
}

/// Compose the digest. Runs even with an empty article list (the
/// aggregator's emptiness is not an error); only unusable generation
/// output fails the cycle.
pub async fn compose(
    summarizer: &dyn Summarizer,
    categories: &[String],
    articles: &[Article],
) -> Result<String> {
    let prompt = user_prompt(categories, articles);
    let summary = summarizer.summarize(SYSTEM_PROMPT, &prompt).await?;
    let summary = summary.trim();
    if summary.is_empty() {
        return Err(GazetteError::Generation(
            "generation service returned no usable text".into(),
        ));
    }
    tracing::debug!("Composed digest: {} chars", summary.len());
    Ok(summary.to_string())
}
