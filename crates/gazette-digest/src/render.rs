//! Renderer — markdown summary to deliverable HTML plus metadata.
//!
//! Pure and side-effect free. If markdown conversion yields nothing
//! usable, the raw summary text passes through unchanged as the body.

use chrono::{DateTime, Local};
use gazette_core::types::RenderedEmail;
use pulldown_cmark::{Options, Parser, html};

/// Render the composed summary for delivery.
pub fn render(
    summary: &str,
    to: &str,
    categories: &[String],
    article_count: usize,
    now: DateTime<Local>,
) -> RenderedEmail {
    let mut content = String::new();
    let parser = Parser::new_ext(summary, Options::empty());
    html::push_html(&mut content, parser);

    if content.trim().is_empty() {
        content = summary.to_string();
    }

    RenderedEmail {
        to: to.to_string(),
        content,
        categories: categories.join(", "),
        article_count,
        date: now.format("%-m/%-d/%Y").to_string(),
    }
}
