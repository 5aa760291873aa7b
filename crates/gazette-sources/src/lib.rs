//! # Gazette Sources
//!
//! The Content Aggregator: a NewsAPI-compatible client plus the merge
//! logic that fans out across categories, caps each category's
//! contribution, and absorbs per-category failures.

pub mod aggregate;
pub mod newsapi;

pub use aggregate::fetch_all;
pub use newsapi::NewsApiSource;
