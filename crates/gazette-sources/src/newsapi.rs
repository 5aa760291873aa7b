//! NewsAPI-compatible content source.
//!
//! One call per category: `GET {base}/everything?q={category}&from={since}
//! &sortBy=publishedAt&apiKey={key}`. Articles come back with tolerant
//! field fallbacks — a missing title or description never drops the item.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gazette_core::config::NewsConfig;
use gazette_core::error::{GazetteError, Result};
use gazette_core::traits::ContentSource;
use gazette_core::types::Article;

/// HTTP client for a NewsAPI-style `everything` endpoint.
pub struct NewsApiSource {
    config: NewsConfig,
    client: reqwest::Client,
}

impl NewsApiSource {
    pub fn new(config: NewsConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ContentSource for NewsApiSource {
    async fn fetch(&self, category: &str, since: DateTime<Utc>) -> Result<Vec<Article>> {
        let url = format!("{}/everything", self.config.base_url.trim_end_matches('/'));
        let since = since.to_rfc3339();
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("q", category),
                ("from", since.as_str()),
                ("sortBy", "publishedAt"),
                ("apiKey", self.config.api_key.as_str()),
            ])
            .timeout(std::time::Duration::from_secs(self.config.timeout_secs))
            .send()
            .await
            .map_err(|e| GazetteError::Fetch(format!("'{category}': {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(GazetteError::Fetch(format!("'{category}': HTTP {status}")));
        }

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| GazetteError::Fetch(format!("'{category}': bad response: {e}")))?;

        let articles = json["articles"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .map(|a| Article {
                        title: a["title"].as_str().unwrap_or("No title").to_string(),
                        url: a["url"].as_str().unwrap_or("").to_string(),
                        description: a["description"]
                            .as_str()
                            .unwrap_or("No description available")
                            .to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(articles)
    }
}
