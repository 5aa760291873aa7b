//! EmailJS REST transport.
//!
//! POSTs the rendered newsletter to the EmailJS send endpoint. Template
//! parameter names match the deployed email template (`to_email`,
//! `newsletter_content`, `categories`, `article_count`, `current_date`),
//! so they are part of the wire contract.

use async_trait::async_trait;
use gazette_core::config::EmailConfig;
use gazette_core::error::{GazetteError, Result};
use gazette_core::traits::Transport;
use gazette_core::types::RenderedEmail;
use serde_json::json;

/// EmailJS delivery transport.
pub struct EmailJsTransport {
    config: EmailConfig,
    client: reqwest::Client,
}

impl EmailJsTransport {
    /// Create the transport. Credential validation happens at the
    /// daemon's startup check and again at the send seam — building the
    /// transport itself never fails.
    pub fn new(config: EmailConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Transport for EmailJsTransport {
    async fn send(&self, email: &RenderedEmail) -> Result<()> {
        self.config.validate()?;

        let mut body = json!({
            "service_id": self.config.service_id,
            "template_id": self.config.template_id,
            "user_id": self.config.public_key,
            "template_params": {
                "to_email": email.to,
                "newsletter_content": email.content,
                "categories": email.categories,
                "article_count": email.article_count,
                "current_date": email.date,
            },
        });
        if !self.config.private_key.is_empty() {
            body["accessToken"] = json!(self.config.private_key);
        }

        let resp = self
            .client
            .post(&self.config.endpoint)
            .json(&body)
            .timeout(std::time::Duration::from_secs(self.config.timeout_secs))
            .send()
            .await
            .map_err(|e| GazetteError::Delivery(format!("send failed: {e}")))?;

        if resp.status().is_success() {
            tracing::info!("📤 Email sent to {}", email.to);
            Ok(())
        } else {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            Err(GazetteError::Delivery(format!(
                "transport error {status}: {text}"
            )))
        }
    }
}
