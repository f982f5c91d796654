//! Email dispatch of the digest.
//!
//! Reports go out through a Resend-compatible HTTP API, one request per
//! recipient so that each recipient gets its own outcome. Without an API key
//! nothing is sent; the report carries a `mailto:` compose link instead.

mod report;

pub use report::{compose_link, is_valid_address, render_text};

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::EmailConfig;
use crate::models::Article;
use crate::utils::HttpClient;

/// Email dispatch errors
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("HTTP client error: {0}")]
    Client(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Provider rejected message ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid recipient address: {0}")]
    InvalidRecipient(String),
}

/// Aggregate result of a dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    /// Every recipient accepted
    Sent,
    /// Some recipients accepted, some failed
    PartiallySent,
    /// No recipient accepted
    Failed,
    /// No provider configured; a compose link was produced
    ComposeLink,
    /// Nothing to send (no recipients or no articles)
    Skipped,
}

impl std::fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DispatchStatus::Sent => "sent",
            DispatchStatus::PartiallySent => "partially sent",
            DispatchStatus::Failed => "failed",
            DispatchStatus::ComposeLink => "compose link",
            DispatchStatus::Skipped => "skipped",
        };
        f.write_str(label)
    }
}

/// Outcome for one recipient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipientOutcome {
    pub recipient: String,
    pub delivered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of sending one digest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub status: DispatchStatus,
    pub article_count: usize,
    pub outcomes: Vec<RecipientOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compose_link: Option<String>,
    pub message: String,
}

impl DispatchReport {
    fn skipped(article_count: usize, message: impl Into<String>) -> Self {
        Self {
            status: DispatchStatus::Skipped,
            article_count,
            outcomes: Vec::new(),
            compose_link: None,
            message: message.into(),
        }
    }

    /// Report built from per-recipient outcomes
    fn from_outcomes(article_count: usize, outcomes: Vec<RecipientOutcome>) -> Self {
        let delivered = outcomes.iter().filter(|o| o.delivered).count();
        let status = if delivered == outcomes.len() {
            DispatchStatus::Sent
        } else if delivered > 0 {
            DispatchStatus::PartiallySent
        } else {
            DispatchStatus::Failed
        };
        let message = format!(
            "Digest with {} article(s) delivered to {} of {} recipient(s)",
            article_count,
            delivered,
            outcomes.len()
        );
        Self {
            status,
            article_count,
            outcomes,
            compose_link: None,
            message,
        }
    }

    pub fn delivered_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.delivered).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.delivered).count()
    }
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: Option<String>,
}

/// Sends digests through the configured email provider
#[derive(Debug, Clone)]
pub struct Mailer {
    client: HttpClient,
    config: EmailConfig,
}

impl Mailer {
    pub fn new(config: EmailConfig) -> Result<Self, DispatchError> {
        let client = HttpClient::with_timeout(Duration::from_secs(config.timeout_seconds.max(1)))
            .map_err(|e| DispatchError::Client(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Whether a provider credential is configured
    pub fn has_provider(&self) -> bool {
        self.config
            .api_key
            .as_deref()
            .is_some_and(|k| !k.trim().is_empty())
    }

    /// Recipients from configuration
    pub fn default_recipients(&self) -> &[String] {
        &self.config.recipients
    }

    pub fn config(&self) -> &EmailConfig {
        &self.config
    }

    /// Send the digest of `articles` to each of `recipients`
    ///
    /// Never fails as a whole: problems are reported per recipient.
    pub async fn send(&self, articles: &[Article], recipients: &[String]) -> DispatchReport {
        let recipients: Vec<String> = recipients
            .iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();

        if recipients.is_empty() {
            return DispatchReport::skipped(articles.len(), "No recipients configured");
        }
        if articles.is_empty() {
            return DispatchReport::skipped(0, "No articles to send");
        }

        let body = render_text(articles);

        if !self.has_provider() {
            tracing::info!(
                recipients = recipients.len(),
                "No email provider key configured, returning compose link"
            );
            return DispatchReport {
                status: DispatchStatus::ComposeLink,
                article_count: articles.len(),
                outcomes: Vec::new(),
                compose_link: Some(compose_link(&recipients, &self.config.subject, &body)),
                message: "No email provider configured; open the compose link to send manually"
                    .to_string(),
            };
        }

        let mut outcomes = Vec::with_capacity(recipients.len());
        for recipient in recipients {
            let outcome = match self.send_one(&recipient, &body).await {
                Ok(message_id) => {
                    tracing::info!(recipient = %recipient, "Digest delivered");
                    RecipientOutcome {
                        recipient,
                        delivered: true,
                        message_id,
                        error: None,
                    }
                }
                Err(e) => {
                    tracing::warn!(recipient = %recipient, error = %e, "Digest delivery failed");
                    RecipientOutcome {
                        recipient,
                        delivered: false,
                        message_id: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            outcomes.push(outcome);
        }

        DispatchReport::from_outcomes(articles.len(), outcomes)
    }

    async fn send_one(&self, recipient: &str, body: &str) -> Result<Option<String>, DispatchError> {
        if !is_valid_address(recipient) {
            return Err(DispatchError::InvalidRecipient(recipient.to_string()));
        }

        let url = format!("{}/emails", self.config.api_url.trim_end_matches('/'));
        let payload = serde_json::json!({
            "from": self.config.from,
            "to": [recipient],
            "subject": self.config.subject,
            "text": body,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.config.api_key.as_deref().unwrap_or_default())
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&text)
                .ok()
                .and_then(|e| e.message)
                .unwrap_or(text);
            return Err(DispatchError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        Ok(serde_json::from_str::<SendResponse>(&text)
            .ok()
            .and_then(|r| r.id))
    }
}
