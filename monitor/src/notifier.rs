//! Chat notification transport.
//!
//! This module delivers routed messages to a chat channel:
//!
//! - [`TeamsNotifier`] posts an adaptive card with `<at>` mentions to an
//!   incoming webhook.
//! - [`DryRunNotifier`] only logs, for runs without a webhook.
//!
//! Sends are best-effort: [`dispatch`] attempts every message once, in order,
//! and a failure never stops the remaining messages. Nothing is retried.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use drivewatch_monitor::notifier::{dispatch, TeamsNotifier};
//! use drivewatch_monitor::types::NotificationMessage;
//!
//! #[tokio::main]
//! async fn main() {
//!     let notifier = TeamsNotifier::new(
//!         "https://example.webhook.office.com/webhookb2/...".to_string(),
//!         Duration::from_secs(30),
//!     )
//!     .unwrap();
//!
//!     let messages = vec![NotificationMessage {
//!         actor: None,
//!         body: "🔔 **Update**".to_string(),
//!         mentions: Vec::new(),
//!     }];
//!
//!     let report = dispatch(&notifier, &messages).await;
//!     println!("sent {} / failed {}", report.sent, report.failed);
//! }
//! ```

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, StatusCode, Url};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::types::{Mention, NotificationMessage};

/// Adaptive card schema URL.
const CARD_SCHEMA: &str = "http://adaptivecards.io/schemas/adaptive-card.json";

/// Adaptive card content type.
const CARD_CONTENT_TYPE: &str = "application/vnd.microsoft.card.adaptive";

/// Adaptive card version the webhook renders.
const CARD_VERSION: &str = "1.2";

/// Errors that can occur while sending a notification.
#[derive(Error, Debug)]
pub enum NotifyError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The configured webhook URL cannot be parsed.
    #[error("invalid webhook URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    /// Webhook returned a non-success status.
    #[error("webhook rejected message: {status} - {message}")]
    Rejected { status: u16, message: String },
}

/// A chat transport.
///
/// Callers deduplicate before calling; implementations are not idempotent.
pub trait Notifier {
    /// Sends one message with the given mentions.
    fn notify(
        &self,
        message: &str,
        mentions: &[Mention],
    ) -> impl Future<Output = Result<(), NotifyError>> + Send;
}

/// Outcome of a [`dispatch`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub sent: usize,
    pub failed: usize,
}

/// Sends each message once, in order. Failures are logged and counted.
pub async fn dispatch<N: Notifier>(notifier: &N, messages: &[NotificationMessage]) -> DispatchReport {
    let mut report = DispatchReport::default();

    for message in messages {
        match notifier.notify(&message.body, &message.mentions).await {
            Ok(()) => {
                report.sent += 1;
            }
            Err(e) => {
                warn!(
                    actor = ?message.actor,
                    error = %e,
                    "Notification failed, continuing with remaining messages"
                );
                report.failed += 1;
            }
        }
    }

    report
}

/// Posts adaptive cards to an incoming webhook.
#[derive(Debug, Clone)]
pub struct TeamsNotifier {
    webhook_url: String,
    client: Client,
}

impl TeamsNotifier {
    /// Creates a notifier for the given webhook URL.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError::InvalidUrl` for an unparseable URL, or
    /// `NotifyError::Http` if the HTTP client cannot be built.
    pub fn new(webhook_url: String, timeout: Duration) -> Result<Self, NotifyError> {
        if let Err(e) = Url::parse(&webhook_url) {
            return Err(NotifyError::InvalidUrl {
                url: webhook_url,
                message: e.to_string(),
            });
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { webhook_url, client })
    }
}

impl Notifier for TeamsNotifier {
    async fn notify(&self, message: &str, mentions: &[Mention]) -> Result<(), NotifyError> {
        let payload = WebhookPayload::new(message, mentions);

        debug!(mentions = mentions.len(), "Posting notification");

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        match status {
            StatusCode::OK | StatusCode::ACCEPTED => {
                info!(status = status.as_u16(), "Notification sent");
                Ok(())
            }
            _ => {
                let message = response.text().await.unwrap_or_default();
                Err(NotifyError::Rejected {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }
}

/// Logs messages instead of sending them.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunNotifier;

impl Notifier for DryRunNotifier {
    async fn notify(&self, message: &str, mentions: &[Mention]) -> Result<(), NotifyError> {
        let names: Vec<&str> = mentions.iter().map(|m| m.display_name.as_str()).collect();
        info!(mentions = ?names, "Dry run notification:\n{message}");
        Ok(())
    }
}

/// Webhook message envelope.
#[derive(Debug, Serialize)]
struct WebhookPayload {
    #[serde(rename = "type")]
    kind: &'static str,
    attachments: Vec<Attachment>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Attachment {
    content_type: &'static str,
    content: AdaptiveCard,
}

#[derive(Debug, Serialize)]
struct AdaptiveCard {
    #[serde(rename = "$schema")]
    schema: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    version: &'static str,
    body: Vec<TextBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    msteams: Option<TeamsExtras>,
}

#[derive(Debug, Serialize)]
struct TextBlock {
    #[serde(rename = "type")]
    kind: &'static str,
    text: String,
    wrap: bool,
}

#[derive(Debug, Serialize)]
struct TeamsExtras {
    entities: Vec<MentionEntity>,
}

#[derive(Debug, Serialize)]
struct MentionEntity {
    #[serde(rename = "type")]
    kind: &'static str,
    text: String,
    mentioned: Mentioned,
}

#[derive(Debug, Serialize)]
struct Mentioned {
    id: String,
    name: String,
}

impl WebhookPayload {
    /// Builds the card. Mentions only render when their `<at>` tag appears
    /// in the text, so a mention line is appended to the message.
    fn new(message: &str, mentions: &[Mention]) -> Self {
        let mut body = vec![TextBlock {
            kind: "TextBlock",
            text: message.to_string(),
            wrap: true,
        }];

        let msteams = if mentions.is_empty() {
            None
        } else {
            let tags: Vec<String> = mentions.iter().map(mention_tag).collect();
            body.push(TextBlock {
                kind: "TextBlock",
                text: tags.join(" "),
                wrap: true,
            });
            Some(TeamsExtras {
                entities: mentions
                    .iter()
                    .map(|m| MentionEntity {
                        kind: "mention",
                        text: mention_tag(m),
                        mentioned: Mentioned {
                            id: m.id.clone(),
                            name: m.display_name.clone(),
                        },
                    })
                    .collect(),
            })
        };

        Self {
            kind: "message",
            attachments: vec![Attachment {
                content_type: CARD_CONTENT_TYPE,
                content: AdaptiveCard {
                    schema: CARD_SCHEMA,
                    kind: "AdaptiveCard",
                    version: CARD_VERSION,
                    body,
                    msteams,
                },
            }],
        }
    }
}

fn mention_tag(mention: &Mention) -> String {
    format!("<at>{}</at>", mention.display_name)
}
