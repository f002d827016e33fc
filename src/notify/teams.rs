//! Microsoft Teams incoming-webhook notifier

use crate::error::{Error, Result};
use crate::notify::{Message, Notifier};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Office 365 connector card payload
#[derive(Serialize)]
struct MessageCard<'a> {
    #[serde(rename = "@type")]
    card_type: &'static str,
    #[serde(rename = "@context")]
    context: &'static str,
    summary: &'a str,
    #[serde(rename = "themeColor")]
    theme_color: &'a str,
    title: &'a str,
    text: String,
}

impl<'a> MessageCard<'a> {
    fn from_message(message: &'a Message) -> Self {
        Self {
            card_type: "MessageCard",
            context: "http://schema.org/extensions",
            summary: &message.title,
            theme_color: &message.color,
            title: &message.title,
            text: message.text(),
        }
    }
}

/// Posts messages to a Teams incoming webhook
pub struct TeamsNotifier {
    client: Client,
    webhook_url: String,
}

impl TeamsNotifier {
    /// Create a notifier for `webhook_url`
    pub fn new(webhook_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Notification(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            webhook_url: webhook_url.into(),
        })
    }
}

#[async_trait]
impl Notifier for TeamsNotifier {
    async fn send(&self, message: &Message) -> Result<()> {
        debug!(title = %message.title, "posting Teams message");
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&MessageCard::from_message(message))
            .send()
            .await
            .map_err(|e| Error::Notification(format!("webhook unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Notification(format!(
                "webhook answered {status}: {body}"
            )));
        }

        debug!(%status, "Teams message accepted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> Message {
        Message {
            title: "[QAS] Pipelines: 1/1 succeeded".to_string(),
            lines: vec!["✅ **front**: succeeded".to_string()],
            color: "2EB886".to_string(),
        }
    }

    #[test]
    fn test_card_shape() {
        let message = message();
        let card = serde_json::to_value(MessageCard::from_message(&message)).unwrap();
        assert_eq!(card["@type"], "MessageCard");
        assert_eq!(card["@context"], "http://schema.org/extensions");
        assert_eq!(card["themeColor"], "2EB886");
        assert_eq!(card["summary"], card["title"]);
        assert_eq!(card["text"], "✅ **front**: succeeded");
    }

    #[tokio::test]
    async fn test_post_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/webhook")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "@type": "MessageCard",
                "title": "[QAS] Pipelines: 1/1 succeeded"
            })))
            .with_status(200)
            .with_body("1")
            .create_async()
            .await;

        let notifier = TeamsNotifier::new(format!("{}/webhook", server.url())).unwrap();
        notifier.send(&message()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_post_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/webhook")
            .with_status(400)
            .with_body("Bad payload")
            .create_async()
            .await;

        let notifier = TeamsNotifier::new(format!("{}/webhook", server.url())).unwrap();
        let err = notifier.send(&message()).await.unwrap_err();
        assert!(matches!(err, Error::Notification(_)));
        assert!(err.to_string().contains("Bad payload"));
    }
}
