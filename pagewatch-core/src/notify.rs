use crate::error::{Result, WatchError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

pub const CHANGE_ALERT_SUBJECT: &str = "Website Change Alert";

/// Outbound channel for change alerts.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, recipients: &[String], subject: &str, body: &str) -> Result<()>;
}

pub fn change_alert_body(url: &str, new_value: &str) -> String {
    format!(
        "There has been a change detected on {}.\n\nNew data:\n{}",
        url, new_value
    )
}

/// Writes alerts to the log and nowhere else.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, recipients: &[String], subject: &str, body: &str) -> Result<()> {
        warn!(
            recipients = %recipients.join(", "),
            subject = subject,
            "{}",
            body
        );
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    recipients: &'a [String],
    subject: &'a str,
    body: &'a str,
}

/// POSTs each alert as JSON to a relay endpoint (mail gateway, chat hook).
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    endpoint: Url,
}

impl WebhookNotifier {
    pub fn new(endpoint: Url) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| WatchError::Notify(e.to_string()))?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, recipients: &[String], subject: &str, body: &str) -> Result<()> {
        let payload = WebhookPayload {
            recipients,
            subject,
            body,
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&payload)
            .send()
            .await
            .map_err(|e| WatchError::Notify(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(WatchError::Notify(format!(
                "webhook returned {}: {}",
                status, error_body
            )));
        }

        info!("Sent '{}' to {} recipient(s)", subject, recipients.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_json, method, path},
    };

    #[test]
    fn test_change_alert_body_mentions_url_and_value() {
        let body = change_alert_body("http://example.com/a", "abc123");
        assert!(body.contains("http://example.com/a"));
        assert!(body.ends_with("New data:\nabc123"));
    }

    #[tokio::test]
    async fn test_webhook_posts_json() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_json(serde_json::json!({
                "recipients": ["ops@example.com"],
                "subject": CHANGE_ALERT_SUBJECT,
                "body": "changed"
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock_server)
            .await;

        let endpoint = Url::parse(&format!("{}/hook", mock_server.uri())).unwrap();
        let notifier = WebhookNotifier::new(endpoint).unwrap();

        notifier
            .notify(&["ops@example.com".to_string()], CHANGE_ALERT_SUBJECT, "changed")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_webhook_error_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&mock_server)
            .await;

        let endpoint = Url::parse(&mock_server.uri()).unwrap();
        let notifier = WebhookNotifier::new(endpoint).unwrap();
        let err = notifier.notify(&[], "s", "b").await.unwrap_err();

        assert!(matches!(err, WatchError::Notify(msg) if msg.contains("502")));
    }
}
