//! Chat webhook notification sinks.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use shipyard_core::{CapabilityError, CapabilityResult, Notification, NotificationSink};

const USER_AGENT: &str = concat!("shipyard/", env!("CARGO_PKG_VERSION"));

/// Slack-compatible incoming-webhook body.
#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<&'a str>,
}

/// Posts the run notification to an incoming webhook.
///
/// The URL usually embeds a token, so it is never included in errors.
pub struct WebhookNotifier {
    url: String,
    http_client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> CapabilityResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| CapabilityError::Http(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            url: url.into(),
            http_client,
        })
    }
}

impl std::fmt::Debug for WebhookNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookNotifier").finish_non_exhaustive()
    }
}

#[async_trait]
impl NotificationSink for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> CapabilityResult<()> {
        let payload = WebhookPayload {
            text: notification.text(),
            channel: notification.channel.as_deref(),
        };

        let response = self
            .http_client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                CapabilityError::Http(format!("webhook request failed: {}", e.without_url()))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CapabilityError::Http(format!(
                "webhook returned {status}: {}",
                body.trim()
            )));
        }
        Ok(())
    }
}

/// Sink used when no webhook is configured: logs the message instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl NotificationSink for NoopNotifier {
    async fn send(&self, notification: &Notification) -> CapabilityResult<()> {
        info!(
            run_id = %notification.run_id,
            status = notification.status.as_str(),
            "No notification sink configured"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipyard_core::{MirrorOutcome, RunStatus};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn notification(channel: Option<&str>) -> Notification {
        Notification {
            run_id: "run-1".to_string(),
            status: RunStatus::Success,
            reference: "master".to_string(),
            commit: "abc123".to_string(),
            actor: None,
            environment: Some("production".to_string()),
            tag: Some("abc123".to_string()),
            images: vec![],
            manifest: None,
            mirror: MirrorOutcome::Skipped {
                reason: "no mirror configured".to_string(),
            },
            error: None,
            duration_ms: 10,
            channel: channel.map(String::from),
        }
    }

    /// Serve one HTTP request with `status_line`; the handle yields the request body.
    async fn serve_once(status_line: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/hooks/T000/SECRET", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request).to_string();
                if let Some(split) = text.find("\r\n\r\n") {
                    let length = text[..split]
                        .lines()
                        .find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if request.len() >= split + 4 + length || n == 0 {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            let response =
                format!("{status_line}\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok");
            socket.write_all(response.as_bytes()).await.unwrap();
            let text = String::from_utf8_lossy(&request).to_string();
            text.split_once("\r\n\r\n")
                .map(|(_, body)| body.to_string())
                .unwrap_or_default()
        });
        (url, handle)
    }

    #[tokio::test]
    async fn test_posts_text_and_channel() {
        let (url, server) = serve_once("HTTP/1.1 200 OK").await;
        WebhookNotifier::new(url)
            .unwrap()
            .send(&notification(Some("#deploys")))
            .await
            .unwrap();

        let body: serde_json::Value = serde_json::from_str(&server.await.unwrap()).unwrap();
        assert_eq!(body["channel"], "#deploys");
        assert!(body["text"].as_str().unwrap().contains("deploy success to *production*"));
    }

    #[tokio::test]
    async fn test_channel_omitted_when_unset() {
        let (url, server) = serve_once("HTTP/1.1 200 OK").await;
        WebhookNotifier::new(url)
            .unwrap()
            .send(&notification(None))
            .await
            .unwrap();

        let body: serde_json::Value = serde_json::from_str(&server.await.unwrap()).unwrap();
        assert!(body.get("channel").is_none());
    }

    #[tokio::test]
    async fn test_error_status_is_http_error_without_url() {
        let (url, _server) = serve_once("HTTP/1.1 500 Internal Server Error").await;
        let err = WebhookNotifier::new(url)
            .unwrap()
            .send(&notification(None))
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("500"));
        assert!(!message.contains("SECRET"));
    }

    #[tokio::test]
    async fn test_unreachable_webhook_does_not_leak_url() {
        // bind then drop to get a closed port
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = WebhookNotifier::new(format!("http://{addr}/hooks/SECRET"))
            .unwrap()
            .send(&notification(None))
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::Http(_)));
        assert!(!err.to_string().contains("SECRET"));
    }

    #[tokio::test]
    async fn test_noop_notifier_succeeds() {
        NoopNotifier.send(&notification(None)).await.unwrap();
    }
}
