use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error};

pub const SLACK_API_BASE: &str = "https://slack.com/api";

/// Out-of-band channel for run-level failures. Delivery problems are logged, never raised.
#[async_trait]
pub trait Alerter: Send + Sync {
    async fn alert(&self, message: &str);
}

/// Used when no chat token is configured.
#[derive(Debug, Default)]
pub struct LogAlerter;

#[async_trait]
impl Alerter for LogAlerter {
    async fn alert(&self, message: &str) {
        error!(alert = true, "{message}");
    }
}

#[derive(Debug, Deserialize)]
struct SlackResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug)]
pub struct SlackAlerter {
    client: reqwest::Client,
    api_base: String,
    token: String,
    channel: String,
}

impl SlackAlerter {
    pub fn new(token: impl Into<String>, channel: impl Into<String>) -> anyhow::Result<Self> {
        Self::with_api_base(SLACK_API_BASE, token, channel)
    }

    pub fn with_api_base(
        api_base: impl Into<String>,
        token: impl Into<String>,
        channel: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("building slack client")?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
            channel: channel.into(),
        })
    }

    async fn post(&self, text: String) -> anyhow::Result<()> {
        let resp = self
            .client
            .post(format!("{}/chat.postMessage", self.api_base))
            .bearer_auth(&self.token)
            .json(&json!({ "channel": self.channel, "text": text }))
            .send()
            .await
            .context("sending slack message")?
            .error_for_status()
            .context("slack returned an error status")?;
        let body: SlackResponse = resp.json().await.context("decoding slack response")?;
        if !body.ok {
            anyhow::bail!(
                "slack rejected message: {}",
                body.error.unwrap_or_else(|| "unknown error".to_string())
            );
        }
        Ok(())
    }
}

#[async_trait]
impl Alerter for SlackAlerter {
    async fn alert(&self, message: &str) {
        if self.channel.is_empty() {
            error!("no alert channel set in config; dropping alert: {message}");
            return;
        }
        debug!(channel = %self.channel, "sending alert");
        if let Err(err) = self.post(format!(":warning_triangle: {message}")).await {
            error!("slack error: {err:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::extract::State;
    use axum::http::HeaderMap;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::Value;
    use tokio::net::TcpListener;

    type Posted = Arc<Mutex<Vec<(String, Value)>>>;

    async fn spawn_slack(reply_ok: bool) -> (String, Posted) {
        let posted: Posted = Arc::default();
        let app = Router::new()
            .route(
                "/chat.postMessage",
                post(
                    move |State(posted): State<Posted>, headers: HeaderMap, Json(body): Json<Value>| async move {
                        let auth = headers
                            .get("authorization")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or_default()
                            .to_string();
                        posted.lock().unwrap().push((auth, body));
                        Json(json!({"ok": reply_ok, "error": "channel_not_found"}))
                    },
                ),
            )
            .with_state(posted.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), posted)
    }

    #[tokio::test]
    async fn alert_posts_prefixed_message_to_channel() {
        let (base, posted) = spawn_slack(true).await;
        let alerter = SlackAlerter::with_api_base(base, "xoxb-token", "C123").unwrap();

        alerter.alert("discovery failed").await;

        let posted = posted.lock().unwrap().clone();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].0, "Bearer xoxb-token");
        assert_eq!(posted[0].1["channel"], json!("C123"));
        assert_eq!(posted[0].1["text"], json!(":warning_triangle: discovery failed"));
    }

    #[tokio::test]
    async fn rejected_or_unconfigured_alerts_do_not_panic() {
        let (base, posted) = spawn_slack(false).await;
        SlackAlerter::with_api_base(base.clone(), "t", "C1")
            .unwrap()
            .alert("x")
            .await;
        SlackAlerter::with_api_base(base, "t", "").unwrap().alert("y").await;
        assert_eq!(posted.lock().unwrap().len(), 1);
    }
}
