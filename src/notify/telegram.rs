use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::MessageSender;

/// Bot API `sendMessage` with HTML parse mode. One attempt per call.
pub struct TelegramSender {
    client: Client,
    endpoint: String,
}

#[derive(serde::Deserialize)]
struct ApiReply {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramSender {
    pub fn new(token: &str, api_base: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("building telegram client")?;
        Ok(Self {
            client,
            endpoint: format!("{}/bot{token}/sendMessage", api_base.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl MessageSender for TelegramSender {
    async fn send_message(&self, chat_id: &str, html: &str) -> Result<()> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": html,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });
        let reply: ApiReply = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .context("telegram sendMessage")?
            .error_for_status()
            .context("telegram non-2xx")?
            .json()
            .await
            .context("telegram reply json")?;
        if !reply.ok {
            return Err(anyhow!(
                "telegram refused message: {}",
                reply.description.unwrap_or_default()
            ));
        }
        Ok(())
    }
}

/// Sender used when no bot token is configured: logs and drops.
pub struct DisabledSender;

#[async_trait]
impl MessageSender for DisabledSender {
    async fn send_message(&self, chat_id: &str, _html: &str) -> Result<()> {
        tracing::debug!(target: "notify", chat_id, "telegram disabled (no TELEGRAM_BOT_TOKEN)");
        Err(anyhow!("telegram sender not configured"))
    }
}
