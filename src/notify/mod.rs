//! Notification Dispatcher: rendering, the outbound send seam, and the
//! per-subscriber broadcast loop.

pub mod dispatch;
pub mod render;
pub mod telegram;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Mutex;

pub use dispatch::{BroadcastReport, Dispatcher};
pub use render::{render, render_list};
pub use telegram::TelegramSender;

/// Message language. `Both` puts the English block first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    En,
    Zh,
    #[default]
    Both,
}

impl Lang {
    pub fn parse(raw: &str) -> Option<Lang> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "en" | "english" => Some(Lang::En),
            "zh" | "cn" | "chinese" => Some(Lang::Zh),
            "both" | "bi" | "bilingual" => Some(Lang::Both),
            _ => None,
        }
    }
}

#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Deliver one HTML message to one chat.
    async fn send_message(&self, chat_id: &str, html: &str) -> Result<()>;
}

/// In-memory sender for tests and demos; records every delivered message and
/// fails for chats registered with `fail_for`.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<(String, String)>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, chat_id: &str) {
        if let Ok(mut f) = self.failing.lock() {
            f.insert(chat_id.to_string());
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send_message(&self, chat_id: &str, html: &str) -> Result<()> {
        let fails = self
            .failing
            .lock()
            .map(|f| f.contains(chat_id))
            .unwrap_or(false);
        if fails {
            return Err(anyhow!("simulated send failure for chat {chat_id}"));
        }
        self.sent
            .lock()
            .map_err(|_| anyhow!("recording sender poisoned"))?
            .push((chat_id.to_string(), html.to_string()));
        Ok(())
    }
}
