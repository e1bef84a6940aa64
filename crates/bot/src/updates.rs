//! Telegram `getUpdates` long polling.
//!
//! Updates are buffered and handed out one at a time; the offset is moved
//! past the last update of every batch so Telegram never resends them.

use std::collections::VecDeque;

use serde::Deserialize;

use jobwatch_core::UserKey;
use jobwatch_notify::{NotifyError, TelegramNotifier};

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

impl Update {
    /// The sending chat and the message text, for text messages only.
    pub fn text_message(&self) -> Option<(UserKey, &str)> {
        let message = self.message.as_ref()?;
        let text = message.text.as_deref()?;
        Some((UserKey(message.chat.id), text))
    }
}

#[derive(Debug, Deserialize)]
struct UpdatesResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<Update>,
    #[serde(default)]
    description: Option<String>,
}

/// Pulls chat updates from the Bot API.
pub struct UpdatePoller {
    api: TelegramNotifier,
    timeout_secs: u64,
    offset: Option<i64>,
    buffer: VecDeque<Update>,
}

impl UpdatePoller {
    /// `api` must use an HTTP client whose timeout exceeds `timeout_secs`.
    pub fn new(api: TelegramNotifier, timeout_secs: u64) -> Self {
        Self {
            api,
            timeout_secs,
            offset: None,
            buffer: VecDeque::new(),
        }
    }

    pub fn offset(&self) -> Option<i64> {
        self.offset
    }

    /// Next update, long-polling when the buffer is empty. `Ok(None)` means
    /// the poll timed out with nothing new.
    pub async fn next_update(&mut self) -> Result<Option<Update>, NotifyError> {
        if let Some(update) = self.buffer.pop_front() {
            return Ok(Some(update));
        }

        let batch = self.fetch().await?;
        self.accept(batch);
        Ok(self.buffer.pop_front())
    }

    async fn fetch(&self) -> Result<Vec<Update>, NotifyError> {
        let mut params = serde_json::json!({
            "timeout": self.timeout_secs,
            "allowed_updates": ["message"],
        });
        if let Some(offset) = self.offset {
            params["offset"] = serde_json::Value::from(offset);
        }

        let response: UpdatesResponse = self
            .api
            .http()
            .post(self.api.method_url("getUpdates"))
            .json(&params)
            .send()
            .await?
            .json()
            .await?;

        if !response.ok {
            return Err(NotifyError::Api(
                response
                    .description
                    .unwrap_or_else(|| "getUpdates failed".to_string()),
            ));
        }
        Ok(response.result)
    }

    fn accept(&mut self, batch: Vec<Update>) {
        if let Some(last) = batch.last() {
            self.offset = Some(last.update_id + 1);
        }
        self.buffer.extend(batch);
        tracing::debug!(buffered = self.buffer.len(), offset = ?self.offset, "Received updates");
    }
}
