//! Telegram Bot API notifier with MarkdownV2 formatting.
//!
//! Delivers notifications via the Telegram Bot API `sendMessage` endpoint.
//! Supports MarkdownV2 formatting, rate limit handling, and recognizes the
//! error descriptions that mean a chat is gone for good.

use jobwatch_core::UserKey;

use crate::traits::{MessageFormat, Notification, Notifier, NotifyError};

/// `sendMessage` error descriptions after which a chat never accepts messages.
const UNREACHABLE_CHAT_ERRORS: [&str; 10] = [
    "Bad Request: chat not found",
    "Bad Request: have no rights to send a message",
    "Forbidden: bot is not a member of the channel chat",
    "Forbidden: bot is not a member of the supergroup chat",
    "Forbidden: bot was blocked by the user",
    "Forbidden: bot was kicked from the channel chat",
    "Forbidden: bot was kicked from the group chat",
    "Forbidden: bot was kicked from the supergroup chat",
    "Forbidden: the group chat was deleted",
    "Forbidden: user is deactivated",
];

/// Escapes special characters for Telegram MarkdownV2 parse mode.
///
/// Telegram requires these characters to be escaped with a preceding backslash
/// when using MarkdownV2: `_`, `*`, `[`, `]`, `(`, `)`, `~`, `` ` ``, `>`,
/// `#`, `+`, `-`, `=`, `|`, `{`, `}`, `.`, `!`
pub fn escape_markdown_v2(text: &str) -> String {
    let special = ['_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!', '\\'];
    let mut result = String::with_capacity(text.len() * 2);
    for ch in text.chars() {
        if special.contains(&ch) {
            result.push('\\');
        }
        result.push(ch);
    }
    result
}

/// Escapes the URL part of a MarkdownV2 inline link, where only `)` and `\`
/// are special.
pub fn escape_markdown_v2_url(url: &str) -> String {
    let mut result = String::with_capacity(url.len());
    for ch in url.chars() {
        if ch == ')' || ch == '\\' {
            result.push('\\');
        }
        result.push(ch);
    }
    result
}

fn is_unreachable_chat(description: &str) -> bool {
    UNREACHABLE_CHAT_ERRORS
        .iter()
        .any(|known| description.contains(known))
}

/// Sends notifications via the Telegram Bot API.
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    bot_token: String,
    api_url: String,
    client: reqwest::Client,
}

impl TelegramNotifier {
    /// Creates a new `TelegramNotifier` from configuration values.
    ///
    /// If `bot_token` starts with `${`, the value between `${` and `}` is
    /// resolved as an environment variable name. Returns
    /// [`NotifyError::Config`] if the token is empty or the env var is missing.
    pub fn from_config(
        bot_token: String,
        api_url: String,
        client: reqwest::Client,
    ) -> Result<Self, NotifyError> {
        let resolved_token = if bot_token.starts_with("${") {
            let var_name = bot_token
                .strip_prefix("${")
                .and_then(|s| s.strip_suffix('}'))
                .ok_or_else(|| {
                    NotifyError::Config(format!(
                        "Malformed env var reference: {bot_token}"
                    ))
                })?;
            std::env::var(var_name).map_err(|_| {
                NotifyError::Config(format!(
                    "Environment variable '{var_name}' is not set"
                ))
            })?
        } else {
            bot_token
        };

        if resolved_token.is_empty() {
            return Err(NotifyError::Config(
                "Telegram bot token must not be empty".to_string(),
            ));
        }

        Ok(Self {
            bot_token: resolved_token,
            api_url: api_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Full URL of a Bot API method.
    pub fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.bot_token, method)
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.client
    }

    fn request_body(user: UserKey, notification: &Notification) -> serde_json::Value {
        let mut body = serde_json::json!({
            "chat_id": user.as_i64(),
            "text": notification.body,
            "disable_web_page_preview": true,
        });
        if notification.format == MessageFormat::MarkdownV2 {
            body["parse_mode"] = serde_json::Value::String("MarkdownV2".to_string());
        }
        body
    }

    fn classify_failure(status: reqwest::StatusCode, resp_body: &serde_json::Value) -> NotifyError {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp_body
                .get("parameters")
                .and_then(|p| p.get("retry_after"))
                .and_then(|v| v.as_u64())
                .unwrap_or(30);
            return NotifyError::RateLimited {
                retry_after_secs: retry_after,
            };
        }

        let description = resp_body
            .get("description")
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown Telegram API error");

        if status == reqwest::StatusCode::FORBIDDEN || is_unreachable_chat(description) {
            return NotifyError::Blocked(description.to_string());
        }

        NotifyError::Api(format!("Telegram API error: {description}"))
    }
}

#[async_trait::async_trait]
impl Notifier for TelegramNotifier {
    /// Sends a notification via the Telegram `sendMessage` API.
    async fn send(&self, user: UserKey, notification: &Notification) -> Result<(), NotifyError> {
        let body = Self::request_body(user, notification);

        tracing::debug!(
            chat_id = %user,
            format = ?notification.format,
            "Sending Telegram notification"
        );

        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let resp_body: serde_json::Value = response.json().await?;

        if resp_body.get("ok") == Some(&serde_json::Value::Bool(true)) {
            tracing::debug!(chat_id = %user, "Telegram notification sent");
            return Ok(());
        }

        Err(Self::classify_failure(status, &resp_body))
    }

    /// Returns the channel name for this notifier.
    fn channel_name(&self) -> &str {
        "telegram"
    }
}
