//! Notifier trait definition and shared error types.

use jobwatch_core::UserKey;

/// Errors that can occur during notification delivery.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Template rendering failed: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// The chat will never accept messages again (bot blocked, chat deleted).
    #[error("Recipient unreachable: {0}")]
    Blocked(String),

    #[error("API error: {0}")]
    Api(String),
}

impl NotifyError {
    /// Whether retrying the same delivery can ever succeed.
    pub fn is_permanent(&self) -> bool {
        matches!(self, NotifyError::Blocked(_))
    }
}

/// How the message body should be interpreted by the chat transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum MessageFormat {
    Plain,
    MarkdownV2,
}

/// A rendered notification ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Notification {
    pub body: String,
    pub format: MessageFormat,
}

impl Notification {
    pub fn plain(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            format: MessageFormat::Plain,
        }
    }

    pub fn markdown(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            format: MessageFormat::MarkdownV2,
        }
    }
}

/// Trait for notification channel implementations.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a notification to one user's chat.
    async fn send(&self, user: UserKey, notification: &Notification) -> Result<(), NotifyError>;

    /// Human-readable name for this channel (e.g., "telegram").
    fn channel_name(&self) -> &str;
}
