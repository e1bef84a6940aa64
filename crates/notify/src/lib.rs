//! Delivery of job alerts to users.
//!
//! This crate provides:
//! - `Notifier` trait for pluggable delivery channels
//! - Telegram Bot API notifier
//! - Minijinja rendering of vacancy and status messages

pub mod telegram;
pub mod templating;
pub mod traits;

pub use telegram::TelegramNotifier;
pub use templating::MessageRenderer;
pub use traits::{MessageFormat, Notification, Notifier, NotifyError};
