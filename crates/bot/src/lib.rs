//! Telegram command layer for jobwatch.
//!
//! Parses chat commands, applies them to the settings store and drives the
//! poller supervisor. Also owns the policy for users whose chat can no
//! longer be reached.

pub mod commands;
pub mod handler;
pub mod lifecycle;
pub mod updates;

pub use commands::{Command, CommandError};
pub use handler::CommandHandler;
pub use lifecycle::LifecycleListener;
pub use updates::{Update, UpdatePoller};
