//! Applies parsed commands to the store and the poller supervisor.

use std::sync::Arc;

use tracing::{info, warn};

use jobwatch_core::{PollingInterval, UserKey, UserProfile};
use jobwatch_scheduler::Supervisor;
use jobwatch_store::SettingsStore;

use crate::commands::{Command, CommandError};

pub const HELP_TEXT: &str = "I watch hh.ru for new vacancies and send them here.

/keywords golang,devops - what to search for
/cities Москва,Казань - where to search
/interval 30 - how often to check, in minutes (5 or more)
/pause - stop alerts
/resume - start alerts again
/status - show your settings";

/// Handles one chat message from one user and produces the reply.
pub struct CommandHandler {
    store: Arc<dyn SettingsStore>,
    supervisor: Arc<Supervisor>,
    /// Keyword searched when the user has set none.
    default_keyword: String,
}

impl CommandHandler {
    pub fn new(store: Arc<dyn SettingsStore>, supervisor: Arc<Supervisor>, default_keyword: impl Into<String>) -> Self {
        Self {
            store,
            supervisor,
            default_keyword: default_keyword.into(),
        }
    }

    /// Parse and execute `text`, always returning something to send back.
    pub async fn handle(&self, user: UserKey, text: &str) -> String {
        match self.execute(user, text).await {
            Ok(reply) => reply,
            Err(e) => {
                match &e {
                    CommandError::Store(_) => warn!(user = %user, error = %e, "Command failed"),
                    _ => info!(user = %user, error = %e, "Command rejected"),
                }
                e.reply()
            }
        }
    }

    async fn execute(&self, user: UserKey, text: &str) -> Result<String, CommandError> {
        let command: Command = text.parse()?;

        let reply = match command {
            Command::Start => {
                self.store.register_user(user).await?;
                let profile = self.store.get_profile(user).await?;
                if profile.paused {
                    format!("Welcome back! Alerts are paused, send /resume to continue.\n\n{HELP_TEXT}")
                } else {
                    self.supervisor.on_user_activated(user);
                    info!(user = %user, "User started");
                    format!("Hi! Alerts are on.\n\n{HELP_TEXT}")
                }
            }
            Command::Help => HELP_TEXT.to_string(),
            Command::Keywords(keywords) => {
                self.store.set_keywords(user, &keywords).await?;
                let filters = self.store.get_filters(user).await?;
                format!("Keywords saved: {}", filters.keywords.join(", "))
            }
            Command::Cities(cities) => {
                self.store.set_cities(user, &cities).await?;
                let filters = self.store.get_filters(user).await?;
                format!("Cities saved: {}", filters.cities.join(", "))
            }
            Command::Interval(interval) => self.set_interval(user, interval).await?,
            Command::Pause => {
                self.store.pause(user).await?;
                self.supervisor.on_user_paused(user);
                "Alerts paused. Send /resume to start them again.".to_string()
            }
            Command::Resume => {
                let profile = self.store.get_profile(user).await?;
                if profile.disabled {
                    "Alerts were switched off for this chat. Send /start to turn them back on.".to_string()
                } else {
                    self.store.register_user(user).await?;
                    self.store.resume(user).await?;
                    self.supervisor.on_user_activated(user);
                    "Alerts resumed.".to_string()
                }
            }
            Command::Status => {
                let profile = self.store.get_profile(user).await?;
                self.status(&profile)
            }
            Command::Unknown(_) => format!("Sorry, I don't know that command.\n\n{HELP_TEXT}"),
        };

        Ok(reply)
    }

    async fn set_interval(&self, user: UserKey, interval: PollingInterval) -> Result<String, CommandError> {
        self.store.set_interval(user, interval.minutes()).await?;
        let restarted = self.supervisor.on_interval_changed(user);
        info!(user = %user, interval = %interval, restarted, "Interval changed");
        Ok(format!("Checking every {} minutes from now on.", interval.minutes()))
    }

    fn status(&self, profile: &UserProfile) -> String {
        let keywords = if profile.filters.keywords.is_empty() {
            format!("{} (default)", self.default_keyword)
        } else {
            profile.filters.keywords.join(", ")
        };
        let cities = if profile.filters.cities.is_empty() {
            "default areas".to_string()
        } else {
            profile.filters.cities.join(", ")
        };
        let state = if profile.disabled {
            "off"
        } else if profile.paused {
            "paused"
        } else if self.supervisor.is_running(profile.key) {
            "on"
        } else {
            "off, send /start"
        };
        let last_check = profile
            .watermark
            .map(|at| at.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_else(|| "never".to_string());

        format!(
            "Alerts: {state}\nKeywords: {keywords}\nCities: {cities}\nInterval: {} minutes\nLast successful check: {last_check}",
            profile.interval.minutes()
        )
    }
}
