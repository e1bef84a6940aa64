use std::env;

use serde::{Deserialize, Serialize};

use crate::profile::{parse_csv, DEFAULT_INTERVAL_MINUTES};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Like `profiled_env_u64`, but zero is rejected in favour of `default`.
fn profiled_env_nonzero_u64(profile: &str, key: &str, default: u64) -> u64 {
    match profiled_env_u64(profile, key, default) {
        0 => {
            tracing::warn!(key, default, "Zero is not allowed here, using the default");
            default
        }
        v => v,
    }
}

fn profiled_env_i64(profile: &str, key: &str, default: i64) -> i64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    match profiled_env_opt(profile, key).as_deref().map(str::to_lowercase).as_deref() {
        Some("1" | "true" | "yes" | "on") => true,
        Some("0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub telegram: TelegramConfig,
    pub redis: RedisConfig,
    pub listings: ListingsConfig,
    pub scheduler: SchedulerConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `JOBWATCH_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("JOBWATCH_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            telegram: TelegramConfig::from_env_profiled(p),
            redis: RedisConfig::from_env_profiled(p),
            listings: ListingsConfig::from_env_profiled(p),
            scheduler: SchedulerConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  telegram:   api={}, token={}",
            self.telegram.api_url,
            if self.telegram.is_configured() { "set" } else { "(none)" }
        );
        tracing::info!("  redis:      addr={}, db={}", self.redis.addr, self.redis.db);
        tracing::info!(
            "  listings:   api={}, timeout={}s, default_areas={:?}",
            self.listings.api_url,
            self.listings.request_timeout_secs,
            self.listings.default_areas
        );
        tracing::info!(
            "  scheduler:  default_interval={}m, fetch_timeout={}s, seen_retention={}d, notify_empty={}, vacancy_template={}",
            self.scheduler.default_interval_minutes,
            self.scheduler.fetch_timeout_secs,
            self.scheduler.seen_retention_days,
            self.scheduler.notify_when_empty,
            if self.scheduler.vacancy_template.is_some() { "custom" } else { "built-in" }
        );
    }
}

// ── Telegram ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
    pub api_url: String,
    /// Long-poll timeout passed to `getUpdates`.
    pub poll_timeout_secs: u64,
}

impl TelegramConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            bot_token: profiled_env_opt(p, "TELEGRAM_BOT_TOKEN"),
            api_url: profiled_env_or(p, "TELEGRAM_API_URL", "https://api.telegram.org"),
            poll_timeout_secs: profiled_env_u64(p, "TELEGRAM_POLL_TIMEOUT_SECS", 30),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.bot_token.is_some()
    }
}

// ── Redis ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub addr: String,
    pub password: Option<String>,
    pub db: i64,
}

impl RedisConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            addr: profiled_env_or(p, "REDIS_ADDR", "127.0.0.1:6379"),
            password: profiled_env_opt(p, "REDIS_PASSWORD"),
            db: profiled_env_i64(p, "REDIS_DB", 0),
        }
    }

    pub fn connection_url(&self) -> String {
        match &self.password {
            Some(pass) => format!("redis://:{}@{}/{}", pass, self.addr, self.db),
            None => format!("redis://{}/{}", self.addr, self.db),
        }
    }
}

// ── Listings API (hh.ru) ──────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingsConfig {
    pub api_url: String,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    pub per_page: u32,
    /// Search text used when a user has no keywords.
    pub default_keyword: String,
    /// Area codes queried when none of the user's cities resolve.
    pub default_areas: Vec<String>,
}

impl ListingsConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            api_url: profiled_env_or(p, "HH_API_URL", "https://api.hh.ru"),
            user_agent: profiled_env_or(p, "HH_USER_AGENT", "jobwatch-bot/0.1"),
            request_timeout_secs: profiled_env_u64(p, "HH_REQUEST_TIMEOUT_SECS", 10),
            per_page: profiled_env_u64(p, "HH_PER_PAGE", 20) as u32,
            default_keyword: profiled_env_or(p, "HH_DEFAULT_KEYWORD", "golang"),
            default_areas: parse_csv(&profiled_env_or(p, "HH_DEFAULT_AREAS", "1,2")),
        }
    }
}

impl Default for ListingsConfig {
    fn default() -> Self {
        Self::from_env_profiled("")
    }
}

// ── Scheduler ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub default_interval_minutes: i64,
    pub fetch_timeout_secs: u64,
    pub seen_retention_days: u64,
    /// Tell the user when a cycle found nothing.
    pub notify_when_empty: bool,
    /// Replaces the built-in vacancy message template when set.
    #[serde(default)]
    pub vacancy_template: Option<String>,
}

impl SchedulerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            default_interval_minutes: profiled_env_i64(
                p,
                "JOBWATCH_DEFAULT_INTERVAL_MINUTES",
                DEFAULT_INTERVAL_MINUTES,
            ),
            fetch_timeout_secs: profiled_env_nonzero_u64(p, "JOBWATCH_FETCH_TIMEOUT_SECS", 10),
            seen_retention_days: profiled_env_nonzero_u64(p, "JOBWATCH_SEEN_RETENTION_DAYS", 7),
            notify_when_empty: profiled_env_bool(p, "JOBWATCH_NOTIFY_EMPTY", true),
            vacancy_template: profiled_env_opt(p, "JOBWATCH_VACANCY_TEMPLATE"),
        }
    }

    /// How long seen markers live. Never shorter than one day.
    pub fn seen_retention(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.seen_retention_days.max(1) * 24 * 60 * 60)
    }

    /// Never shorter than one second.
    pub fn fetch_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.fetch_timeout_secs.max(1))
    }
}
