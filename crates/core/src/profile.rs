//! User identity, search filters and polling settings.

use std::fmt;
use std::num::{IntErrorKind, ParseIntError};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Smallest polling interval a user may configure.
pub const MIN_INTERVAL_MINUTES: i64 = 5;
/// Interval used when a user never set one.
pub const DEFAULT_INTERVAL_MINUTES: i64 = 30;

/// Opaque user identity (the Telegram chat id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserKey(pub i64);

impl UserKey {
    pub fn as_i64(self) -> i64 {
        self.0
    }
}

impl fmt::Display for UserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserKey {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

// ── Polling interval ──────────────────────────────────────────

/// A validated polling interval, always at least [`MIN_INTERVAL_MINUTES`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingInterval(u32);

impl PollingInterval {
    /// Validate a user-supplied number of minutes.
    pub fn new(minutes: i64) -> Result<Self, CoreError> {
        if minutes <= 0 {
            return Err(CoreError::IntervalNotPositive(minutes));
        }
        if minutes < MIN_INTERVAL_MINUTES {
            return Err(CoreError::IntervalTooShort {
                minutes,
                min: MIN_INTERVAL_MINUTES,
            });
        }
        let minutes = u32::try_from(minutes).map_err(|_| CoreError::IntervalTooLarge {
            minutes: minutes.to_string(),
            max: u32::MAX,
        })?;
        Ok(Self(minutes))
    }

    /// Interpret a raw stored value. Missing or non-positive values fall back
    /// to `default_minutes`; positive values below the minimum are raised to it.
    pub fn from_stored(raw: Option<i64>, default_minutes: i64) -> Self {
        let minutes = match raw {
            Some(m) if m > 0 => m.max(MIN_INTERVAL_MINUTES),
            _ => default_minutes.max(MIN_INTERVAL_MINUTES),
        };
        Self(u32::try_from(minutes).unwrap_or(u32::MAX))
    }

    pub fn minutes(&self) -> u32 {
        self.0
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.0) * 60)
    }

    pub fn as_chrono(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.0))
    }
}

impl Default for PollingInterval {
    fn default() -> Self {
        Self::from_stored(None, DEFAULT_INTERVAL_MINUTES)
    }
}

impl FromStr for PollingInterval {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let minutes: i64 = trimmed.parse().map_err(|e: ParseIntError| match e.kind() {
            IntErrorKind::PosOverflow => CoreError::IntervalTooLarge {
                minutes: trimmed.to_string(),
                max: u32::MAX,
            },
            _ => CoreError::IntervalNotANumber(trimmed.to_string()),
        })?;
        Self::new(minutes)
    }
}

impl fmt::Display for PollingInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} min", self.0)
    }
}

// ── Filters ───────────────────────────────────────────────────

/// Split a comma-separated list, trimming parts and dropping empty ones.
pub fn parse_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Keyword and city filters for one user.
///
/// Keywords are stored lowercased. Cities keep their spelling but are
/// deduplicated case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filters {
    pub keywords: Vec<String>,
    pub cities: Vec<String>,
}

impl Filters {
    pub fn new<K, C>(keywords: K, cities: C) -> Self
    where
        K: IntoIterator,
        K::Item: AsRef<str>,
        C: IntoIterator,
        C::Item: AsRef<str>,
    {
        Self {
            keywords: normalize_keywords(keywords),
            cities: normalize_cities(cities),
        }
    }
}

pub fn normalize_keywords<I>(keywords: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for k in keywords {
        let k = k.as_ref().trim().to_lowercase();
        if !k.is_empty() && !out.contains(&k) {
            out.push(k);
        }
    }
    out
}

pub fn normalize_cities<I>(cities: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for c in cities {
        let c = c.as_ref().trim();
        let lower = c.to_lowercase();
        if !c.is_empty() && !out.iter().any(|o| o.to_lowercase() == lower) {
            out.push(c.to_string());
        }
    }
    out
}

// ── Profile ───────────────────────────────────────────────────

/// Everything the store knows about one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub key: UserKey,
    pub filters: Filters,
    pub interval: PollingInterval,
    pub paused: bool,
    pub disabled: bool,
    /// Start time of the last fully successful polling cycle.
    pub watermark: Option<DateTime<Utc>>,
}

impl UserProfile {
    pub fn new(key: UserKey) -> Self {
        Self {
            key,
            filters: Filters::default(),
            interval: PollingInterval::default(),
            paused: false,
            disabled: false,
            watermark: None,
        }
    }

    /// Active users get a running poller.
    pub fn is_active(&self) -> bool {
        !self.paused && !self.disabled
    }
}
