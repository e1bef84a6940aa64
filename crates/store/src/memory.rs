//! In-process settings store.
//!
//! Same semantics as the Redis backend, held in a `std::sync::Mutex`. Used by
//! tests across the workspace and by `jobwatch --memory-store`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::Instant;

use jobwatch_core::{normalize_cities, normalize_keywords, Filters, PollingInterval, UserKey, UserProfile};

use crate::error::StoreError;
use crate::traits::SettingsStore;

/// Default lifetime of a seen marker (7 days).
pub const DEFAULT_SEEN_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Default, Clone)]
struct UserRecord {
    registered: bool,
    keywords: Vec<String>,
    cities: Vec<String>,
    interval: Option<i64>,
    paused: bool,
    disabled: bool,
    watermark: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct State {
    users: BTreeMap<UserKey, UserRecord>,
    /// (user, posting id) → expiry.
    seen: HashMap<(UserKey, String), Instant>,
}

#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<State>,
    seen_retention: Duration,
    default_interval_minutes: i64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_SEEN_RETENTION)
    }

    pub fn with_retention(seen_retention: Duration) -> Self {
        Self {
            state: Mutex::new(State::default()),
            seen_retention,
            default_interval_minutes: jobwatch_core::DEFAULT_INTERVAL_MINUTES,
        }
    }

    /// Store a raw interval, bypassing validation. Test helper for stores
    /// written by older or foreign clients.
    pub fn set_raw_interval(&self, user: UserKey, minutes: Option<i64>) {
        let mut state = self.lock();
        state.users.entry(user).or_default().interval = minutes;
    }

    /// Number of unexpired seen markers for `user`.
    pub fn seen_count(&self, user: UserKey) -> usize {
        let now = Instant::now();
        self.lock()
            .seen
            .iter()
            .filter(|((u, _), expiry)| *u == user && **expiry > now)
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // Poisoning only means a holder panicked; every update is a single
        // field write, so the maps stay consistent.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn register_user(&self, user: UserKey) -> Result<(), StoreError> {
        let mut state = self.lock();
        let record = state.users.entry(user).or_default();
        record.registered = true;
        record.disabled = false;
        Ok(())
    }

    async fn get_profile(&self, user: UserKey) -> Result<UserProfile, StoreError> {
        let state = self.lock();
        let record = state.users.get(&user).cloned().unwrap_or_default();
        Ok(UserProfile {
            key: user,
            filters: Filters {
                keywords: record.keywords,
                cities: record.cities,
            },
            interval: PollingInterval::from_stored(record.interval, self.default_interval_minutes),
            paused: record.paused,
            disabled: record.disabled,
            watermark: record.watermark,
        })
    }

    async fn get_filters(&self, user: UserKey) -> Result<Filters, StoreError> {
        let state = self.lock();
        Ok(state
            .users
            .get(&user)
            .map(|r| Filters {
                keywords: r.keywords.clone(),
                cities: r.cities.clone(),
            })
            .unwrap_or_default())
    }

    async fn set_keywords(&self, user: UserKey, keywords: &[String]) -> Result<(), StoreError> {
        self.lock().users.entry(user).or_default().keywords = normalize_keywords(keywords);
        Ok(())
    }

    async fn set_cities(&self, user: UserKey, cities: &[String]) -> Result<(), StoreError> {
        self.lock().users.entry(user).or_default().cities = normalize_cities(cities);
        Ok(())
    }

    async fn get_interval(&self, user: UserKey) -> Result<Option<i64>, StoreError> {
        Ok(self.lock().users.get(&user).and_then(|r| r.interval))
    }

    async fn set_interval(&self, user: UserKey, minutes: u32) -> Result<(), StoreError> {
        self.lock().users.entry(user).or_default().interval = Some(i64::from(minutes));
        Ok(())
    }

    async fn get_watermark(&self, user: UserKey) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self.lock().users.get(&user).and_then(|r| r.watermark))
    }

    async fn set_watermark(&self, user: UserKey, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut state = self.lock();
        let record = state.users.entry(user).or_default();
        match record.watermark {
            Some(current) if current >= at => Ok(false),
            _ => {
                record.watermark = Some(at);
                Ok(true)
            }
        }
    }

    async fn is_seen(&self, user: UserKey, posting_id: &str) -> Result<bool, StoreError> {
        let mut state = self.lock();
        let key = (user, posting_id.to_string());
        match state.seen.get(&key) {
            Some(expiry) if *expiry > Instant::now() => Ok(true),
            Some(_) => {
                state.seen.remove(&key);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn mark_seen(&self, user: UserKey, posting_id: &str) -> Result<(), StoreError> {
        let expiry = Instant::now() + self.seen_retention;
        self.lock().seen.insert((user, posting_id.to_string()), expiry);
        Ok(())
    }

    async fn list_active_users(&self) -> Result<Vec<UserKey>, StoreError> {
        Ok(self
            .lock()
            .users
            .iter()
            .filter(|(_, r)| r.registered && !r.paused && !r.disabled)
            .map(|(k, _)| *k)
            .collect())
    }

    async fn pause(&self, user: UserKey) -> Result<(), StoreError> {
        self.lock().users.entry(user).or_default().paused = true;
        Ok(())
    }

    async fn resume(&self, user: UserKey) -> Result<(), StoreError> {
        self.lock().users.entry(user).or_default().paused = false;
        Ok(())
    }

    async fn disable(&self, user: UserKey) -> Result<(), StoreError> {
        self.lock().users.entry(user).or_default().disabled = true;
        Ok(())
    }
}
