//! Redis-backed settings store.
//!
//! Key layout:
//! - `users`: set of every known user id
//! - `user:{id}:keywords`, `user:{id}:cities`: comma-separated filters
//! - `user:{id}:interval`: polling interval in minutes
//! - `user:{id}:paused`, `user:{id}:disabled`: `"1"` when set
//! - `user:{id}:watermark`: epoch milliseconds, only ever raised
//! - `seen:{id}:{posting}`: seen marker with a TTL of the retention window

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use jobwatch_core::{normalize_cities, normalize_keywords, Filters, PollingInterval, UserKey, UserProfile};

use crate::error::StoreError;
use crate::memory::DEFAULT_SEEN_RETENTION;
use crate::traits::SettingsStore;

const USERS_KEY: &str = "users";
const FLAG_SET: &str = "1";

/// Raise the watermark only when the new value is later.
const SET_WATERMARK_SCRIPT: &str = r#"
local current = tonumber(redis.call('GET', KEYS[1]))
local proposed = tonumber(ARGV[1])
if current == nil or current < proposed then
    redis.call('SET', KEYS[1], ARGV[1])
    return 1
end
return 0
"#;

fn user_field(user: UserKey, field: &str) -> String {
    format!("user:{}:{}", user, field)
}

fn seen_key(user: UserKey, posting_id: &str) -> String {
    format!("seen:{}:{}", user, posting_id)
}

fn split_csv(raw: Option<String>) -> Vec<String> {
    raw.map(|s| jobwatch_core::parse_csv(&s)).unwrap_or_default()
}

fn parse_interval(user: UserKey, raw: Option<String>) -> Option<i64> {
    let raw = raw?;
    match raw.trim().parse::<i64>() {
        Ok(minutes) => Some(minutes),
        Err(_) => {
            warn!(user = %user, value = %raw, "Ignoring unparseable stored interval");
            None
        }
    }
}

fn parse_watermark(key: &str, raw: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let corrupt = || StoreError::Corrupt {
        key: key.to_string(),
        value: raw.clone(),
    };
    let millis: i64 = raw.trim().parse().map_err(|_| corrupt())?;
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(Some)
        .ok_or_else(corrupt)
}

/// Settings store over a multiplexed Redis connection.
///
/// The connection is cloned per call; clones share one socket.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
    seen_retention: Duration,
    default_interval_minutes: i64,
}

impl RedisStore {
    /// Connect and verify the server answers `PING`.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(|e| StoreError::Connection(e.to_string()))?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        info!(reply = %pong, "Connected to Redis");

        Ok(Self {
            conn,
            seen_retention: DEFAULT_SEEN_RETENTION,
            default_interval_minutes: jobwatch_core::DEFAULT_INTERVAL_MINUTES,
        })
    }

    pub fn with_seen_retention(mut self, retention: Duration) -> Self {
        self.seen_retention = retention;
        self
    }

    pub fn with_default_interval(mut self, minutes: i64) -> Self {
        self.default_interval_minutes = minutes;
        self
    }

    fn conn(&self) -> MultiplexedConnection {
        self.conn.clone()
    }

    async fn flag(&self, user: UserKey, field: &str) -> Result<bool, StoreError> {
        let value: Option<String> = self.conn().get(user_field(user, field)).await?;
        Ok(value.as_deref() == Some(FLAG_SET))
    }

    async fn set_flag(&self, user: UserKey, field: &str, on: bool) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let key = user_field(user, field);
        if on {
            conn.set::<_, _, ()>(key, FLAG_SET).await?;
        } else {
            conn.del::<_, ()>(key).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for RedisStore {
    async fn register_user(&self, user: UserKey) -> Result<(), StoreError> {
        self.conn().sadd::<_, _, ()>(USERS_KEY, user.as_i64()).await?;
        self.set_flag(user, "disabled", false).await
    }

    async fn get_profile(&self, user: UserKey) -> Result<UserProfile, StoreError> {
        let filters = self.get_filters(user).await?;
        let interval = self.get_interval(user).await?;
        let watermark = self.get_watermark(user).await?;
        Ok(UserProfile {
            key: user,
            filters,
            interval: PollingInterval::from_stored(interval, self.default_interval_minutes),
            paused: self.flag(user, "paused").await?,
            disabled: self.flag(user, "disabled").await?,
            watermark,
        })
    }

    async fn get_filters(&self, user: UserKey) -> Result<Filters, StoreError> {
        let (keywords, cities): (Option<String>, Option<String>) = self
            .conn()
            .mget(&[user_field(user, "keywords"), user_field(user, "cities")])
            .await?;
        Ok(Filters {
            keywords: split_csv(keywords),
            cities: split_csv(cities),
        })
    }

    async fn set_keywords(&self, user: UserKey, keywords: &[String]) -> Result<(), StoreError> {
        let value = normalize_keywords(keywords).join(",");
        self.conn().set::<_, _, ()>(user_field(user, "keywords"), value).await?;
        Ok(())
    }

    async fn set_cities(&self, user: UserKey, cities: &[String]) -> Result<(), StoreError> {
        let value = normalize_cities(cities).join(",");
        self.conn().set::<_, _, ()>(user_field(user, "cities"), value).await?;
        Ok(())
    }

    async fn get_interval(&self, user: UserKey) -> Result<Option<i64>, StoreError> {
        let raw: Option<String> = self.conn().get(user_field(user, "interval")).await?;
        Ok(parse_interval(user, raw))
    }

    async fn set_interval(&self, user: UserKey, minutes: u32) -> Result<(), StoreError> {
        self.conn()
            .set::<_, _, ()>(user_field(user, "interval"), minutes.to_string())
            .await?;
        Ok(())
    }

    async fn get_watermark(&self, user: UserKey) -> Result<Option<DateTime<Utc>>, StoreError> {
        let key = user_field(user, "watermark");
        let raw: Option<String> = self.conn().get(&key).await?;
        parse_watermark(&key, raw)
    }

    async fn set_watermark(&self, user: UserKey, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut conn = self.conn();
        let changed: i64 = redis::Script::new(SET_WATERMARK_SCRIPT)
            .key(user_field(user, "watermark"))
            .arg(at.timestamp_millis())
            .invoke_async(&mut conn)
            .await?;
        if changed == 0 {
            debug!(user = %user, at = %at, "Stored watermark is already later");
        }
        Ok(changed == 1)
    }

    async fn is_seen(&self, user: UserKey, posting_id: &str) -> Result<bool, StoreError> {
        let exists: bool = self.conn().exists(seen_key(user, posting_id)).await?;
        Ok(exists)
    }

    async fn mark_seen(&self, user: UserKey, posting_id: &str) -> Result<(), StoreError> {
        self.conn()
            .set_ex::<_, _, ()>(seen_key(user, posting_id), FLAG_SET, self.seen_retention.as_secs().max(1))
            .await?;
        Ok(())
    }

    async fn list_active_users(&self) -> Result<Vec<UserKey>, StoreError> {
        let mut conn = self.conn();
        let mut ids: Vec<i64> = conn.smembers(USERS_KEY).await?;
        ids.sort_unstable();

        let mut active = Vec::with_capacity(ids.len());
        for id in ids {
            let user = UserKey(id);
            let (paused, disabled): (Option<String>, Option<String>) = conn
                .mget(&[user_field(user, "paused"), user_field(user, "disabled")])
                .await?;
            if paused.as_deref() != Some(FLAG_SET) && disabled.as_deref() != Some(FLAG_SET) {
                active.push(user);
            }
        }
        Ok(active)
    }

    async fn pause(&self, user: UserKey) -> Result<(), StoreError> {
        self.set_flag(user, "paused", true).await
    }

    async fn resume(&self, user: UserKey) -> Result<(), StoreError> {
        self.set_flag(user, "paused", false).await
    }

    async fn disable(&self, user: UserKey) -> Result<(), StoreError> {
        self.set_flag(user, "disabled", true).await
    }
}
