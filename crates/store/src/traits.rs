//! Settings store trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use jobwatch_core::{Filters, UserKey, UserProfile};

use crate::error::StoreError;

/// Trait for settings store backends.
///
/// Every operation touches a single user's keys, so pollers for different
/// users never contend. Backends must make `mark_seen` and `set_watermark`
/// atomic with respect to concurrent readers.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Add the user to the known set and clear a previous disable.
    async fn register_user(&self, user: UserKey) -> Result<(), StoreError>;

    /// Full profile, with defaults for anything never set.
    async fn get_profile(&self, user: UserKey) -> Result<UserProfile, StoreError>;

    async fn get_filters(&self, user: UserKey) -> Result<Filters, StoreError>;

    async fn set_keywords(&self, user: UserKey, keywords: &[String]) -> Result<(), StoreError>;

    async fn set_cities(&self, user: UserKey, cities: &[String]) -> Result<(), StoreError>;

    /// Raw stored interval in minutes, `None` when never set.
    async fn get_interval(&self, user: UserKey) -> Result<Option<i64>, StoreError>;

    async fn set_interval(&self, user: UserKey, minutes: u32) -> Result<(), StoreError>;

    async fn get_watermark(&self, user: UserKey) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// Store `at` unless the persisted watermark is already later.
    ///
    /// Returns whether the stored value changed.
    async fn set_watermark(&self, user: UserKey, at: DateTime<Utc>) -> Result<bool, StoreError>;

    async fn is_seen(&self, user: UserKey, posting_id: &str) -> Result<bool, StoreError>;

    /// Mark a posting as delivered to `user`; the marker expires after the
    /// backend's retention window.
    async fn mark_seen(&self, user: UserKey, posting_id: &str) -> Result<(), StoreError>;

    /// Known users that are neither paused nor disabled.
    async fn list_active_users(&self) -> Result<Vec<UserKey>, StoreError>;

    async fn pause(&self, user: UserKey) -> Result<(), StoreError>;

    async fn resume(&self, user: UserKey) -> Result<(), StoreError>;

    async fn disable(&self, user: UserKey) -> Result<(), StoreError>;
}
