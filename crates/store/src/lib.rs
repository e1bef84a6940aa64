//! Persistent per-user settings and seen-posting markers.
//!
//! This crate provides:
//! - `SettingsStore` trait consumed by the scheduler and the command layer
//! - `RedisStore`, the production backend
//! - `MemoryStore`, an in-process backend for tests and local runs

pub mod error;
pub mod memory;
pub mod redis_store;
pub mod traits;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use traits::SettingsStore;
