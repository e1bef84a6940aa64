//! Client for the external job-listings API.
//!
//! This crate provides:
//! - `ListingsClient` trait consumed by the pollers
//! - `HhClient`, the hh.ru vacancies implementation
//! - `AreaDirectory`, city name to hh.ru area code resolution

pub mod areas;
pub mod hh;
pub mod traits;

pub use areas::AreaDirectory;
pub use hh::HhClient;
pub use traits::{ListingQuery, ListingsClient, ListingsError};
