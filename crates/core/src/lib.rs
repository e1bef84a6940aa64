pub mod config;
pub mod error;
pub mod listing;
pub mod profile;

pub use config::Config;
pub use error::*;
pub use listing::*;
pub use profile::*;
