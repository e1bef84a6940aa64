//! Listings client trait and shared error types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use jobwatch_core::{Candidate, Filters};

/// Errors that can occur while fetching listings.
#[derive(Debug, thiserror::Error)]
pub enum ListingsError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("listings API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode listings response: {0}")]
    Decode(String),

    #[error("listings request timed out after {0}s")]
    Timeout(u64),
}

/// One fetch request: the user's filters plus the lower time bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingQuery {
    pub keywords: Vec<String>,
    pub cities: Vec<String>,
    /// Only postings published at or after this instant.
    pub since: DateTime<Utc>,
}

impl ListingQuery {
    pub fn new(filters: &Filters, since: DateTime<Utc>) -> Self {
        Self {
            keywords: filters.keywords.clone(),
            cities: filters.cities.clone(),
            since,
        }
    }
}

/// Trait for listings API implementations.
#[async_trait]
pub trait ListingsClient: Send + Sync {
    /// Fetch candidates matching the query, most recent first.
    async fn fetch(&self, query: &ListingQuery) -> Result<Vec<Candidate>, ListingsError>;

    /// Human-readable name for this source (e.g., "hh.ru").
    fn source_name(&self) -> &str;
}
