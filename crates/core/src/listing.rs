use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A posting returned by the listings API for one fetch call.
///
/// Only its `id` outlives the cycle, as a seen marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub title: String,
    pub location: String,
    pub published_at: Option<DateTime<Utc>>,
    pub url: String,
}

impl Candidate {
    pub fn new(id: impl Into<String>, title: impl Into<String>, location: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            url: format!("https://hh.ru/vacancy/{id}"),
            id,
            title: title.into(),
            location: location.into(),
            published_at: None,
        }
    }
}
