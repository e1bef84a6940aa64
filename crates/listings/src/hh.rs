//! hh.ru vacancies client.
//!
//! Builds a `GET /vacancies` query from the user's filters:
//! - keywords are lowercased and OR-joined into `text`
//! - each resolvable city adds an `area` code; when none resolve the
//!   configured default areas are used
//! - `date_from` carries the watermark so only newer postings come back

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;

use jobwatch_core::config::ListingsConfig;
use jobwatch_core::Candidate;

use crate::areas::AreaDirectory;
use crate::traits::{ListingQuery, ListingsClient, ListingsError};

#[derive(Debug, Deserialize)]
struct VacanciesResponse {
    #[serde(default)]
    items: Vec<Vacancy>,
}

#[derive(Debug, Deserialize)]
struct Vacancy {
    id: String,
    name: String,
    area: VacancyArea,
    published_at: Option<String>,
    alternate_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VacancyArea {
    name: String,
}

impl From<Vacancy> for Candidate {
    fn from(v: Vacancy) -> Self {
        let url = v
            .alternate_url
            .unwrap_or_else(|| format!("https://hh.ru/vacancy/{}", v.id));
        Candidate {
            published_at: v.published_at.as_deref().and_then(parse_published_at),
            id: v.id,
            title: v.name,
            location: v.area.name,
            url,
        }
    }
}

/// hh.ru timestamps look like `2024-05-01T10:15:00+0300`.
fn parse_published_at(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z")
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// Fetches vacancies from the hh.ru public API.
#[derive(Debug, Clone)]
pub struct HhClient {
    client: reqwest::Client,
    api_url: String,
    per_page: u32,
    default_keyword: String,
    default_areas: Vec<String>,
    areas: AreaDirectory,
}

impl HhClient {
    /// Build the shared HTTP client (timeout and `User-Agent` from config).
    pub fn http_client(config: &ListingsConfig) -> Result<reqwest::Client, ListingsError> {
        Ok(reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?)
    }

    pub fn new(
        client: reqwest::Client,
        config: &ListingsConfig,
        areas: AreaDirectory,
    ) -> Self {
        Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            per_page: config.per_page,
            default_keyword: config.default_keyword.clone(),
            default_areas: config.default_areas.clone(),
            areas,
        }
    }

    /// Query string parameters for one fetch.
    pub fn query_params(&self, query: &ListingQuery) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();

        let text = if query.keywords.is_empty() {
            self.default_keyword.clone()
        } else {
            query
                .keywords
                .iter()
                .map(|k| k.to_lowercase())
                .collect::<Vec<_>>()
                .join(" OR ")
        };
        params.push(("text", text));

        let mut resolved = 0;
        for city in &query.cities {
            match self.areas.resolve(city) {
                Some(code) => {
                    params.push(("area", code.to_string()));
                    resolved += 1;
                }
                None => tracing::debug!(city = %city, "City has no hh.ru area code"),
            }
        }
        if resolved == 0 {
            for code in &self.default_areas {
                params.push(("area", code.clone()));
            }
        }

        params.push(("order_by", "publication_time".to_string()));
        params.push(("per_page", self.per_page.to_string()));
        params.push(("page", "0".to_string()));
        params.push((
            "date_from",
            query.since.to_rfc3339_opts(SecondsFormat::Secs, true),
        ));
        params
    }

    /// Non-2xx answers keep the raw body for the logs; 2xx bodies must hold
    /// a vacancy list.
    fn decode_response(status: reqwest::StatusCode, body: &str) -> Result<Vec<Candidate>, ListingsError> {
        if !status.is_success() {
            return Err(ListingsError::Status {
                status: status.as_u16(),
                body: body.to_string(),
            });
        }
        let decoded: VacanciesResponse =
            serde_json::from_str(body).map_err(|e| ListingsError::Decode(e.to_string()))?;
        Ok(decoded.items.into_iter().map(Candidate::from).collect())
    }
}

#[async_trait]
impl ListingsClient for HhClient {
    async fn fetch(&self, query: &ListingQuery) -> Result<Vec<Candidate>, ListingsError> {
        let url = format!("{}/vacancies", self.api_url);
        let params = self.query_params(query);

        tracing::debug!(since = %query.since, params = ?params, "Fetching hh.ru vacancies");

        let response = self.client.get(&url).query(&params).send().await?;

        let status = response.status();
        let body = if status.is_success() {
            response.text().await?
        } else {
            response.text().await.unwrap_or_default()
        };
        Self::decode_response(status, &body)
    }

    fn source_name(&self) -> &str {
        "hh.ru"
    }
}
