//! City name → hh.ru area code lookup.
//!
//! hh.ru publishes its region tree at `/areas`: countries containing
//! regions containing cities, each with an `id` and a `name`. The directory
//! flattens the tree into a case-insensitive name map once at startup.

use std::collections::HashMap;

use serde::Deserialize;

use crate::traits::ListingsError;

/// A node of the hh.ru region tree.
#[derive(Debug, Clone, Deserialize)]
pub struct Area {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub areas: Vec<Area>,
}

#[derive(Debug, Clone, Default)]
pub struct AreaDirectory {
    by_name: HashMap<String, String>,
}

impl AreaDirectory {
    /// Directory that resolves nothing; every query falls back to the
    /// default areas.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from a decoded region tree. The first occurrence of a name wins.
    pub fn from_tree(countries: &[Area]) -> Self {
        let mut by_name = HashMap::new();
        for country in countries {
            walk(country, &mut by_name);
        }
        Self { by_name }
    }

    /// Download and flatten the region tree.
    pub async fn load(client: &reqwest::Client, api_url: &str) -> Result<Self, ListingsError> {
        let url = format!("{}/areas", api_url.trim_end_matches('/'));
        let response = client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ListingsError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let countries: Vec<Area> = response
            .json()
            .await
            .map_err(|e| ListingsError::Decode(e.to_string()))?;
        let directory = Self::from_tree(&countries);
        tracing::info!(areas = directory.len(), "Loaded hh.ru area directory");
        Ok(directory)
    }

    /// Area code for a city name, ignoring case and surrounding whitespace.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.by_name
            .get(&name.trim().to_lowercase())
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

fn walk(area: &Area, by_name: &mut HashMap<String, String>) {
    if !area.id.is_empty() {
        by_name
            .entry(area.name.to_lowercase())
            .or_insert_with(|| area.id.clone());
    }
    for child in &area.areas {
        walk(child, by_name);
    }
}
