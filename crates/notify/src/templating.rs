//! Minijinja template rendering for alert messages.
//!
//! Renders the per-vacancy message and the "nothing new" status message.
//! The vacancy template can be replaced at startup (`JOBWATCH_VACANCY_TEMPLATE`);
//! a fresh [`minijinja::Environment`] is created per render call.

use chrono::{DateTime, Utc};

use jobwatch_core::Candidate;

use crate::telegram::{escape_markdown_v2, escape_markdown_v2_url};
use crate::traits::{Notification, NotifyError};

/// Default MarkdownV2 template for one vacancy.
pub const DEFAULT_VACANCY_TEMPLATE: &str =
    "❤ *New vacancy:* [{{ title | escape_md }}]({{ url | escape_md_url }})\n🏙 City: {{ location | escape_md }}";

/// Default plain-text template for a cycle that returned nothing.
pub const DEFAULT_NOTHING_NEW_TEMPLATE: &str =
    "No new vacancies since {{ since }}. Next check in {{ interval_minutes }} min.";

/// Context data available to the vacancy template.
#[derive(Debug, Clone, serde::Serialize)]
pub struct VacancyContext<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub location: &'a str,
    pub url: &'a str,
    /// Publication time formatted as `YYYY-MM-DD HH:MM UTC`, if known.
    pub published_at: Option<String>,
}

impl<'a> From<&'a Candidate> for VacancyContext<'a> {
    fn from(c: &'a Candidate) -> Self {
        Self {
            id: &c.id,
            title: &c.title,
            location: &c.location,
            url: &c.url,
            published_at: c.published_at.map(format_time),
        }
    }
}

/// Context data available to the "nothing new" template.
#[derive(Debug, Clone, serde::Serialize)]
pub struct NothingNewContext {
    pub since: String,
    pub interval_minutes: u32,
}

fn format_time(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M UTC").to_string()
}

/// Renders alert messages using minijinja.
#[derive(Debug, Clone)]
pub struct MessageRenderer {
    vacancy_template: String,
    nothing_new_template: String,
}

impl MessageRenderer {
    /// Create a renderer with the built-in templates.
    pub fn new() -> Self {
        Self {
            vacancy_template: DEFAULT_VACANCY_TEMPLATE.to_string(),
            nothing_new_template: DEFAULT_NOTHING_NEW_TEMPLATE.to_string(),
        }
    }

    /// Replace the vacancy template after checking that it parses.
    pub fn with_vacancy_template(mut self, template: impl Into<String>) -> Result<Self, NotifyError> {
        let template = template.into();
        Self::validate(&template)?;
        self.vacancy_template = template;
        Ok(self)
    }

    /// Build a configured minijinja environment with custom filters.
    fn build_env() -> minijinja::Environment<'static> {
        let mut env = minijinja::Environment::new();
        env.add_filter("escape_md", escape_md_filter);
        env.add_filter("escape_md_url", escape_md_url_filter);
        env
    }

    fn render<S: serde::Serialize>(template_str: &str, ctx: &S) -> Result<String, NotifyError> {
        Self::build_env()
            .render_str(template_str, ctx)
            .map_err(|e| NotifyError::Template(e.to_string()))
    }

    /// Render the MarkdownV2 message announcing one vacancy.
    pub fn vacancy(&self, candidate: &Candidate) -> Result<Notification, NotifyError> {
        let body = Self::render(&self.vacancy_template, &VacancyContext::from(candidate))?;
        Ok(Notification::markdown(body))
    }

    /// Render the plain-text "nothing new" message.
    pub fn nothing_new(&self, since: DateTime<Utc>, interval_minutes: u32) -> Result<Notification, NotifyError> {
        let ctx = NothingNewContext {
            since: format_time(since),
            interval_minutes,
        };
        let body = Self::render(&self.nothing_new_template, &ctx)?;
        Ok(Notification::plain(body))
    }

    /// Only checks syntax; nothing is rendered.
    fn validate(template_str: &str) -> Result<(), NotifyError> {
        let env = Self::build_env();
        env.template_from_str(template_str)
            .map_err(|e| NotifyError::Template(e.to_string()))?;
        Ok(())
    }
}

impl Default for MessageRenderer {
    fn default() -> Self {
        Self::new()
    }
}

fn escape_md_filter(value: String) -> String {
    escape_markdown_v2(&value)
}

fn escape_md_url_filter(value: String) -> String {
    escape_markdown_v2_url(&value)
}
