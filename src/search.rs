//! Web search used to ground lead research.

use crate::{config, log_internal};
use anyhow::Result;

/// How many organic results are passed on to the researcher.
const MAX_RESULTS: usize = 5;

#[derive(serde::Serialize)]
struct SearchRequest<'a> {
    q: &'a str,
}

#[derive(serde::Deserialize)]
struct SearchResponse {
    #[serde(default)]
    organic: Vec<SearchResult>,
}

#[derive(serde::Deserialize)]
struct SearchResult {
    title: String,
    link: String,
    #[serde(default)]
    snippet: String,
}

/// Serper web search client
pub struct WebSearch {
    client: reqwest::Client,
    settings: config::Search,
}

impl WebSearch {
    /// None when no API key is configured.
    pub fn new(settings: &config::Search) -> Option<Self> {
        if settings.api_key.is_empty() {
            return None;
        }
        Some(Self {
            client: reqwest::Client::new(),
            settings: settings.clone(),
        })
    }

    /// Search results formatted as a plain-text list.
    pub async fn search(&self, query: &str) -> Result<String> {
        log_internal!("Searching the web for \"{}\"... ", query);
        let response = self
            .client
            .post(&self.settings.url)
            .header("X-API-KEY", &self.settings.api_key)
            .json(&SearchRequest { q: query })
            .send()
            .await?
            .error_for_status()?
            .json::<SearchResponse>()
            .await?;
        log_internal!("Searching the web for \"{}\"... done", query);

        Ok(format_results(&response))
    }
}

fn format_results(response: &SearchResponse) -> String {
    response
        .organic
        .iter()
        .take(MAX_RESULTS)
        .map(|r| format!("- {} ({}): {}", r.title, r.link, r.snippet))
        .collect::<Vec<String>>()
        .join("\n")
}
