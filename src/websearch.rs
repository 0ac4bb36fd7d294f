//! Web search providers.
//!
//! Tavily and SerpAPI are both supported; credentials come from the
//! environment (`TAVILY_API_KEY`, `SERPAPI_API_KEY`). The configured
//! provider is tried first and the other is used as a fallback when the
//! first fails or has no credential. With neither credential present,
//! [`WebSearch::from_env`] returns `None` and the agent runs in
//! documents-only mode.

use anyhow::{bail, Result};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::WebSearchConfig;

#[derive(Debug, Clone)]
pub struct WebSearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Provider {
    Tavily,
    SerpApi,
}

impl Provider {
    fn name(&self) -> &'static str {
        match self {
            Provider::Tavily => "tavily",
            Provider::SerpApi => "serpapi",
        }
    }

    fn key(&self) -> Option<String> {
        let var = match self {
            Provider::Tavily => "TAVILY_API_KEY",
            Provider::SerpApi => "SERPAPI_API_KEY",
        };
        std::env::var(var).ok().filter(|k| !k.is_empty())
    }
}

pub struct WebSearch {
    /// Providers in fallback order; every entry has a credential.
    providers: Vec<(Provider, String)>,
    max_results: usize,
    client: reqwest::Client,
}

impl WebSearch {
    /// Build the search tool from environment credentials, or `None` when
    /// no provider is usable.
    pub fn from_env(config: &WebSearchConfig) -> Result<Option<Self>> {
        let order = match config.provider.as_str() {
            "serpapi" => [Provider::SerpApi, Provider::Tavily],
            _ => [Provider::Tavily, Provider::SerpApi],
        };

        let providers: Vec<(Provider, String)> = order
            .into_iter()
            .filter_map(|p| p.key().map(|k| (p, k)))
            .collect();

        if providers.is_empty() {
            info!("no web search credentials found, running documents-only");
            return Ok(None);
        }
        info!(
            providers = %providers.iter().map(|(p, _)| p.name()).collect::<Vec<_>>().join(", "),
            "web search enabled"
        );

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Some(Self {
            providers,
            max_results: config.max_results,
            client,
        }))
    }

    /// Search the web, falling through to the next provider on failure.
    pub async fn search(&self, query: &str) -> Result<Vec<WebSearchResult>> {
        let mut last_err = None;
        for (provider, key) in &self.providers {
            let result = match provider {
                Provider::Tavily => self.search_tavily(key, query).await,
                Provider::SerpApi => self.search_serpapi(key, query).await,
            };
            match result {
                Ok(results) => return Ok(results),
                Err(e) => {
                    warn!(provider = provider.name(), error = %e, "web search provider failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("No web search provider available")))
    }

    async fn search_tavily(&self, api_key: &str, query: &str) -> Result<Vec<WebSearchResult>> {
        let body = serde_json::json!({
            "api_key": api_key,
            "query": query,
            "max_results": self.max_results,
        });

        let response = self
            .client
            .post("https://api.tavily.com/search")
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Tavily API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        Ok(parse_tavily(&json))
    }

    async fn search_serpapi(&self, api_key: &str, query: &str) -> Result<Vec<WebSearchResult>> {
        let response = self
            .client
            .get("https://serpapi.com/search.json")
            .query(&[
                ("q", query),
                ("api_key", api_key),
                ("num", &self.max_results.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("SerpAPI error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        Ok(parse_serpapi(&json, self.max_results))
    }
}

fn parse_tavily(json: &serde_json::Value) -> Vec<WebSearchResult> {
    json.get("results")
        .and_then(|r| r.as_array())
        .map(|results| {
            results
                .iter()
                .filter_map(|r| {
                    Some(WebSearchResult {
                        title: r.get("title")?.as_str()?.to_string(),
                        url: r.get("url")?.as_str()?.to_string(),
                        snippet: r
                            .get("content")
                            .and_then(|c| c.as_str())
                            .unwrap_or_default()
                            .to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_serpapi(json: &serde_json::Value, max_results: usize) -> Vec<WebSearchResult> {
    json.get("organic_results")
        .and_then(|r| r.as_array())
        .map(|results| {
            results
                .iter()
                .take(max_results)
                .filter_map(|r| {
                    Some(WebSearchResult {
                        title: r.get("title")?.as_str()?.to_string(),
                        url: r.get("link")?.as_str()?.to_string(),
                        snippet: r
                            .get("snippet")
                            .and_then(|s| s.as_str())
                            .unwrap_or_default()
                            .to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}
