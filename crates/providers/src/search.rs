//! Web search grounding
//!
//! A thin client for a Tavily-style search API, used to fold fresh context
//! into prompts for time-sensitive questions. Search failures degrade to the
//! ungrounded prompt, they never abort a turn.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use voiceloop_config::SearchConfig;

use crate::ProviderError;

/// One ranked search result.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResult {
    pub title: String,
    #[serde(default)]
    pub url: String,
    pub content: String,
}

/// Web search backend trait
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Capability probe
    fn is_configured(&self) -> bool;

    /// Ranked results for `query`, best first.
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, ProviderError>;
}

/// Tavily-style REST search client.
pub struct TavilySearch {
    config: SearchConfig,
    client: reqwest::Client,
}

impl TavilySearch {
    pub fn new(config: SearchConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[async_trait]
impl SearchBackend for TavilySearch {
    fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, ProviderError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(ProviderError::NotConfigured)?;

        let response = self
            .client
            .post(&self.config.base_url)
            .json(&json!({
                "api_key": api_key,
                "query": query,
                "search_depth": "basic",
                "max_results": self.config.max_results,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: TavilyResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Stream(e.to_string()))?;

        Ok(parsed
            .results
            .into_iter()
            .take(self.config.max_results)
            .collect())
    }
}

/// Canned-result stand-in for local testing.
#[derive(Debug, Default)]
pub struct MockSearch;

#[async_trait]
impl SearchBackend for MockSearch {
    fn is_configured(&self) -> bool {
        false
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, ProviderError> {
        Ok(vec![SearchResult {
            title: "Example result".to_string(),
            url: "https://example.com".to_string(),
            content: format!("Mock content for query: {query}"),
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_search_echoes_the_query() {
        let results = MockSearch.search("gold price today").await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].content.contains("gold price today"));
    }

    #[test]
    fn tavily_response_parses() {
        let raw = r#"{
            "results": [
                { "title": "Weather", "url": "https://w.example", "content": "Sunny, 21C" },
                { "title": "Forecast", "content": "Rain tomorrow" }
            ]
        }"#;
        let parsed: TavilyResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.results.len(), 2);
        assert_eq!(parsed.results[1].url, "");
    }
}
