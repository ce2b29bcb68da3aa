use futures::future::BoxFuture;
use serde_json::json;
use tracing::debug;

use plancast_core::config::WebSearchConfig;
use plancast_core::error::{PlancastError, Result};
use plancast_core::traits::{ExternalRiskSource, SignalRequest};

const TAVILY_ENDPOINT: &str = "https://api.tavily.com/search";
const MAX_FACTOR_CHARS: usize = 200;

/// Searches the web for known risks of each step. Result titles become
/// factors (snippet text when a title is missing).
pub struct WebSearchRiskSource {
    api_key: String,
    query_prefix: String,
    endpoint: String,
    http: reqwest::Client,
}

impl WebSearchRiskSource {
    pub fn new(api_key: &str, query_prefix: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            query_prefix: query_prefix.to_string(),
            endpoint: TAVILY_ENDPOINT.to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &WebSearchConfig) -> Result<Self> {
        if !config.provider.eq_ignore_ascii_case("tavily") {
            return Err(PlancastError::Config(format!(
                "unsupported web search provider: {}",
                config.provider
            )));
        }
        Ok(Self::new(&config.api_key, &config.query_prefix))
    }

    /// Point at a different search endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn query_for(&self, step_text: &str) -> String {
        let prefix = self.query_prefix.trim();
        if prefix.is_empty() {
            step_text.trim().to_string()
        } else {
            format!("{} {}", prefix, step_text.trim())
        }
    }

    fn unavailable(message: impl ToString) -> PlancastError {
        PlancastError::ExternalLookupUnavailable {
            source_name: "web_search".into(),
            message: message.to_string(),
        }
    }
}

/// Extract factors from a search response body.
pub fn factors_from_response(body: &serde_json::Value, max: usize) -> Vec<String> {
    let Some(results) = body["results"].as_array() else {
        return Vec::new();
    };
    let mut factors: Vec<String> = Vec::new();
    for r in results {
        if factors.len() >= max {
            break;
        }
        let title = r["title"].as_str().unwrap_or("").trim();
        let text = if title.is_empty() {
            r["content"].as_str().unwrap_or("").trim()
        } else {
            title
        };
        if text.is_empty() {
            continue;
        }
        let factor: String = text.chars().take(MAX_FACTOR_CHARS).collect();
        if !factors.contains(&factor) {
            factors.push(factor);
        }
    }
    factors
}

impl ExternalRiskSource for WebSearchRiskSource {
    fn name(&self) -> &str {
        "web_search"
    }

    fn risk_factors<'a>(&'a self, request: SignalRequest<'a>) -> BoxFuture<'a, Result<Vec<String>>> {
        Box::pin(async move {
            if request.max_factors == 0 {
                return Ok(Vec::new());
            }
            let query = self.query_for(&request.step.text);

            let resp = self
                .http
                .post(&self.endpoint)
                .json(&json!({
                    "api_key": self.api_key,
                    "query": query,
                    "max_results": request.max_factors,
                }))
                .send()
                .await
                .map_err(Self::unavailable)?;

            if !resp.status().is_success() {
                return Err(Self::unavailable(format!("HTTP {}", resp.status())));
            }

            let body: serde_json::Value = resp.json().await.map_err(Self::unavailable)?;
            let factors = factors_from_response(&body, request.max_factors);
            debug!(step_id = %request.step.id, factors = factors.len(), "Web search done");
            Ok(factors)
        })
    }
}
