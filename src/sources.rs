//! External help-link search sources.
//!
//! Each source turns a plain search query into candidate [`Link`]s. Sources
//! are queried concurrently by the [`LinkAggregator`](crate::links::LinkAggregator);
//! a source failure only removes that source's candidates.
//!
//! | Source | Endpoint | Votes | Timestamp |
//! |--------|----------|-------|-----------|
//! | [`StackOverflowSource`] | `GET /2.3/search` (Stack Exchange API) | `score` (negative → 0) | `creation_date` × 1000 |
//! | [`GitHubSource`] | `GET /search/issues` | `reactions.total_count` | `created_at` (RFC 3339) |

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::DateTime;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use console_whisperer_core::models::{Link, LinkSource};

use crate::config::{SearchSourceConfig, SourcesConfig, GITHUB_API_URL, STACKOVERFLOW_API_URL};

const USER_AGENT: &str = concat!("console-whisperer/", env!("CARGO_PKG_VERSION"));

/// A searchable provider of help links.
#[async_trait]
pub trait SearchSource: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Search for links matching `query`.
    async fn search(&self, query: &str) -> Result<Vec<Link>>;
}

/// Build the enabled sources in iteration order (StackOverflow first).
pub fn create_sources(config: &SourcesConfig) -> Result<Vec<Arc<dyn SearchSource>>> {
    let mut sources: Vec<Arc<dyn SearchSource>> = Vec::new();
    if config.stackoverflow.enabled {
        sources.push(Arc::new(StackOverflowSource::new(&config.stackoverflow)?));
    }
    if config.github.enabled {
        let token = std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty());
        sources.push(Arc::new(GitHubSource::new(&config.github, token)?));
    }
    Ok(sources)
}

fn build_client(config: &SearchSourceConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(USER_AGENT)
        .build()
        .context("Failed to build HTTP client")
}

// ============ StackOverflow ============

pub struct StackOverflowSource {
    client: reqwest::Client,
    base_url: String,
    page_size: u32,
}

impl StackOverflowSource {
    pub fn new(config: &SearchSourceConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config)?,
            base_url: config.base_url_or(STACKOVERFLOW_API_URL),
            page_size: config.page_size,
        })
    }
}

#[async_trait]
impl SearchSource for StackOverflowSource {
    fn name(&self) -> &str {
        "stackoverflow"
    }

    async fn search(&self, query: &str) -> Result<Vec<Link>> {
        let page_size = self.page_size.to_string();
        let response = self
            .client
            .get(format!("{}/2.3/search", self.base_url))
            .query(&[
                ("order", "desc"),
                ("sort", "relevance"),
                ("intitle", query),
                ("site", "stackoverflow"),
                ("pagesize", page_size.as_str()),
                ("filter", "withbody"),
            ])
            .send()
            .await
            .context("StackOverflow request failed")?
            .error_for_status()
            .context("StackOverflow returned an error status")?;

        let json: Value = response
            .json()
            .await
            .context("StackOverflow returned invalid JSON")?;
        parse_stackexchange_response(&json)
    }
}

/// Map a Stack Exchange `/search` response onto links.
pub fn parse_stackexchange_response(json: &Value) -> Result<Vec<Link>> {
    let items = json
        .get("items")
        .and_then(|i| i.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid StackExchange response: missing items array"))?;

    Ok(items
        .iter()
        .filter_map(|item| {
            let url = item.get("link")?.as_str()?;
            let title = item.get("title")?.as_str()?;
            let score = item.get("score").and_then(|s| s.as_i64()).unwrap_or(0);
            let created = item
                .get("creation_date")
                .and_then(|d| d.as_i64())
                .unwrap_or(0);
            Some(Link {
                url: url.to_string(),
                title: title.to_string(),
                source: LinkSource::StackOverflow,
                votes: score.max(0) as u64,
                timestamp: created.saturating_mul(1000),
            })
        })
        .collect())
}

// ============ GitHub ============

pub struct GitHubSource {
    client: reqwest::Client,
    base_url: String,
    page_size: u32,
    token: Option<String>,
}

impl GitHubSource {
    pub fn new(config: &SearchSourceConfig, token: Option<String>) -> Result<Self> {
        Ok(Self {
            client: build_client(config)?,
            base_url: config.base_url_or(GITHUB_API_URL),
            page_size: config.page_size,
            token,
        })
    }
}

#[async_trait]
impl SearchSource for GitHubSource {
    fn name(&self) -> &str {
        "github"
    }

    async fn search(&self, query: &str) -> Result<Vec<Link>> {
        let q = format!("{} is:issue", query);
        let per_page = self.page_size.to_string();
        let mut request = self
            .client
            .get(format!("{}/search/issues", self.base_url))
            .header("Accept", "application/vnd.github.v3+json")
            .query(&[
                ("q", q.as_str()),
                ("sort", "reactions"),
                ("order", "desc"),
                ("per_page", per_page.as_str()),
            ]);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .context("GitHub request failed")?
            .error_for_status()
            .context("GitHub returned an error status")?;

        let json: Value = response
            .json()
            .await
            .context("GitHub returned invalid JSON")?;
        parse_github_response(&json)
    }
}

/// Map a GitHub issue search response onto links.
pub fn parse_github_response(json: &Value) -> Result<Vec<Link>> {
    let items = json
        .get("items")
        .and_then(|i| i.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid GitHub response: missing items array"))?;

    Ok(items
        .iter()
        .filter_map(|item| {
            let url = item.get("html_url")?.as_str()?;
            let title = item.get("title")?.as_str()?;
            let votes = item
                .get("reactions")
                .and_then(|r| r.get("total_count"))
                .and_then(|c| c.as_u64())
                .unwrap_or(0);
            let timestamp = item
                .get("created_at")
                .and_then(|c| c.as_str())
                .and_then(|c| DateTime::parse_from_rfc3339(c).ok())
                .map(|dt| dt.timestamp_millis())
                .unwrap_or(0);
            Some(Link {
                url: url.to_string(),
                title: title.to_string(),
                source: LinkSource::GitHub,
                votes,
                timestamp,
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_stackexchange_response() {
        let json = json!({
            "items": [
                {
                    "link": "https://stackoverflow.com/questions/1",
                    "title": "TypeError: x is undefined",
                    "score": 42,
                    "creation_date": 1_600_000_000
                },
                {
                    "link": "https://stackoverflow.com/questions/2",
                    "title": "Downvoted",
                    "score": -3,
                    "creation_date": 1_600_000_001
                },
                { "title": "no link" }
            ]
        });
        let links = parse_stackexchange_response(&json).unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].votes, 42);
        assert_eq!(links[0].timestamp, 1_600_000_000_000);
        assert_eq!(links[0].source, LinkSource::StackOverflow);
        assert_eq!(links[1].votes, 0);
    }

    #[test]
    fn test_parse_stackexchange_clamps_huge_creation_date() {
        let json = json!({
            "items": [
                {
                    "link": "https://stackoverflow.com/questions/3",
                    "title": "Far future",
                    "score": 1,
                    "creation_date": i64::MAX
                },
                {
                    "link": "https://stackoverflow.com/questions/4",
                    "title": "Far past",
                    "score": 1,
                    "creation_date": i64::MIN
                }
            ]
        });
        let links = parse_stackexchange_response(&json).unwrap();
        assert_eq!(links[0].timestamp, i64::MAX);
        assert_eq!(links[1].timestamp, i64::MIN);
    }

    #[test]
    fn test_sources_default_to_public_endpoints() {
        let config = SourcesConfig::default();
        let stackoverflow = StackOverflowSource::new(&config.stackoverflow).unwrap();
        assert_eq!(stackoverflow.base_url, "https://api.stackexchange.com");
        let github = GitHubSource::new(&config.github, None).unwrap();
        assert_eq!(github.base_url, "https://api.github.com");
    }

    #[test]
    fn test_parse_stackexchange_missing_items() {
        assert!(parse_stackexchange_response(&json!({ "error_id": 502 })).is_err());
    }

    #[test]
    fn test_parse_github_response() {
        let json = json!({
            "total_count": 1,
            "items": [
                {
                    "html_url": "https://github.com/org/repo/issues/7",
                    "title": "Cannot read properties of undefined",
                    "reactions": { "total_count": 9 },
                    "created_at": "2024-01-02T03:04:05Z"
                },
                {
                    "html_url": "https://github.com/org/repo/issues/8",
                    "title": "No reactions field"
                }
            ]
        });
        let links = parse_github_response(&json).unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].votes, 9);
        assert_eq!(links[0].timestamp, 1_704_164_645_000);
        assert_eq!(links[0].source, LinkSource::GitHub);
        assert_eq!(links[1].votes, 0);
        assert_eq!(links[1].timestamp, 0);
    }

    #[test]
    fn test_create_sources_respects_enabled() {
        let mut config = SourcesConfig::default();
        assert_eq!(create_sources(&config).unwrap().len(), 2);

        config.github.enabled = false;
        let sources = create_sources(&config).unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].name(), "stackoverflow");

        config.stackoverflow.enabled = false;
        assert!(create_sources(&config).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_source_errors() {
        let config = SearchSourceConfig {
            enabled: true,
            base_url: Some("http://127.0.0.1:1".to_string()),
            timeout_secs: 2,
            ..SearchSourceConfig::default()
        };
        let source = StackOverflowSource::new(&config).unwrap();
        assert!(source.search("anything").await.is_err());
    }
}
