//! The error-explanation pipeline.
//!
//! [`Whisperer`] owns the response cache, the explanation provider and the
//! link aggregator, and exposes the caller-facing operations used by both
//! the HTTP server and the CLI.
//!
//! # Submission Flow
//!
//! 1. Enrich the report (reason fallback, message cleaning, stack parsing).
//! 2. Return the cached response for its fingerprint, if any.
//! 3. Otherwise, under single-flight for the fingerprint: check the cache
//!    again, compare against recent errors, then request the explanation and
//!    the links concurrently.
//! 4. Cache the combined response (assigning its id) and return it.
//!
//! Explanation failures become [`ExplanationResult::fallback`] and link
//! failures become an empty list; neither fails the submission.

use anyhow::Result;
use serde::Deserialize;
use std::sync::Arc;

use console_whisperer_core::models::{
    CombinedResponse, ErrorReport, ExplanationResult, RankedLink, RecentErrorSummary,
};
use console_whisperer_core::similarity::is_similar_to_known;
use console_whisperer_core::store::memory::MemoryStore;
use console_whisperer_core::store::KeyValueStore;

use crate::cache::ResponseCache;
use crate::config::Config;
use crate::error::{WhisperError, WhisperResult};
use crate::explain::{create_explainer, Explainer};
use crate::links::LinkAggregator;
use crate::singleflight::SingleFlight;
use crate::sources::{create_sources, SearchSource};

/// Body of a manual link submission.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkSubmission {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub error_query: String,
}

pub struct Whisperer {
    cache: Arc<ResponseCache>,
    explainer: Arc<dyn Explainer>,
    links: LinkAggregator,
    in_flight: SingleFlight<CombinedResponse>,
}

impl Whisperer {
    /// Build the pipeline from config: in-memory store, configured
    /// explainer and enabled search sources.
    pub fn from_config(config: &Config) -> Result<Self> {
        let explainer = create_explainer(&config.explainer)?;
        let sources = create_sources(&config.sources)?;
        Ok(Self::with_collaborators(
            config,
            Arc::new(MemoryStore::new()),
            explainer,
            sources,
        ))
    }

    /// Build the pipeline around caller-supplied collaborators.
    pub fn with_collaborators(
        config: &Config,
        store: Arc<dyn KeyValueStore>,
        explainer: Arc<dyn Explainer>,
        sources: Vec<Arc<dyn SearchSource>>,
    ) -> Self {
        let cache = Arc::new(ResponseCache::new(store, &config.cache));
        let links = LinkAggregator::new(cache.clone(), sources, config.ranking.max_links);
        Self {
            cache,
            explainer,
            links,
            in_flight: SingleFlight::new(),
        }
    }

    pub fn explainer_name(&self) -> &str {
        self.explainer.name()
    }

    // ============ Errors ============

    pub async fn submit_error(&self, mut report: ErrorReport) -> WhisperResult<CombinedResponse> {
        report.enrich();
        if report.message.is_empty() {
            return Err(WhisperError::invalid("Invalid error data"));
        }

        if let Some(cached) = self.cache.get_error_response(&report).await {
            tracing::debug!(id = cached.id, "error cache hit");
            return Ok(cached);
        }

        let key = self.cache.fingerprint(&report);
        let response = self
            .in_flight
            .run(&key, || self.explain_and_cache(&report))
            .await;
        Ok(response)
    }

    async fn explain_and_cache(&self, report: &ErrorReport) -> CombinedResponse {
        // A flight that finished between our miss and this one already
        // cached the response.
        if let Some(cached) = self.cache.get_error_response(report).await {
            return cached;
        }

        let recent = self.cache.recent_records().await;
        let similar_to_known =
            is_similar_to_known(report, recent.iter().map(|r| &r.original_error));

        let (explanation, links) = tokio::join!(
            self.explain(report),
            self.links.find_links(&report.message)
        );

        let response = CombinedResponse {
            original_error: report.clone(),
            explanation: explanation.explanation,
            suggested_fix: explanation.suggested_fix,
            possible_causes: explanation.possible_causes,
            links,
            timestamp: chrono::Utc::now().timestamp_millis(),
            id: 0,
            classification: report.classification(),
            similar_to_known,
        };

        let stored = self.cache.cache_error_response(report, response).await;
        tracing::info!(
            id = stored.id,
            links = stored.links.len(),
            similar = stored.similar_to_known,
            "explained new error"
        );
        stored
    }

    async fn explain(&self, report: &ErrorReport) -> ExplanationResult {
        match self.explainer.explain(report).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(
                    provider = self.explainer.name(),
                    error = %e,
                    "explanation failed; using fallback"
                );
                ExplanationResult::fallback()
            }
        }
    }

    pub async fn get_error_by_id(&self, id: u64) -> WhisperResult<CombinedResponse> {
        self.cache
            .get_error_by_id(id)
            .await
            .ok_or_else(|| WhisperError::not_found("Error not found"))
    }

    pub async fn list_recent_errors(&self) -> Vec<RecentErrorSummary> {
        self.cache.get_recent_errors().await
    }

    // ============ Links ============

    pub async fn query_links(&self, query: &str) -> WhisperResult<Vec<RankedLink>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(WhisperError::invalid("Query parameter is required"));
        }
        Ok(self.links.query_links(query).await)
    }

    /// Validate and store a manual link. Returns whether it was new.
    pub async fn submit_link(&self, submission: &LinkSubmission) -> WhisperResult<bool> {
        let url = submission.url.trim();
        let title = submission.title.trim();
        let query = submission.error_query.trim();
        if url.is_empty() || title.is_empty() || query.is_empty() {
            return Err(WhisperError::invalid(
                "url, title and errorQuery are required",
            ));
        }

        match url::Url::parse(url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            _ => {
                return Err(WhisperError::invalid(
                    "url must be an absolute http or https URL",
                ))
            }
        }

        Ok(self.links.add_link(query, url, title).await)
    }
}
