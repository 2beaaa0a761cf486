//! Link aggregation across search sources.
//!
//! [`LinkAggregator::find_links`] is the cached, ranked lookup used by the
//! pipeline:
//!
//! ```text
//! message ──▶ links_<fp> hit? ──yes──▶ cached list
//!                 │ no
//!                 ▼
//!            build_query ──▶ all sources concurrently ──▶ rank ──▶ cache
//! ```
//!
//! Manually submitted links live in their own pool and are appended after
//! the ranked list by [`LinkAggregator::query_links`].

use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;

use console_whisperer_core::models::{Link, LinkSource, RankedLink};
use console_whisperer_core::rank::{build_query, rank_links};

use crate::cache::ResponseCache;
use crate::sources::SearchSource;

pub struct LinkAggregator {
    cache: Arc<ResponseCache>,
    sources: Vec<Arc<dyn SearchSource>>,
    max_links: usize,
}

impl LinkAggregator {
    pub fn new(
        cache: Arc<ResponseCache>,
        sources: Vec<Arc<dyn SearchSource>>,
        max_links: usize,
    ) -> Self {
        Self {
            cache,
            sources,
            max_links,
        }
    }

    /// Ranked help links for an error message, at most `max_links`.
    pub async fn find_links(&self, message: &str) -> Vec<RankedLink> {
        if let Some(cached) = self.cache.get_links(message).await {
            tracing::debug!(count = cached.len(), "link cache hit");
            return cached;
        }

        let query = build_query(message);
        if query.is_empty() {
            return Vec::new();
        }

        let candidates = self.search_all(&query).await;
        let ranked = rank_links(
            candidates,
            message,
            chrono::Utc::now().timestamp_millis(),
            self.max_links,
        );

        self.cache.cache_links(message, &ranked).await;
        ranked
    }

    /// Candidates from every source, in source order. A failing source
    /// contributes nothing.
    async fn search_all(&self, query: &str) -> Vec<Link> {
        let searches = self.sources.iter().map(|source| async move {
            match source.search(query).await {
                Ok(links) => {
                    tracing::debug!(source = source.name(), count = links.len(), "source search");
                    links
                }
                Err(e) => {
                    tracing::warn!(source = source.name(), error = %e, "source search failed");
                    Vec::new()
                }
            }
        });

        join_all(searches).await.into_iter().flatten().collect()
    }

    /// Ranked links followed by manually submitted ones, deduplicated by url.
    pub async fn query_links(&self, query: &str) -> Vec<RankedLink> {
        let mut links = self.find_links(query).await;
        let mut seen: HashSet<String> = links.iter().map(|l| l.url.clone()).collect();

        for manual in self.cache.get_manual_links(query).await {
            if seen.insert(manual.url.clone()) {
                links.push(manual.into());
            }
        }
        links
    }

    /// Record a user-submitted link for `query`.
    ///
    /// Idempotent by url: returns `false` when the url is already present
    /// in the ranked list or the manual pool.
    pub async fn add_link(&self, query: &str, url: &str, title: &str) -> bool {
        if let Some(ranked) = self.cache.get_links(query).await {
            if ranked.iter().any(|l| l.url == url) {
                return false;
            }
        }

        let link = Link {
            url: url.to_string(),
            title: title.to_string(),
            source: LinkSource::User,
            votes: 1,
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        let added = self.cache.add_manual_link(query, link).await;
        if added {
            tracing::info!(url, "manual link added");
        }
        added
    }
}
