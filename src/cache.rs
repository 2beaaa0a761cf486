//! Typed response cache over a [`KeyValueStore`].
//!
//! # Key Layout
//!
//! | Key | Value | TTL |
//! |-----|-------|-----|
//! | `record_<id>` | [`CombinedResponse`] | error TTL |
//! | `error_<fp>` | id of the record for that message | error TTL |
//! | `id_<id>` | id (direct lookup pointer) | error TTL |
//! | `recent_errors` | `Vec<RecentErrorSummary>`, newest first | error TTL |
//! | `links_<fp>` | ranked `Vec<RankedLink>` | link TTL |
//! | `manual_links_<fp>` | manually submitted `Vec<Link>` | link TTL |
//!
//! A response is stored once. Both pointers are written with the record's
//! TTL and resolve through it, so a lookup by fingerprint and a lookup by
//! id always agree and neither outlives the record.
//!
//! # Failure Semantics
//!
//! Store errors and undecodable values are logged and read as a miss. A
//! failed write is logged and otherwise ignored; the caller still gets its
//! response.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use console_whisperer_core::fingerprint::FingerprintAlgorithm;
use console_whisperer_core::models::{
    CombinedResponse, ErrorReport, Link, RankedLink, RecentErrorSummary,
};
use console_whisperer_core::store::KeyValueStore;

use crate::config::CacheConfig;

const RECENT_ERRORS_KEY: &str = "recent_errors";
const RECORD_KEY_PREFIX: &str = "record_";
const ID_KEY_PREFIX: &str = "id_";
const MANUAL_LINKS_KEY_PREFIX: &str = "manual_links_";

pub struct ResponseCache {
    store: Arc<dyn KeyValueStore>,
    algorithm: FingerprintAlgorithm,
    error_ttl: Duration,
    link_ttl: Duration,
    recent_limit: usize,
    next_id: AtomicU64,
    /// Serializes read-modify-write of the recent index.
    recent_lock: Mutex<()>,
    /// Serializes read-modify-write of manual link pools.
    manual_lock: Mutex<()>,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn KeyValueStore>, config: &CacheConfig) -> Self {
        Self {
            store,
            algorithm: config.fingerprint,
            error_ttl: config.error_ttl(),
            link_ttl: config.link_ttl(),
            recent_limit: config.recent_limit,
            next_id: AtomicU64::new(1),
            recent_lock: Mutex::new(()),
            manual_lock: Mutex::new(()),
        }
    }

    pub fn algorithm(&self) -> FingerprintAlgorithm {
        self.algorithm
    }

    /// Fingerprint of a report's message, the single-flight and cache key.
    pub fn fingerprint(&self, report: &ErrorReport) -> String {
        self.algorithm.fingerprint(&report.message)
    }

    // ============ Error responses ============

    pub async fn get_error_response(&self, report: &ErrorReport) -> Option<CombinedResponse> {
        let key = self.algorithm.error_key(&report.message);
        let id: u64 = self.read(&key).await?;
        self.read_record(id).await
    }

    /// Store `response` for `report`, assigning the next id.
    ///
    /// Returns the stored response with its id filled in.
    pub async fn cache_error_response(
        &self,
        report: &ErrorReport,
        mut response: CombinedResponse,
    ) -> CombinedResponse {
        response.id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let id = response.id;

        if !self.write(&record_key(id), &response, self.error_ttl).await {
            return response;
        }
        self.write(&self.algorithm.error_key(&report.message), &id, self.error_ttl)
            .await;
        self.write(&format!("{}{}", ID_KEY_PREFIX, id), &id, self.error_ttl)
            .await;

        self.push_recent(response.summary()).await;
        tracing::debug!(id, "cached error response");
        response
    }

    pub async fn get_error_by_id(&self, id: u64) -> Option<CombinedResponse> {
        let pointer: u64 = self.read(&format!("{}{}", ID_KEY_PREFIX, id)).await?;
        self.read_record(pointer).await
    }

    /// Summaries of recently cached errors, newest first.
    pub async fn get_recent_errors(&self) -> Vec<RecentErrorSummary> {
        self.read(RECENT_ERRORS_KEY).await.unwrap_or_default()
    }

    /// Full records behind the recent index that are still live.
    pub async fn recent_records(&self) -> Vec<CombinedResponse> {
        let mut records = Vec::new();
        for summary in self.get_recent_errors().await {
            if let Some(record) = self.read_record(summary.id).await {
                records.push(record);
            }
        }
        records
    }

    async fn read_record(&self, id: u64) -> Option<CombinedResponse> {
        self.read(&record_key(id)).await
    }

    async fn push_recent(&self, summary: RecentErrorSummary) {
        let _guard = self.recent_lock.lock().await;

        let mut recent = vec![summary];
        for entry in self.get_recent_errors().await {
            if recent.len() >= self.recent_limit {
                break;
            }
            if entry.id == recent[0].id {
                continue;
            }
            // Prune entries whose record has expired.
            if self.read_record(entry.id).await.is_some() {
                recent.push(entry);
            }
        }
        recent.truncate(self.recent_limit);

        self.write(RECENT_ERRORS_KEY, &recent, self.error_ttl).await;
    }

    // ============ Links ============

    pub async fn get_links(&self, query: &str) -> Option<Vec<RankedLink>> {
        self.read(&self.algorithm.links_key(query)).await
    }

    pub async fn cache_links(&self, query: &str, links: &[RankedLink]) {
        self.write(&self.algorithm.links_key(query), &links, self.link_ttl)
            .await;
    }

    pub async fn get_manual_links(&self, query: &str) -> Vec<Link> {
        self.read(&self.manual_links_key(query))
            .await
            .unwrap_or_default()
    }

    /// Append `link` to the manual pool for `query` unless its url is
    /// already there. Returns whether the pool changed.
    pub async fn add_manual_link(&self, query: &str, link: Link) -> bool {
        let _guard = self.manual_lock.lock().await;

        let mut pool = self.get_manual_links(query).await;
        if pool.iter().any(|existing| existing.url == link.url) {
            return false;
        }
        pool.push(link);
        self.write(&self.manual_links_key(query), &pool, self.link_ttl)
            .await
    }

    fn manual_links_key(&self, query: &str) -> String {
        format!(
            "{}{}",
            MANUAL_LINKS_KEY_PREFIX,
            self.algorithm.fingerprint(query)
        )
    }

    // ============ Store access ============

    async fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.store.get(key).await {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(decoded) => Some(decoded),
                Err(e) => {
                    tracing::error!(key, error = %e, "undecodable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::error!(key, error = %e, "cache read failed");
                None
            }
        }
    }

    async fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) -> bool {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(key, error = %e, "failed to encode cache entry");
                return false;
            }
        };
        match self.store.set(key, value, ttl).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(key, error = %e, "cache write failed");
                false
            }
        }
    }
}

fn record_key(id: u64) -> String {
    format!("{}{}", RECORD_KEY_PREFIX, id)
}
