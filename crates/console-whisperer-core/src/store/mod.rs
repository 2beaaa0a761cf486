//! Cache storage abstraction for Console Whisperer.
//!
//! The [`KeyValueStore`] trait is the only capability the response cache
//! needs: get, set with a per-entry time-to-live, and delete. Values are
//! JSON so that a distributed backend can be substituted for the default
//! [`MemoryStore`](memory::MemoryStore) without touching pipeline logic.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Abstract TTL key-value backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get`](KeyValueStore::get) | Read a live entry; expired entries read as absent |
/// | [`set`](KeyValueStore::set) | Insert or replace an entry with its own TTL |
/// | [`delete`](KeyValueStore::delete) | Remove an entry |
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Store `value` under `key`, expiring after `ttl`.
    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<()>;

    /// Remove `key`. Returns whether a live entry was removed.
    async fn delete(&self, key: &str) -> Result<bool>;
}
