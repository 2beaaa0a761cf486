//! In-memory [`KeyValueStore`] implementation.
//!
//! Uses a `HashMap` behind `std::sync::RwLock`. Expiry is checked on read;
//! expired entries are dropped lazily on access, and writes sweep the whole
//! map at most once per sweep interval (see [`MemoryStore::with_sweep_interval`]).

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::KeyValueStore;

struct Entry {
    value: Value,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Default minimum time between write-triggered sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Process-local TTL store.
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
    sweep_interval: Duration,
    next_sweep: Mutex<Instant>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            next_sweep: Mutex::new(Instant::now() + DEFAULT_SWEEP_INTERVAL),
        }
    }

    /// Set how often a write may sweep expired entries. `Duration::ZERO`
    /// sweeps on every write.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        *self.next_sweep.get_mut().unwrap_or_else(|e| e.into_inner()) = Instant::now() + interval;
        self
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> Result<usize> {
        let now = Instant::now();
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        Ok(sweep(&mut entries, now))
    }

    /// Whether a write at `now` is due to sweep; schedules the next one.
    fn sweep_due(&self, now: Instant) -> Result<bool> {
        let mut next_sweep = self.next_sweep.lock().map_err(|_| poisoned())?;
        if now < *next_sweep {
            return Ok(false);
        }
        *next_sweep = now + self.sweep_interval;
        Ok(true)
    }

    /// Number of live entries.
    pub fn len(&self) -> Result<usize> {
        let now = Instant::now();
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.values().filter(|e| e.is_live(now)).count())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn sweep(entries: &mut HashMap<String, Entry>, now: Instant) -> usize {
    let before = entries.len();
    entries.retain(|_, e| e.is_live(now));
    before - entries.len()
}

fn poisoned() -> anyhow::Error {
    anyhow!("memory store lock poisoned")
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let now = Instant::now();
        {
            let entries = self.entries.read().map_err(|_| poisoned())?;
            match entries.get(key) {
                Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }
        // Expired: drop it unless it was replaced in the meantime.
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        if entries.get(key).is_some_and(|e| !e.is_live(Instant::now())) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl)
            .ok_or_else(|| anyhow!("ttl out of range for key {}", key))?;
        let sweep_due = self.sweep_due(now)?;
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        if sweep_due {
            sweep(&mut entries, now);
        }
        entries.insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        Ok(entries.remove(key).is_some_and(|e| e.is_live(now)))
    }
}
