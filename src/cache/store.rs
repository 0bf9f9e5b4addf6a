//! The in-memory entry store and its tag index.
//!
//! Both maps live under one `RwLock` so the tag index is always maintained
//! in lockstep with the entries. Expiry is lazy: an expired entry is simply
//! invisible to lookups and is physically replaced by the next store at the
//! same key (or removed by tag eviction); stale tag-index references are
//! tolerated and evicting an already-gone key is a no-op.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::http::{Response, StatusCode};

use super::freshness::Validators;
use super::key::CacheKey;

/// One stored response payload plus its lifecycle metadata.
#[derive(Debug, Clone)]
pub(crate) struct CacheEntry {
    pub(crate) status: StatusCode,
    pub(crate) body: Bytes,
    pub(crate) content_type: String,
    pub(crate) created_at: Instant,
    pub(crate) ttl: Duration,
    pub(crate) tags: Vec<String>,
    pub(crate) validators: Validators,
    /// Recorded for validator/tag bookkeeping only; never served as a payload hit.
    pub(crate) revalidate_only: bool,
}

impl CacheEntry {
    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) >= self.ttl
    }

    /// Rebuilds a servable response from the stored payload.
    pub(crate) fn to_response(&self) -> Response {
        Response::new(self.status)
            .content_type(self.content_type.clone())
            .body_bytes(self.body.clone())
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<CacheKey, CacheEntry>,
    tags: HashMap<String, HashSet<CacheKey>>,
}

impl Inner {
    fn unlink(&mut self, tags: &[String], key: &CacheKey) {
        for tag in tags {
            if let Some(keys) = self.tags.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.tags.remove(tag);
                }
            }
        }
    }
}

/// Shared, lock-guarded storage for cache entries.
///
/// Lookups take the read lock; stores and evictions take the write lock, so
/// a reader can never observe a half-written entry or an index referencing
/// an entry mid-removal.
#[derive(Debug, Default)]
pub(crate) struct EntryStore {
    inner: RwLock<Inner>,
}

impl EntryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns a clone of the live entry at `key`, if any.
    ///
    /// Expired and revalidate-only entries count as absent.
    pub(crate) async fn get_live(&self, key: &CacheKey) -> Option<CacheEntry> {
        let now = Instant::now();
        let inner = self.inner.read().await;
        match inner.entries.get(key) {
            Some(entry) if !entry.revalidate_only && !entry.is_expired(now) => {
                Some(entry.clone())
            }
            _ => None,
        }
    }

    /// Returns the validators recorded at `key`, expiry notwithstanding.
    ///
    /// Used to carry a stable `Last-Modified` forward across re-productions
    /// of unchanged content.
    pub(crate) async fn peek_validators(&self, key: &CacheKey) -> Option<Validators> {
        let inner = self.inner.read().await;
        inner.entries.get(key).map(|entry| entry.validators.clone())
    }

    /// Stores `entry` at `key`, replacing whatever was there (expired or not)
    /// and updating the tag index on both sides of the replacement.
    pub(crate) async fn insert(&self, key: CacheKey, entry: CacheEntry) {
        let mut inner = self.inner.write().await;
        if let Some(old) = inner.entries.remove(&key) {
            inner.unlink(&old.tags, &key);
        }
        for tag in &entry.tags {
            inner.tags.entry(tag.clone()).or_default().insert(key.clone());
        }
        inner.entries.insert(key, entry);
    }

    /// Removes every entry grouped under `tag`, TTL notwithstanding.
    ///
    /// Returns the number of entries actually removed. Unknown tags and
    /// index references to already-replaced keys are silent no-ops.
    pub(crate) async fn evict_tag(&self, tag: &str) -> usize {
        let mut inner = self.inner.write().await;
        let Some(keys) = inner.tags.remove(tag) else {
            return 0;
        };
        let mut evicted = 0;
        for key in keys {
            if let Some(entry) = inner.entries.remove(&key) {
                evicted += 1;
                // The entry may be grouped under other tags too.
                let others: Vec<String> = entry
                    .tags
                    .iter()
                    .filter(|t| t.as_str() != tag)
                    .cloned()
                    .collect();
                inner.unlink(&others, &key);
            }
        }
        evicted
    }

    /// Number of stored entries, expired ones included until replaced.
    pub(crate) async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }
}
