//! Cache storage contract and the bundled stores.
//!
//! # Design
//! The pipeline only talks to `dyn CacheStore`. Entries are addressed by a
//! category (the resource path, possibly with header values folded in) and a
//! sub-key derived from the query shape. Cached responses are shared as
//! `Arc<HttpResponse>` so a hit hands back the very object that was stored.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::http::{find_header, HttpResponse};

/// What the cache middleware stores.
pub type CachedResponse = Arc<HttpResponse>;

/// A stored item and its absolute expiry. `None` never goes stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedEntry<T> {
    pub category: String,
    pub id: String,
    pub item: T,
    pub expires_at: Option<DateTime<Utc>>,
}

impl<T> CachedEntry<T> {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Async key-value store used by [`crate::middleware::CacheMiddleware`].
///
/// Implementations must be safe for concurrent use; a `set` that completed
/// before a `try_get` started must be visible to it.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn try_get(&self, category: &str, id: &str) -> Option<CachedEntry<CachedResponse>>;

    async fn set(
        &self,
        category: &str,
        id: &str,
        item: CachedResponse,
        expires_at: Option<DateTime<Utc>>,
    );
}

/// In-memory store backed by a concurrent hash map. Expired entries are
/// dropped when they are read.
#[derive(Debug, Clone, Default)]
pub struct MemoryCacheStore {
    entries: Arc<DashMap<(String, String), CachedEntry<CachedResponse>>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn try_get(&self, category: &str, id: &str) -> Option<CachedEntry<CachedResponse>> {
        let key = (category.to_string(), id.to_string());
        let entry = self.entries.get(&key).map(|entry| entry.value().clone())?;
        if entry.is_expired() {
            self.entries.remove_if(&key, |_, stored| stored.is_expired());
            return None;
        }
        Some(entry)
    }

    async fn set(
        &self,
        category: &str,
        id: &str,
        item: CachedResponse,
        expires_at: Option<DateTime<Utc>>,
    ) {
        let entry = CachedEntry {
            category: category.to_string(),
            id: id.to_string(),
            item,
            expires_at,
        };
        self.entries
            .insert((category.to_string(), id.to_string()), entry);
    }
}

/// Store that keeps nothing. Every lookup misses.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCacheStore;

#[async_trait]
impl CacheStore for NullCacheStore {
    async fn try_get(&self, _category: &str, _id: &str) -> Option<CachedEntry<CachedResponse>> {
        None
    }

    async fn set(
        &self,
        _category: &str,
        _id: &str,
        _item: CachedResponse,
        _expires_at: Option<DateTime<Utc>>,
    ) {
    }
}

/// Parse the `Expires` response header (an RFC 1123 HTTP date).
/// Absent or unparsable values yield `None`.
pub fn expiry_from_headers(headers: &[(String, String)]) -> Option<DateTime<Utc>> {
    let value = find_header(headers, "Expires")?;
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|date| date.with_timezone(&Utc))
}
