//! Policy-driven output caching of rendered HTTP responses.
//!
//! [`OutputCache`] orchestrates the full lookup → miss → produce → store →
//! serve cycle for one route invocation:
//!
//! 1. The route's resolved [`CachePolicy`](crate::policy::CachePolicy)
//!    decides whether the store may be consulted at all (`no-store` routes
//!    bypass it entirely, `no-cache` routes only keep validator
//!    bookkeeping).
//! 2. A [`CacheKey`] is derived from the request shape and the policy's
//!    vary keys.
//! 3. A live entry is served as-is — the producer is **not** invoked on a
//!    hit, which is the core performance contract. A miss or an expired
//!    entry invokes the producer, annotates the result with `Cache-Control`
//!    and validator headers, stores it under the policy's TTL and tags, and
//!    serves it.
//!
//! Conditional requests (`If-None-Match` / `If-Modified-Since`) are
//! evaluated against stored validators on every serving path; a fresh
//! client copy short-circuits to an empty `304`.
//!
//! [`OutputCache::evict_by_tag`] is the independent invalidation entry
//! point: it removes every entry grouped under a tag regardless of
//! remaining TTL, and is a silent no-op for unknown tags.

use std::future::Future;
use std::time::{Duration, SystemTime};

use tokio::time::Instant;
use tracing::{debug, info};

use bytes::Bytes;

use crate::http::{Request, Response, StatusCode};
use crate::policy::CachePolicy;

pub mod freshness;
pub mod key;
mod store;

pub use freshness::{CacheControl, CacheDirective, Validators, annotate, is_fresh};
pub use key::CacheKey;

use store::{CacheEntry, EntryStore};

/// A freshly rendered response as handed back by a route's producer.
///
/// The producer is only responsible for the payload; status defaults to
/// `200 OK` and every cache-related header is stamped by the engine.
#[derive(Debug, Clone)]
pub struct ProducedResponse {
    status: StatusCode,
    content_type: String,
    body: Bytes,
}

impl ProducedResponse {
    /// Creates a produced response with an explicit content type.
    pub fn new(content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            status: StatusCode::Ok,
            content_type: content_type.into(),
            body: body.into(),
        }
    }

    /// Creates an HTML payload.
    pub fn html(body: impl Into<Bytes>) -> Self {
        Self::new("text/html; charset=utf-8", body)
    }

    /// Creates a plain-text payload.
    pub fn text(body: impl Into<Bytes>) -> Self {
        Self::new("text/plain; charset=utf-8", body)
    }

    /// Overrides the response status.
    #[must_use]
    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    fn into_response(self) -> Response {
        Response::new(self.status)
            .content_type(self.content_type)
            .body_bytes(self.body)
    }
}

/// The server-side output cache.
///
/// One instance is created at process start, shared (behind an `Arc`) by
/// every request task, and dropped at process stop; there is no
/// persistence.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use outcache::cache::{OutputCache, ProducedResponse};
/// use outcache::http::Request;
/// use outcache::policy::CachePolicy;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let cache = OutputCache::new();
/// let policy = CachePolicy::base().ttl(Duration::from_secs(10));
/// let (request, _) = Request::parse(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
///
/// let response = cache
///     .handle(&policy, &request, || async {
///         Ok::<_, std::convert::Infallible>(ProducedResponse::html("<h1>hi</h1>"))
///     })
///     .await
///     .unwrap();
/// assert_eq!(response.headers().get("cache-control"), Some("max-age=10"));
/// # }
/// ```
#[derive(Debug, Default)]
pub struct OutputCache {
    store: EntryStore,
}

impl OutputCache {
    /// Creates an empty output cache.
    pub fn new() -> Self {
        Self {
            store: EntryStore::new(),
        }
    }

    /// Serves one route invocation under the given policy.
    ///
    /// `producer` renders a fresh response; it is invoked only when no live
    /// entry can be served. A producer error is propagated unchanged and
    /// nothing is stored — the key is not poisoned, the next request
    /// retries production normally.
    ///
    /// Two concurrent misses on the same key may both invoke the producer;
    /// the last store wins.
    pub async fn handle<F, Fut, E>(
        &self,
        policy: &CachePolicy,
        request: &Request,
        producer: F,
    ) -> Result<Response, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ProducedResponse, E>>,
    {
        if policy.is_no_store() {
            // Nothing may be recorded, server side included: produce and
            // annotate only.
            let produced = producer().await?;
            debug!(path = request.path(), policy = policy.name(), "no-store produce");
            let validators = Validators::for_body(&produced.body, SystemTime::now());
            return Ok(annotate(produced.into_response(), policy, &validators));
        }

        let key = CacheKey::from_request(policy, request);

        if policy.is_no_cache() {
            return self.revalidate(policy, request, &key, producer).await;
        }

        if let Some(entry) = self.store.get_live(&key).await {
            debug!(key = %key, "cache hit");
            if is_fresh(request, &entry.validators) {
                return Ok(annotate(Response::not_modified(), policy, &entry.validators));
            }
            return Ok(annotate(entry.to_response(), policy, &entry.validators));
        }

        debug!(key = %key, "cache miss");
        let prior = self.store.peek_validators(&key).await;
        let produced = producer().await?;
        let validators = Validators::for_body(&produced.body, SystemTime::now())
            .inherit_unchanged(prior.as_ref());

        self.store
            .insert(
                key,
                CacheEntry {
                    status: produced.status,
                    body: produced.body.clone(),
                    content_type: produced.content_type.clone(),
                    created_at: Instant::now(),
                    ttl: policy.max_age(),
                    tags: policy.cache_tags().to_vec(),
                    validators: validators.clone(),
                    revalidate_only: false,
                },
            )
            .await;

        Ok(annotate(produced.into_response(), policy, &validators))
    }

    /// The `no-cache` path: always produce, keep validator and tag
    /// bookkeeping, and serve the payload only when the client's copy is
    /// not already fresh.
    async fn revalidate<F, Fut, E>(
        &self,
        policy: &CachePolicy,
        request: &Request,
        key: &CacheKey,
        producer: F,
    ) -> Result<Response, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ProducedResponse, E>>,
    {
        let prior = self.store.peek_validators(key).await;
        let produced = producer().await?;
        let validators = Validators::for_body(&produced.body, SystemTime::now())
            .inherit_unchanged(prior.as_ref());

        self.store
            .insert(
                key.clone(),
                CacheEntry {
                    status: produced.status,
                    body: produced.body.clone(),
                    content_type: produced.content_type.clone(),
                    created_at: Instant::now(),
                    ttl: Duration::ZERO,
                    tags: policy.cache_tags().to_vec(),
                    validators: validators.clone(),
                    revalidate_only: true,
                },
            )
            .await;

        if is_fresh(request, &validators) {
            debug!(key = %key, "revalidation matched — not modified");
            return Ok(annotate(Response::not_modified(), policy, &validators));
        }
        Ok(annotate(produced.into_response(), policy, &validators))
    }

    /// Removes every entry grouped under `tag`, regardless of remaining
    /// TTL. Idempotent: unknown or already-empty tags are silent no-ops.
    pub async fn evict_by_tag(&self, tag: &str) {
        let evicted = self.store.evict_tag(tag).await;
        if evicted > 0 {
            info!(tag, evicted, "evicted entries by tag");
        } else {
            debug!(tag, "tag eviction matched nothing");
        }
    }

    /// Number of recorded entries (bookkeeping and not-yet-replaced expired
    /// entries included).
    pub async fn len(&self) -> usize {
        self.store.len().await
    }

    /// `true` when nothing is recorded.
    pub async fn is_empty(&self) -> bool {
        self.store.len().await == 0
    }
}
