//! # outcache
//!
//! A dual-layer HTTP response caching subsystem: a server-side output cache
//! storing fully rendered responses keyed by request shape and policy, and
//! a client-facing `Cache-Control`/validator negotiation layer deciding,
//! per response, whether downstream caches may store it or must revalidate.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use outcache::cache::{OutputCache, ProducedResponse};
//! use outcache::http::Request;
//! use outcache::policy::{CachePolicy, PolicyRegistry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Policies are registered once, at startup; misconfiguration fails here.
//!     let mut registry = PolicyRegistry::new();
//!     registry.register(CachePolicy::base().ttl(Duration::from_secs(10)))?;
//!     registry.register(
//!         CachePolicy::named("Tagged20")
//!             .ttl(Duration::from_secs(20))
//!             .tag("tag-expire"),
//!     )?;
//!
//!     // Each route resolves its policy at registration time.
//!     let policy = registry.resolve(Some("Tagged20"))?;
//!
//!     let cache = OutputCache::new();
//!     let (request, _) = Request::parse(b"GET /tagged HTTP/1.1\r\nHost: x\r\n\r\n")?;
//!
//!     // On a miss the producer renders; on a hit it is never invoked.
//!     let response = cache
//!         .handle(&policy, &request, || async {
//!             Ok::<_, std::convert::Infallible>(ProducedResponse::html("<h1>hello</h1>"))
//!         })
//!         .await?;
//!     println!("{}", response.status());
//!
//!     // Bulk invalidation, independent of TTL.
//!     cache.evict_by_tag("tag-expire").await;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod http;
pub mod policy;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use cache::{CacheControl, CacheKey, OutputCache, ProducedResponse, Validators};
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use policy::{CachePolicy, ConfigError, PolicyRegistry, PolicySpec, Visibility};
