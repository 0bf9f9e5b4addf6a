//! Deterministic cache-key construction.
//!
//! A key is derived from the policy identity, the request method and path,
//! and the values of the policy's vary keys as they appear on the request.
//! Query parameters outside the vary set never influence the key, and a
//! vary parameter absent from the request is recorded as an explicit
//! missing marker distinct from an empty-string value.

use std::collections::HashMap;
use std::fmt;

use crate::http::{Method, Request};
use crate::policy::CachePolicy;

/// An opaque, hashable identity for one cacheable response shape.
///
/// The key space is partitioned per policy: the same request shape cached
/// under two different policies occupies two distinct keys, so a route
/// reconfiguration can never serve an entry stored under another policy's
/// TTL or tags.
///
/// # Examples
///
/// ```
/// use std::collections::HashMap;
/// use outcache::http::Method;
/// use outcache::policy::CachePolicy;
/// use outcache::cache::CacheKey;
///
/// let policy = CachePolicy::named("Vary30").vary_on(["varyOnThis"]);
///
/// let mut q1 = HashMap::new();
/// q1.insert("varyOnThis".to_owned(), "100".to_owned());
/// q1.insert("random".to_owned(), "1".to_owned());
///
/// let mut q2 = HashMap::new();
/// q2.insert("varyOnThis".to_owned(), "100".to_owned());
/// q2.insert("random".to_owned(), "2".to_owned());
///
/// // `random` is not a vary key, so the keys collapse.
/// let k1 = CacheKey::build(&policy, &Method::Get, "/public", &q1);
/// let k2 = CacheKey::build(&policy, &Method::Get, "/public", &q2);
/// assert_eq!(k1, k2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    policy: String,
    method: String,
    path: String,
    vary: Vec<(String, Option<String>)>,
}

impl CacheKey {
    /// Builds a key from the raw request shape.
    ///
    /// The policy's vary keys are already canonicalized (sorted and
    /// deduplicated), so the fold order is stable regardless of how the
    /// policy declared them and of query-string ordering.
    pub fn build(
        policy: &CachePolicy,
        method: &Method,
        path: &str,
        query: &HashMap<String, String>,
    ) -> Self {
        let vary = policy
            .vary_keys()
            .iter()
            .map(|key| (key.clone(), query.get(key).cloned()))
            .collect();

        Self {
            policy: policy.name().to_owned(),
            method: method.as_str().to_owned(),
            path: path.to_owned(),
            vary,
        }
    }

    /// Builds a key for a parsed request.
    pub fn from_request(policy: &CachePolicy, request: &Request) -> Self {
        Self::build(policy, request.method(), request.path(), request.query_params())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} {}", self.policy, self.method, self.path)?;
        for (key, value) in &self.vary {
            match value {
                Some(v) => write!(f, "|{key}={v}")?,
                None => write!(f, "|{key}=\u{2205}")?,
            }
        }
        Ok(())
    }
}
