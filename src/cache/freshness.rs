//! Cache-Control generation and conditional-request evaluation.
//!
//! Every response leaving the output cache is annotated here: a
//! `Cache-Control` header derived from the route's policy, plus
//! `Last-Modified` / `ETag` validators so clients and shared caches can
//! revalidate instead of re-downloading. The inverse direction —
//! `If-Modified-Since` / `If-None-Match` on an incoming request — is
//! evaluated against stored validators to decide between a full `200` and
//! an empty `304`.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};

use crate::http::{Request, Response};
use crate::policy::{CachePolicy, Visibility};

/// A single `Cache-Control` response directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheDirective {
    /// Any cache may store the response.
    Public,
    /// Only the client's own cache may store the response.
    Private,
    /// Stored copies must be revalidated before use.
    NoCache,
    /// The response must not be stored in any cache.
    NoStore,
    /// Freshness lifetime in seconds.
    MaxAge(u64),
}

impl CacheDirective {
    fn as_header_value(&self) -> String {
        match self {
            Self::Public => "public".to_owned(),
            Self::Private => "private".to_owned(),
            Self::NoCache => "no-cache".to_owned(),
            Self::NoStore => "no-store".to_owned(),
            Self::MaxAge(secs) => format!("max-age={secs}"),
        }
    }
}

/// An ordered set of `Cache-Control` directives derived from a policy.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use outcache::policy::CachePolicy;
/// use outcache::cache::CacheControl;
///
/// let policy = CachePolicy::named("p").ttl(Duration::from_secs(60)).public();
/// assert_eq!(CacheControl::from_policy(&policy).to_string(), "public, max-age=60");
/// ```
#[derive(Debug, Clone, Default)]
pub struct CacheControl {
    directives: Vec<CacheDirective>,
}

impl CacheControl {
    /// Derives the directive set a policy's responses carry.
    ///
    /// `no-store` suppresses `max-age` — a lifetime for a response that must
    /// never be stored would contradict itself.
    pub fn from_policy(policy: &CachePolicy) -> Self {
        let mut directives = Vec::new();
        match policy.visibility() {
            Visibility::Public => directives.push(CacheDirective::Public),
            Visibility::Private => directives.push(CacheDirective::Private),
            Visibility::Unspecified => {}
        }
        if policy.is_no_cache() {
            directives.push(CacheDirective::NoCache);
        }
        if policy.is_no_store() {
            directives.push(CacheDirective::NoStore);
        } else {
            directives.push(CacheDirective::MaxAge(policy.max_age().as_secs()));
        }
        Self { directives }
    }
}

impl fmt::Display for CacheControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .directives
            .iter()
            .map(CacheDirective::as_header_value)
            .collect();
        f.write_str(&rendered.join(", "))
    }
}

/// Validator metadata stored with a cache entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validators {
    /// Production time, truncated to whole seconds (HTTP-date resolution).
    pub last_modified: Option<SystemTime>,
    /// Quoted content-hash entity tag.
    pub etag: Option<String>,
}

impl Validators {
    /// Computes validators for a freshly produced body.
    ///
    /// The entity tag is the SHA-256 of the payload, so identical bodies get
    /// identical tags across productions; `last_modified` is truncated to
    /// second resolution because HTTP-dates cannot carry anything finer and
    /// an untruncated timestamp would never compare equal to a parsed
    /// `If-Modified-Since`.
    pub fn for_body(body: &[u8], produced_at: SystemTime) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(body);
        let etag = format!("\"{:x}\"", hasher.finalize());
        Self {
            last_modified: Some(truncate_to_seconds(produced_at)),
            etag: Some(etag),
        }
    }

    /// Carries the previous `last_modified` forward when the content has not
    /// actually changed, keeping the advertised modification time stable so
    /// client conditionals keep matching across re-productions.
    pub fn inherit_unchanged(mut self, previous: Option<&Validators>) -> Self {
        if let Some(prev) = previous {
            if prev.etag.is_some() && prev.etag == self.etag {
                self.last_modified = prev.last_modified;
            }
        }
        self
    }
}

/// Stamps `Cache-Control` and validator headers onto a response.
///
/// Replace semantics: whatever the producer may have set for these headers
/// is overridden by the policy-derived values.
pub fn annotate(mut response: Response, policy: &CachePolicy, validators: &Validators) -> Response {
    response.set_header("Cache-Control", CacheControl::from_policy(policy).to_string());
    if let Some(last_modified) = validators.last_modified {
        response.set_header("Last-Modified", httpdate::fmt_http_date(last_modified));
    }
    if let Some(etag) = &validators.etag {
        response.set_header("ETag", etag.clone());
    }
    response
}

/// Evaluates a request's conditional headers against stored validators.
///
/// `If-None-Match` wins when both the header and a stored entity tag are
/// present (exact string equality); otherwise `If-Modified-Since` is
/// compared against the stored modification time. Absent validators mean
/// "not fresh" — the caller must send the full response.
pub fn is_fresh(request: &Request, validators: &Validators) -> bool {
    if let (Some(if_none_match), Some(etag)) = (request.if_none_match(), validators.etag.as_deref())
    {
        return if_none_match == etag;
    }
    if let (Some(if_modified_since), Some(last_modified)) =
        (request.if_modified_since(), validators.last_modified)
    {
        return last_modified <= if_modified_since;
    }
    false
}

// HTTP-dates have second resolution; anything finer can never round-trip.
fn truncate_to_seconds(t: SystemTime) -> SystemTime {
    match t.duration_since(UNIX_EPOCH) {
        Ok(since) => UNIX_EPOCH + Duration::from_secs(since.as_secs()),
        Err(_) => t,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::StatusCode;
    use std::time::Duration;

    fn request_with(headers: &str) -> Request {
        let raw = format!("GET / HTTP/1.1\r\nHost: x\r\n{headers}\r\n");
        Request::parse(raw.as_bytes()).unwrap().0
    }

    #[test]
    fn directives_public_max_age() {
        let policy = CachePolicy::named("p").ttl(Duration::from_secs(30)).public();
        assert_eq!(CacheControl::from_policy(&policy).to_string(), "public, max-age=30");
    }

    #[test]
    fn directives_no_cache_keeps_max_age() {
        let policy = CachePolicy::named("p").ttl(Duration::from_secs(10)).no_cache();
        assert_eq!(CacheControl::from_policy(&policy).to_string(), "no-cache, max-age=10");
    }

    #[test]
    fn directives_no_store_suppresses_max_age() {
        let policy = CachePolicy::named("p").ttl(Duration::from_secs(10)).no_store();
        assert_eq!(CacheControl::from_policy(&policy).to_string(), "no-store");
    }

    #[test]
    fn directives_private_revalidate() {
        let policy = CachePolicy::named("p").private().no_cache();
        assert_eq!(CacheControl::from_policy(&policy).to_string(), "private, no-cache, max-age=0");
    }

    #[test]
    fn etag_is_deterministic() {
        let now = SystemTime::now();
        let a = Validators::for_body(b"same body", now);
        let b = Validators::for_body(b"same body", now);
        assert_eq!(a.etag, b.etag);
        assert_ne!(a.etag, Validators::for_body(b"other body", now).etag);
    }

    #[test]
    fn last_modified_truncated_to_seconds() {
        let t = UNIX_EPOCH + Duration::new(1_700_000_000, 999_999_999);
        let v = Validators::for_body(b"x", t);
        assert_eq!(v.last_modified, Some(UNIX_EPOCH + Duration::from_secs(1_700_000_000)));
    }

    #[test]
    fn inherit_keeps_old_timestamp_for_unchanged_body() {
        let old = Validators::for_body(b"body", UNIX_EPOCH + Duration::from_secs(100));
        let new = Validators::for_body(b"body", UNIX_EPOCH + Duration::from_secs(200))
            .inherit_unchanged(Some(&old));
        assert_eq!(new.last_modified, old.last_modified);
    }

    #[test]
    fn inherit_updates_timestamp_for_changed_body() {
        let old = Validators::for_body(b"v1", UNIX_EPOCH + Duration::from_secs(100));
        let new = Validators::for_body(b"v2", UNIX_EPOCH + Duration::from_secs(200))
            .inherit_unchanged(Some(&old));
        assert_eq!(new.last_modified, Some(UNIX_EPOCH + Duration::from_secs(200)));
    }

    #[test]
    fn annotate_stamps_all_headers() {
        let policy = CachePolicy::named("p").ttl(Duration::from_secs(60)).public();
        let validators = Validators::for_body(b"hello", SystemTime::now());
        let response = annotate(
            Response::new(StatusCode::Ok).body("hello"),
            &policy,
            &validators,
        );
        assert_eq!(
            response.headers().get("cache-control"),
            Some("public, max-age=60")
        );
        assert!(response.headers().contains("last-modified"));
        assert!(response.headers().contains("etag"));
    }

    #[test]
    fn annotate_overrides_producer_headers() {
        let policy = CachePolicy::named("p").ttl(Duration::from_secs(5));
        let response = Response::new(StatusCode::Ok)
            .header("Cache-Control", "no-store")
            .body("x");
        let annotated = annotate(response, &policy, &Validators::default());
        assert_eq!(annotated.headers().get("cache-control"), Some("max-age=5"));
    }

    #[test]
    fn fresh_when_etag_matches() {
        let validators = Validators::for_body(b"payload", SystemTime::now());
        let etag = validators.etag.clone().unwrap();
        let request = request_with(&format!("If-None-Match: {etag}\r\n"));
        assert!(is_fresh(&request, &validators));
    }

    #[test]
    fn stale_when_etag_differs() {
        let validators = Validators::for_body(b"payload", SystemTime::now());
        let request = request_with("If-None-Match: \"deadbeef\"\r\n");
        assert!(!is_fresh(&request, &validators));
    }

    #[test]
    fn fresh_when_not_modified_since() {
        let produced = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let validators = Validators::for_body(b"x", produced);
        let header = httpdate::fmt_http_date(produced);
        let request = request_with(&format!("If-Modified-Since: {header}\r\n"));
        assert!(is_fresh(&request, &validators));
    }

    #[test]
    fn stale_when_modified_after_client_copy() {
        let produced = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let validators = Validators::for_body(b"x", produced);
        let earlier = httpdate::fmt_http_date(produced - Duration::from_secs(60));
        let request = request_with(&format!("If-Modified-Since: {earlier}\r\n"));
        assert!(!is_fresh(&request, &validators));
    }

    #[test]
    fn etag_takes_precedence_over_date() {
        let produced = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let validators = Validators::for_body(b"x", produced);
        let date = httpdate::fmt_http_date(produced);
        // Date says fresh, entity tag says changed: tag wins.
        let request = request_with(&format!(
            "If-None-Match: \"old\"\r\nIf-Modified-Since: {date}\r\n"
        ));
        assert!(!is_fresh(&request, &validators));
    }

    #[test]
    fn no_validators_is_never_fresh() {
        let request = request_with("If-None-Match: \"anything\"\r\n");
        assert!(!is_fresh(&request, &Validators::default()));
    }

    #[test]
    fn no_conditionals_is_not_fresh() {
        let validators = Validators::for_body(b"x", SystemTime::now());
        let request = request_with("");
        assert!(!is_fresh(&request, &validators));
    }
}
