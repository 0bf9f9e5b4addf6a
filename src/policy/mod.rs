//! Cache policies and the startup-time policy registry.
//!
//! A [`CachePolicy`] names a TTL, the query parameters the cache key varies
//! on, the tags its entries are grouped under for bulk eviction, and the
//! client-facing directives (`public`/`private`/`no-cache`/`no-store`).
//! Policies are registered once at startup in a [`PolicyRegistry`] and held
//! immutably behind [`Arc`] afterwards; every misconfiguration is rejected
//! at registration, never at request time.
//!
//! Policies can also be declared in configuration and loaded in bulk via
//! [`PolicySpec`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Client-facing cacheability of a response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// No `public`/`private` directive is emitted.
    #[default]
    Unspecified,
    /// Any cache (browser, proxy, CDN) may store the response.
    Public,
    /// Only the requesting client's cache may store the response.
    Private,
}

/// Errors raised while registering or resolving cache policies.
///
/// All of these indicate a configuration mistake and are surfaced at
/// startup; none of them can occur on the request path.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown cache policy {name:?}")]
    UnknownPolicy { name: String },

    #[error("cache policy {name:?} is already registered")]
    DuplicatePolicy { name: String },

    #[error("no base cache policy has been registered")]
    NoBasePolicy,

    #[error("policy {name:?}: no-store cannot be combined with public or private")]
    NoStoreWithVisibility { name: String },

    #[error("policy {name:?}: private responses must not be stored in the shared output cache")]
    PrivateStored { name: String },
}

/// A named, immutable output-caching configuration.
///
/// Built with the consuming builder methods and validated when handed to
/// [`PolicyRegistry::register`]. The empty name designates the base policy,
/// applied to every route that does not select a named policy.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use outcache::policy::CachePolicy;
///
/// let policy = CachePolicy::named("Vary30")
///     .ttl(Duration::from_secs(30))
///     .vary_on(["varyOnThis"])
///     .public();
///
/// assert_eq!(policy.name(), "Vary30");
/// assert_eq!(policy.max_age(), Duration::from_secs(30));
/// ```
#[derive(Debug, Clone)]
pub struct CachePolicy {
    name: String,
    ttl: Duration,
    vary_query_keys: Vec<String>,
    tags: Vec<String>,
    visibility: Visibility,
    no_cache: bool,
    no_store: bool,
}

impl CachePolicy {
    /// Creates the base policy (empty name) with a zero TTL.
    pub fn base() -> Self {
        Self::named("")
    }

    /// Creates a named policy with a zero TTL.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ttl: Duration::ZERO,
            vary_query_keys: Vec::new(),
            tags: Vec::new(),
            visibility: Visibility::Unspecified,
            no_cache: false,
            no_store: false,
        }
    }

    /// Sets the time-to-live for entries stored under this policy.
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Declares the query parameters the cache key varies on.
    ///
    /// Keys are canonicalized (sorted, deduplicated) so two policies listing
    /// the same keys in different order build identical key shapes.
    #[must_use]
    pub fn vary_on<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.vary_query_keys.extend(keys.into_iter().map(Into::into));
        self.vary_query_keys.sort();
        self.vary_query_keys.dedup();
        self
    }

    /// Attaches an eviction tag to entries stored under this policy.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Marks responses as storable by any cache (`Cache-Control: public`).
    #[must_use]
    pub fn public(mut self) -> Self {
        self.visibility = Visibility::Public;
        self
    }

    /// Marks responses as storable only by the client (`Cache-Control: private`).
    #[must_use]
    pub fn private(mut self) -> Self {
        self.visibility = Visibility::Private;
        self
    }

    /// Requires revalidation before any stored copy is served
    /// (`Cache-Control: no-cache`).
    ///
    /// The output cache records validators and tags for such entries but
    /// never serves their payload without a successful conditional check.
    #[must_use]
    pub fn no_cache(mut self) -> Self {
        self.no_cache = true;
        self
    }

    /// Forbids storing the response anywhere (`Cache-Control: no-store`).
    ///
    /// The output cache creates no record at all for such routes.
    #[must_use]
    pub fn no_store(mut self) -> Self {
        self.no_store = true;
        self
    }

    /// The policy name; empty for the base policy.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Freshness lifetime of stored entries, also emitted as `max-age`.
    pub fn max_age(&self) -> Duration {
        self.ttl
    }

    /// The canonicalized (sorted, deduplicated) vary keys.
    pub fn vary_keys(&self) -> &[String] {
        &self.vary_query_keys
    }

    /// Eviction tags attached to entries stored under this policy.
    pub fn cache_tags(&self) -> &[String] {
        &self.tags
    }

    /// Client-facing visibility directive.
    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    /// `true` when every hit must pass a conditional check before serving.
    pub fn is_no_cache(&self) -> bool {
        self.no_cache
    }

    /// `true` when the response must never be stored, server-side included.
    pub fn is_no_store(&self) -> bool {
        self.no_store
    }

    /// `true` when this policy both stores entries and serves them directly —
    /// the server-side output caching path proper.
    pub fn stores_and_serves(&self) -> bool {
        !self.no_cache && !self.no_store
    }

    /// Checks directive combinations that contradict each other.
    ///
    /// - `no-store` makes a visibility directive meaningless: nothing may be
    ///   stored, so declaring who may store it is a mistake.
    /// - `private` promises the shared-cache layer will not keep a copy, which
    ///   the server-side store would break; it is only accepted together with
    ///   `no-cache` (validator bookkeeping is not shared-cache serving) or
    ///   `no-store`.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.no_store && self.visibility != Visibility::Unspecified {
            return Err(ConfigError::NoStoreWithVisibility {
                name: self.name.clone(),
            });
        }
        if self.visibility == Visibility::Private && self.stores_and_serves() {
            return Err(ConfigError::PrivateStored {
                name: self.name.clone(),
            });
        }
        Ok(())
    }
}

/// Declarative form of a [`CachePolicy`], loadable from configuration.
///
/// # Examples
///
/// ```
/// use outcache::policy::PolicySpec;
///
/// let spec: PolicySpec = serde_json::from_str(
///     r#"{ "name": "Vary30", "ttl_secs": 30, "vary": ["varyOnThis"], "visibility": "public" }"#,
/// ).unwrap();
/// let policy = spec.into_policy();
/// assert_eq!(policy.vary_keys(), ["varyOnThis"]);
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct PolicySpec {
    /// Policy name; omit (or empty) for the base policy.
    #[serde(default)]
    pub name: String,
    /// Entry time-to-live in whole seconds.
    #[serde(default)]
    pub ttl_secs: u64,
    /// Query parameters the cache key varies on.
    #[serde(default)]
    pub vary: Vec<String>,
    /// Eviction tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// `public` / `private` / `unspecified`.
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub no_cache: bool,
    #[serde(default)]
    pub no_store: bool,
}

impl PolicySpec {
    /// Converts the spec into a [`CachePolicy`]; validation still happens at
    /// registration.
    pub fn into_policy(self) -> CachePolicy {
        let mut policy = CachePolicy::named(self.name)
            .ttl(Duration::from_secs(self.ttl_secs))
            .vary_on(self.vary);
        for tag in self.tags {
            policy = policy.tag(tag);
        }
        policy = match self.visibility {
            Visibility::Public => policy.public(),
            Visibility::Private => policy.private(),
            Visibility::Unspecified => policy,
        };
        if self.no_cache {
            policy = policy.no_cache();
        }
        if self.no_store {
            policy = policy.no_store();
        }
        policy
    }
}

/// Startup-time registry of the base policy and all named policies.
///
/// Routes resolve their policy once, at registration, and hold the returned
/// [`Arc`] for the lifetime of the process; an unknown policy name is
/// therefore a startup failure, never a per-request one.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use outcache::policy::{CachePolicy, PolicyRegistry};
///
/// let mut registry = PolicyRegistry::new();
/// registry.register(CachePolicy::base().ttl(Duration::from_secs(10))).unwrap();
/// registry.register(CachePolicy::named("Tagged20")
///     .ttl(Duration::from_secs(20))
///     .tag("tag-expire")).unwrap();
///
/// let base = registry.resolve(None).unwrap();
/// assert_eq!(base.max_age(), Duration::from_secs(10));
/// assert!(registry.resolve(Some("nope")).is_err());
/// ```
#[derive(Debug, Default)]
pub struct PolicyRegistry {
    base: Option<Arc<CachePolicy>>,
    named: HashMap<String, Arc<CachePolicy>>,
}

impl PolicyRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a policy, validating its directive combination.
    ///
    /// Re-registering the base policy replaces it; re-registering a named
    /// policy is a configuration error.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::DuplicatePolicy`] — a named policy with this name exists.
    /// - [`ConfigError::NoStoreWithVisibility`] — `no-store` combined with
    ///   `public` or `private`.
    /// - [`ConfigError::PrivateStored`] — `private` combined with the
    ///   server-side storing path.
    pub fn register(&mut self, policy: CachePolicy) -> Result<(), ConfigError> {
        policy.validate()?;
        let policy = Arc::new(policy);
        if policy.name().is_empty() {
            self.base = Some(policy);
        } else if self.named.contains_key(policy.name()) {
            return Err(ConfigError::DuplicatePolicy {
                name: policy.name().to_owned(),
            });
        } else {
            self.named.insert(policy.name().to_owned(), policy);
        }
        Ok(())
    }

    /// Registers a batch of declarative specs; the first invalid spec aborts.
    pub fn register_specs<I>(&mut self, specs: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = PolicySpec>,
    {
        for spec in specs {
            self.register(spec.into_policy())?;
        }
        Ok(())
    }

    /// Resolves the policy a route should use.
    ///
    /// `None` selects the base policy.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::UnknownPolicy`] — no named policy with this name.
    /// - [`ConfigError::NoBasePolicy`] — base requested but never registered.
    pub fn resolve(&self, name: Option<&str>) -> Result<Arc<CachePolicy>, ConfigError> {
        match name {
            Some(name) => self
                .named
                .get(name)
                .cloned()
                .ok_or_else(|| ConfigError::UnknownPolicy {
                    name: name.to_owned(),
                }),
            None => self.base.clone().ok_or(ConfigError::NoBasePolicy),
        }
    }

    /// Number of registered policies, the base policy included.
    pub fn len(&self) -> usize {
        self.named.len() + usize::from(self.base.is_some())
    }

    /// `true` if nothing has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_policy_replaces_previous_base() {
        let mut reg = PolicyRegistry::new();
        reg.register(CachePolicy::base().ttl(Duration::from_secs(5)))
            .unwrap();
        reg.register(CachePolicy::base().ttl(Duration::from_secs(10)))
            .unwrap();
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.resolve(None).unwrap().max_age(), Duration::from_secs(10));
    }

    #[test]
    fn duplicate_named_policy_rejected() {
        let mut reg = PolicyRegistry::new();
        reg.register(CachePolicy::named("a")).unwrap();
        let err = reg.register(CachePolicy::named("a")).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicatePolicy { name } if name == "a"));
    }

    #[test]
    fn unknown_policy_is_config_error() {
        let reg = PolicyRegistry::new();
        assert!(matches!(
            reg.resolve(Some("missing")),
            Err(ConfigError::UnknownPolicy { .. })
        ));
    }

    #[test]
    fn missing_base_is_config_error() {
        let reg = PolicyRegistry::new();
        assert!(matches!(reg.resolve(None), Err(ConfigError::NoBasePolicy)));
    }

    #[test]
    fn no_store_with_public_rejected() {
        let mut reg = PolicyRegistry::new();
        let err = reg
            .register(CachePolicy::named("bad").no_store().public())
            .unwrap_err();
        assert!(matches!(err, ConfigError::NoStoreWithVisibility { .. }));
    }

    #[test]
    fn no_store_with_private_rejected() {
        let mut reg = PolicyRegistry::new();
        let err = reg
            .register(CachePolicy::named("bad").no_store().private())
            .unwrap_err();
        assert!(matches!(err, ConfigError::NoStoreWithVisibility { .. }));
    }

    #[test]
    fn private_with_storing_path_rejected() {
        let mut reg = PolicyRegistry::new();
        let err = reg
            .register(CachePolicy::named("bad").ttl(Duration::from_secs(30)).private())
            .unwrap_err();
        assert!(matches!(err, ConfigError::PrivateStored { .. }));
    }

    #[test]
    fn private_with_no_cache_accepted() {
        let mut reg = PolicyRegistry::new();
        reg.register(CachePolicy::named("ok").private().no_cache())
            .unwrap();
        let policy = reg.resolve(Some("ok")).unwrap();
        assert!(!policy.stores_and_serves());
    }

    #[test]
    fn vary_keys_canonicalized() {
        let a = CachePolicy::named("a").vary_on(["b", "a", "b"]);
        let b = CachePolicy::named("b").vary_on(["a", "b"]);
        assert_eq!(a.vary_keys(), b.vary_keys());
    }

    #[test]
    fn spec_into_policy() {
        let spec: PolicySpec = serde_json::from_str(
            r#"{
                "name": "Tagged20",
                "ttl_secs": 20,
                "tags": ["tag-expire"],
                "visibility": "public"
            }"#,
        )
        .unwrap();
        let policy = spec.into_policy();
        assert_eq!(policy.name(), "Tagged20");
        assert_eq!(policy.max_age(), Duration::from_secs(20));
        assert_eq!(policy.cache_tags(), ["tag-expire"]);
        assert_eq!(policy.visibility(), Visibility::Public);
    }

    #[test]
    fn spec_defaults_to_base_policy() {
        let spec: PolicySpec = serde_json::from_str(r#"{ "ttl_secs": 10 }"#).unwrap();
        let policy = spec.into_policy();
        assert_eq!(policy.name(), "");
        assert!(policy.stores_and_serves());
    }

    #[test]
    fn register_specs_aborts_on_first_error() {
        let specs: Vec<PolicySpec> = serde_json::from_str(
            r#"[
                { "name": "ok", "ttl_secs": 5 },
                { "name": "bad", "ttl_secs": 5, "no_store": true, "visibility": "public" },
                { "name": "never", "ttl_secs": 5 }
            ]"#,
        )
        .unwrap();
        let mut reg = PolicyRegistry::new();
        assert!(reg.register_specs(specs).is_err());
        assert!(reg.resolve(Some("ok")).is_ok());
        assert!(reg.resolve(Some("never")).is_err());
    }
}
