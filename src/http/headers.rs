//! HTTP header map with case-insensitive name lookup.
//!
//! Header names are case-insensitive per RFC 9110 §5; insertion order is
//! preserved. [`Headers::insert`] appends (multi-value fields such as
//! `Set-Cookie`), while [`Headers::set`] replaces — the cache layer stamps
//! `Cache-Control`, `Last-Modified`, and `ETag` with replace semantics so a
//! response never carries two conflicting freshness headers.

use std::fmt;

/// A case-insensitive, order-preserving HTTP header map.
///
/// # Examples
///
/// ```
/// use outcache::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.insert("Cache-Control", "public, max-age=60");
/// assert_eq!(headers.get("cache-control"), Some("public, max-age=60"));
///
/// // Replace semantics: the old value is gone.
/// headers.set("Cache-Control", "no-store");
/// assert_eq!(headers.get("CACHE-CONTROL"), Some("no-store"));
/// assert_eq!(headers.len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Headers {
    inner: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a header map with pre-allocated capacity for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Vec::with_capacity(capacity),
        }
    }

    /// Appends a header entry. Multiple values for the same name are preserved.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.push((name.into(), value.into()));
    }

    /// Replaces every entry with the given name by a single new value.
    ///
    /// Equivalent to [`remove`](Self::remove) followed by [`insert`](Self::insert).
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.inner.push((name, value.into()));
    }

    /// Returns the first value for the given header name (case-insensitive), or `None`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Removes all entries with the given header name (case-insensitive).
    ///
    /// Returns `true` if any entries were removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.inner.len();
        self.inner.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.inner.len() < before
    }

    /// Returns `true` if the map contains at least one entry with the given name.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    /// Returns the total number of header entries (not unique names).
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if there are no header entries.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns an iterator over all `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.inner {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_insensitive_get() {
        let mut h = Headers::new();
        h.insert("Last-Modified", "Mon, 01 Jan 2024 00:00:00 GMT");
        assert_eq!(h.get("last-modified"), Some("Mon, 01 Jan 2024 00:00:00 GMT"));
        assert_eq!(h.get("LAST-MODIFIED"), Some("Mon, 01 Jan 2024 00:00:00 GMT"));
    }

    #[test]
    fn insert_is_additive() {
        let mut h = Headers::new();
        h.insert("X-Tag", "a");
        h.insert("X-Tag", "b");
        assert_eq!(h.len(), 2);
        // `get` returns the first entry
        assert_eq!(h.get("x-tag"), Some("a"));
    }

    #[test]
    fn set_replaces_all_values() {
        let mut h = Headers::new();
        h.insert("Cache-Control", "public");
        h.insert("cache-control", "max-age=10");
        h.set("Cache-Control", "no-store");
        assert_eq!(h.len(), 1);
        assert_eq!(h.get("cache-control"), Some("no-store"));
    }

    #[test]
    fn set_on_absent_name_inserts() {
        let mut h = Headers::new();
        h.set("ETag", "\"abc\"");
        assert_eq!(h.get("etag"), Some("\"abc\""));
    }

    #[test]
    fn remove() {
        let mut h = Headers::new();
        h.insert("X-Foo", "bar");
        h.insert("X-Foo", "baz");
        assert!(h.remove("x-foo"));
        assert!(h.is_empty());
        assert!(!h.remove("x-foo")); // already gone
    }

    #[test]
    fn contains() {
        let mut h = Headers::new();
        h.insert("ETag", "\"v1\"");
        assert!(h.contains("etag"));
        assert!(!h.contains("last-modified"));
    }
}
