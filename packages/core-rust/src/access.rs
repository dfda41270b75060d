//! Per-request access context.
//!
//! The relay fills one [`AccessContext`] per GraphQL request with the
//! normalized query text, its fingerprint in production, and the operation
//! name; the access-log sink consumes it once the response status is known.

use std::collections::BTreeMap;

use md5::{Digest, Md5};

/// Access-context key holding the normalized query text.
pub const SCHEMA_KEY: &str = "schema";
/// Access-context key holding the query fingerprint (production only).
pub const SCHEMA_HASH_KEY: &str = "schema_hash";
/// Access-context key holding the requested operation name.
pub const OPERATION_KEY: &str = "operation";

/// Per-request key/value record handed to the access log.
///
/// Lives for one request. Keys iterate in sorted order so log lines are
/// stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessContext {
    entries: BTreeMap<String, String>,
}

impl AccessContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the context for a GraphQL request.
    ///
    /// Stores the normalized query under `schema`, its fingerprint under
    /// `schema_hash` when `fingerprint` is set, and the operation name under
    /// `operation` when one was given.
    #[must_use]
    pub fn for_query(query: &str, operation_name: &str, fingerprint: bool) -> Self {
        let mut ctx = Self::new();
        let normalized = normalize_query(query);
        if fingerprint {
            ctx.insert(SCHEMA_HASH_KEY, query_fingerprint(&normalized));
        }
        ctx.insert(SCHEMA_KEY, normalized);
        if !operation_name.is_empty() {
            ctx.insert(OPERATION_KEY, operation_name);
        }
        ctx
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Collapses every run of ASCII whitespace to one space and trims the ends.
#[must_use]
pub fn normalize_query(query: &str) -> String {
    query.split_ascii_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercase hex MD5 of the normalized query.
///
/// Groups identical queries for observability; not a security primitive.
#[must_use]
pub fn query_fingerprint(normalized: &str) -> String {
    hex::encode(Md5::digest(normalized.as_bytes()))
}
