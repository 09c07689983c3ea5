//! Resolved parameter sets and cache keys.

use std::collections::BTreeMap;

use serde::Serialize;

/// Parameters after defaults and validation. Sorted by name, so iteration order is canonical.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolvedParams(BTreeMap<String, String>);

impl ResolvedParams {
    pub fn new() -> Self { Self::default() }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> { self.0.get(name).map(|s| s.as_str()) }

    /// Present means supplied with a non-blank value.
    pub fn is_present(&self, name: &str) -> bool {
        self.0.get(name).map(|v| !v.trim().is_empty()).unwrap_or(false)
    }

    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Copy with one parameter replaced (used for paging).
    pub fn with(&self, name: &str, value: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.insert(name, value);
        next
    }

    /// Deterministic `k=v&k=v` form; equal maps always produce equal strings.
    pub fn canonical(&self) -> String {
        let mut out = String::new();
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 { out.push('&'); }
            escape_into(&mut out, k);
            out.push('=');
            escape_into(&mut out, v);
        }
        out
    }
}

fn escape_into(out: &mut String, s: &str) {
    for ch in s.chars() {
        match ch {
            '%' => out.push_str("%25"),
            '&' => out.push_str("%26"),
            '=' => out.push_str("%3D"),
            c => out.push(c),
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ResolvedParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut p = ResolvedParams::new();
        for (k, v) in iter { p.insert(k, v); }
        p
    }
}

/// Response cache key: `(namespace, endpoint path, canonical parameters)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub namespace: String,
    pub path: String,
    pub params: String,
}

impl CacheKey {
    pub fn new(namespace: &str, path: &str, params: &ResolvedParams) -> Self {
        Self { namespace: namespace.to_string(), path: path.to_string(), params: params.canonical() }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}?{}", self.namespace, self.path, self.params)
    }
}
