//! Statline catalog: the set of loaded endpoint descriptors.
//!
//! The whole index lives in one immutable `CatalogSnapshot` behind an `ArcSwap`.
//! A load builds a complete new snapshot and swaps it in, so readers see either the
//! previous catalog or the new one, never a mix. A failed load leaves the old one in place.

#![forbid(unsafe_code)]

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use rustc_hash::FxHashMap;
use statline_core::{DescriptorError, EndpointDescriptor};
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("unknown endpoint `{0}`")]
    NotFound(String),
    #[error("catalog load failed: {0}")]
    Load(#[from] DescriptorError),
}

/// One complete, immutable catalog generation.
#[derive(Default)]
pub struct CatalogSnapshot {
    pub epoch: u64,
    endpoints: Vec<Arc<EndpointDescriptor>>,
    by_id: FxHashMap<String, usize>,
    // lowercased category -> indices in insertion order
    by_category: FxHashMap<String, Vec<usize>>,
    // lowercased haystacks, one per endpoint
    texts: Vec<SearchText>,
}

#[derive(Default)]
struct SearchText {
    fields: Vec<String>,
    joined: String,
}

impl SearchText {
    fn of(d: &EndpointDescriptor) -> Self {
        let mut fields = vec![d.id.to_lowercase(), d.description.to_lowercase(), d.category.to_lowercase()];
        if let Some(sub) = d.subcategory.as_deref() { fields.push(sub.to_lowercase()); }
        fields.extend(d.keywords.iter().map(|k| k.to_lowercase()));
        let joined = fields.join(" ");
        Self { fields, joined }
    }
}

/// A ranked search result.
#[derive(Debug, Clone)]
pub struct Hit {
    pub endpoint: Arc<EndpointDescriptor>,
    pub score: i64,
}

impl CatalogSnapshot {
    fn build(epoch: u64, descriptors: Vec<EndpointDescriptor>) -> Self {
        let mut snap = CatalogSnapshot { epoch, ..Default::default() };
        for (i, d) in descriptors.into_iter().enumerate() {
            snap.by_id.insert(d.id.clone(), i);
            snap.by_category.entry(d.category.to_lowercase()).or_default().push(i);
            snap.texts.push(SearchText::of(&d));
            snap.endpoints.push(Arc::new(d));
        }
        snap
    }

    pub fn len(&self) -> usize { self.endpoints.len() }
    pub fn is_empty(&self) -> bool { self.endpoints.is_empty() }

    pub fn get(&self, id: &str) -> Option<Arc<EndpointDescriptor>> {
        self.by_id.get(id).map(|i| Arc::clone(&self.endpoints[*i]))
    }

    pub fn all(&self) -> Vec<Arc<EndpointDescriptor>> { self.endpoints.clone() }

    pub fn list_by_category(&self, category: &str) -> Vec<Arc<EndpointDescriptor>> {
        self.by_category
            .get(&category.trim().to_lowercase())
            .map(|idx| idx.iter().map(|i| Arc::clone(&self.endpoints[*i])).collect())
            .unwrap_or_default()
    }

    /// Distinct categories in first-seen order.
    pub fn categories(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for d in self.endpoints.iter() {
            if !out.iter().any(|c| c.eq_ignore_ascii_case(&d.category)) { out.push(d.category.clone()); }
        }
        out
    }

    /// Case-insensitive substring search over id, description, category and keywords.
    /// Every whitespace-separated term must match some field. Blank query returns everything.
    pub fn search(&self, query: &str) -> Vec<Arc<EndpointDescriptor>> {
        let terms: Vec<String> = query.split_whitespace().map(|t| t.to_lowercase()).collect();
        if terms.is_empty() { return self.all(); }
        self.endpoints
            .iter()
            .zip(self.texts.iter())
            .filter(|(_, t)| terms.iter().all(|term| t.fields.iter().any(|f| f.contains(term.as_str()))))
            .map(|(d, _)| Arc::clone(d))
            .collect()
    }

    /// Fuzzy ranked search, best first; ties keep insertion order.
    pub fn search_ranked(&self, query: &str, limit: usize) -> Vec<Hit> {
        let q = query.trim().to_lowercase();
        if q.is_empty() {
            return self.endpoints.iter().take(limit).map(|d| Hit { endpoint: Arc::clone(d), score: 0 }).collect();
        }
        let matcher = SkimMatcherV2::default();
        let mut scored: Vec<(usize, i64)> = self
            .texts
            .iter()
            .enumerate()
            .filter_map(|(i, t)| matcher.fuzzy_match(&t.joined, &q).map(|s| (i, s)))
            .collect();
        scored.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        scored
            .into_iter()
            .take(limit)
            .map(|(i, score)| Hit { endpoint: Arc::clone(&self.endpoints[i]), score })
            .collect()
    }
}

/// Process catalog handle, owned by the host and shared by reference.
pub struct Catalog {
    snap: ArcSwap<CatalogSnapshot>,
    epoch: AtomicU64,
}

impl Default for Catalog {
    fn default() -> Self { Self::new() }
}

impl Catalog {
    pub fn new() -> Self {
        Self { snap: ArcSwap::from_pointee(CatalogSnapshot::default()), epoch: AtomicU64::new(0) }
    }

    pub fn from_source(text: &str) -> Result<Self, CatalogError> {
        let c = Self::new();
        c.load_str(text)?;
        Ok(c)
    }

    /// Parse and swap in a new catalog. Returns the number of endpoints loaded.
    pub fn load_str(&self, text: &str) -> Result<usize, CatalogError> {
        match statline_schema::parse_source(text) {
            Ok(eps) => Ok(self.replace(eps)),
            Err(e) => {
                warn!(error = %e, "catalog load rejected; keeping previous catalog");
                Err(e.into())
            }
        }
    }

    pub fn load_path(&self, path: &Path) -> Result<usize, CatalogError> {
        match statline_schema::read_source(path) {
            Ok(eps) => Ok(self.replace(eps)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "catalog load rejected; keeping previous catalog");
                Err(e.into())
            }
        }
    }

    /// Swap in already-validated descriptors.
    pub fn replace(&self, descriptors: Vec<EndpointDescriptor>) -> usize {
        let epoch = self.epoch.fetch_add(1, Ordering::Relaxed) + 1;
        let next = Arc::new(CatalogSnapshot::build(epoch, descriptors));
        let n = next.len();
        self.snap.store(next);
        metrics::gauge!("statline_catalog_endpoints", n as f64);
        info!(epoch, endpoints = n, "catalog loaded");
        n
    }

    /// Consistent view for callers that need several reads against one generation.
    pub fn current(&self) -> Arc<CatalogSnapshot> { self.snap.load_full() }

    pub fn get(&self, id: &str) -> Result<Arc<EndpointDescriptor>, CatalogError> {
        self.snap.load().get(id).ok_or_else(|| CatalogError::NotFound(id.to_string()))
    }

    pub fn list_by_category(&self, category: &str) -> Vec<Arc<EndpointDescriptor>> {
        self.snap.load().list_by_category(category)
    }

    pub fn categories(&self) -> Vec<String> { self.snap.load().categories() }

    pub fn search(&self, query: &str) -> Vec<Arc<EndpointDescriptor>> { self.snap.load().search(query) }

    pub fn search_ranked(&self, query: &str, limit: usize) -> Vec<Hit> { self.snap.load().search_ranked(query, limit) }

    pub fn len(&self) -> usize { self.snap.load().len() }
    pub fn is_empty(&self) -> bool { self.snap.load().is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
namespace: football
endpoints:
  - { id: leagues, path: /leagues, category: reference, description: Leagues and cups, keywords: [competitions] }
  - { id: teams, path: /teams, category: Teams, description: Team information, keywords: [clubs, venue] }
  - { id: countries, path: /countries, category: reference, description: Country list }
"#;

    #[test]
    fn category_listing_keeps_insertion_order() {
        let c = Catalog::from_source(DOC).unwrap();
        let ids: Vec<_> = c.list_by_category("Reference").iter().map(|d| d.id.clone()).collect();
        assert_eq!(ids, vec!["leagues", "countries"]);
        assert_eq!(c.categories(), vec!["reference", "Teams"]);
        assert!(c.list_by_category("odds").is_empty());
    }

    #[test]
    fn search_is_case_insensitive_across_fields() {
        let c = Catalog::from_source(DOC).unwrap();
        let ids = |q: &str| c.search(q).iter().map(|d| d.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids("CLUBS"), vec!["teams"]);
        assert_eq!(ids("country"), vec!["countries"]);
        assert_eq!(ids("teams"), vec!["teams"]);
        assert_eq!(ids("reference cups"), vec!["leagues"]);
        assert_eq!(ids("   ").len(), 3);
        assert!(ids("basketball").is_empty());
    }

    #[test]
    fn ranked_search_puts_best_match_first() {
        let c = Catalog::from_source(DOC).unwrap();
        let hits = c.search_ranked("venue", 10);
        assert_eq!(hits[0].endpoint.id, "teams");
        assert_eq!(c.search_ranked("", 2).len(), 2);
    }
}
