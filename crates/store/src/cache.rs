use std::collections::VecDeque;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;
use serde_json::Value;
use statline_core::{CacheKey, Clock};
use tracing::debug;

pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

struct Entry {
    payload: Arc<Value>,
    inserted_at: Instant,
    ttl: Duration,
    seq: u64,
}

impl Entry {
    fn expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) > self.ttl
    }
}

#[derive(Default)]
struct Inner {
    map: FxHashMap<CacheKey, Entry>,
    // insertion order; stale seqs are skipped on eviction
    order: VecDeque<(CacheKey, u64)>,
    next_seq: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub evicted: u64,
}

/// TTL cache of parsed response payloads.
///
/// Entries are never updated in place: a fresh insert for an existing key
/// replaces the whole entry (last write wins).
pub struct ResponseCache {
    inner: RwLock<Inner>,
    clock: Arc<dyn Clock>,
    max_entries: usize,
    evicted: std::sync::atomic::AtomicU64,
}

impl ResponseCache {
    pub fn new(clock: Arc<dyn Clock>, max_entries: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            clock,
            max_entries: max_entries.max(1),
            evicted: Default::default(),
        }
    }

    /// Live payload for `key`, if any.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<Value>> {
        let now = self.clock.now();
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let entry = inner.map.get(key)?;
        if entry.expired(now) {
            debug!(key = %key, "cache entry expired");
            return None;
        }
        Some(Arc::clone(&entry.payload))
    }

    /// Insert with the given TTL. A zero TTL means "never cache" and is a no-op.
    pub fn insert(&self, key: CacheKey, payload: Arc<Value>, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        let now = self.clock.now();
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.order.push_back((key.clone(), seq));
        inner.map.insert(key, Entry { payload, inserted_at: now, ttl, seq });

        if inner.map.len() > self.max_entries {
            let purged = purge(&mut inner, now);
            let mut evicted = 0usize;
            while inner.map.len() > self.max_entries {
                let Some((old, old_seq)) = inner.order.pop_front() else { break };
                if inner.map.get(&old).map(|e| e.seq == old_seq).unwrap_or(false) {
                    inner.map.remove(&old);
                    evicted += 1;
                }
            }
            self.evicted.fetch_add(evicted as u64, std::sync::atomic::Ordering::Relaxed);
            debug!(purged, evicted, entries = inner.map.len(), "cache over capacity");
        } else if inner.order.len() > self.max_entries.saturating_mul(2) {
            compact(&mut inner);
        }
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        purge(&mut inner, now)
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.map.clear();
        inner.order.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).map.len()
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn stats(&self) -> CacheStats {
        CacheStats { entries: self.len(), evicted: self.evicted.load(std::sync::atomic::Ordering::Relaxed) }
    }
}

fn purge(inner: &mut Inner, now: Instant) -> usize {
    let before = inner.map.len();
    inner.map.retain(|_, e| !e.expired(now));
    compact(inner);
    before - inner.map.len()
}

/// Drop order slots whose key was replaced or removed since.
fn compact(inner: &mut Inner) {
    let map = &inner.map;
    inner.order.retain(|(k, seq)| map.get(k).map(|e| e.seq == *seq).unwrap_or(false));
}
