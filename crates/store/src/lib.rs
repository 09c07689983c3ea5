//! Statline store: the process-wide mutable state behind the executor.
//!
//! `ResponseCache` holds parsed payloads keyed by `CacheKey` with per-entry TTL.
//! `AdmissionController` meters calls per credential through keyed `governor` limiters.
//! Both take an injected `Clock` so expiry can be driven by tests.

#![forbid(unsafe_code)]

mod admission;
mod cache;

pub use admission::{Admission, AdmissionController, RateWindow};
pub use cache::{CacheStats, ResponseCache, DEFAULT_MAX_ENTRIES};

/// Round a wait up to whole seconds, never below one.
pub(crate) fn ceil_secs(d: std::time::Duration) -> u64 {
    let secs = d.as_secs() + u64::from(d.subsec_nanos() > 0);
    secs.max(1)
}
