//! Statline engine façade.
//!
//! The host call: `(endpoint id, parameter map) -> rows`. The engine resolves the
//! descriptor from the catalog, validates the parameters, runs the executor and
//! flattens the payload. Catalog, cache and limiter are explicit instances owned
//! by the engine, never process globals.

#![forbid(unsafe_code)]

mod config;
mod error;

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use statline_catalog::Catalog;
use statline_client::{Executor, ReqwestTransport, Transport};
use statline_core::{Clock, EndpointDescriptor, PagingPolicy, ResolvedParams, Row, SystemClock};
use statline_flatten::FlattenWarning;
use statline_store::{AdmissionController, ResponseCache};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub use config::{base_url_var, default_base_urls, ConfigError, EngineConfig};
pub use error::EngineError;
pub use statline_client::CallStats;

/// Rows of one host call plus what happened along the way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fetched {
    pub rows: Vec<Row>,
    pub warnings: Vec<FlattenWarning>,
    /// Pages requested (1 unless paging was walked).
    pub pages: u32,
    /// Cancellation stopped the call; `rows` holds what was produced before.
    pub cancelled: bool,
}

pub struct Engine {
    catalog: Arc<Catalog>,
    executor: Executor,
}

impl Engine {
    /// Engine talking to the real API over HTTP.
    pub fn new(catalog: Arc<Catalog>, config: &EngineConfig) -> Result<Self, EngineError> {
        let transport = Arc::new(ReqwestTransport::new()?);
        Ok(Self::with_parts(catalog, config, transport, Arc::new(SystemClock)))
    }

    /// Engine over an arbitrary transport and clock.
    pub fn with_parts(
        catalog: Arc<Catalog>,
        config: &EngineConfig,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = Arc::new(ResponseCache::new(Arc::clone(&clock), config.cache_max_entries));
        let limiter = Arc::new(AdmissionController::new(clock, config.rate_limits.clone()));
        let executor = Executor::new(transport, cache, limiter, config.client_config());
        Self { catalog, executor }
    }

    pub fn catalog(&self) -> &Catalog { &self.catalog }

    pub fn stats(&self) -> CallStats { self.executor.stats() }

    /// Drop expired cache entries; returns how many went.
    pub fn purge_cache(&self) -> usize { self.executor.cache().purge_expired() }

    /// Resolve and validate without touching the network.
    pub fn prepare<I, K, V>(&self, id: &str, params: I) -> Result<(Arc<EndpointDescriptor>, ResolvedParams), EngineError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let d = self.catalog.get(id)?;
        let resolved = statline_schema::validate(&d, params)
            .map_err(|source| EngineError::Validation { endpoint: d.id.clone(), source })?;
        Ok((d, resolved))
    }

    /// The host call: validated, executed and flattened rows.
    pub async fn fetch<I, K, V>(&self, id: &str, params: I) -> Result<Vec<Row>, EngineError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        Ok(self.fetch_with_cancel(id, params, &CancellationToken::new()).await?.rows)
    }

    pub async fn fetch_with_cancel<I, K, V>(
        &self,
        id: &str,
        params: I,
        cancel: &CancellationToken,
    ) -> Result<Fetched, EngineError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let t0 = Instant::now();
        let (d, resolved) = self.prepare(id, params)?;
        let (_, mut fetched) = self.page(&d, &resolved, cancel).await?;
        fetched.pages = 1;
        info!(endpoint = %d.id, rows = fetched.rows.len(), took_ms = %t0.elapsed().as_millis(), "fetch ok");
        Ok(fetched)
    }

    /// Raw payload for a validated call, before flattening.
    pub async fn fetch_payload<I, K, V>(&self, id: &str, params: I) -> Result<Arc<Value>, EngineError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let (d, resolved) = self.prepare(id, params)?;
        self.executor
            .execute(&d, &resolved)
            .await
            .map_err(|source| EngineError::Execution { endpoint: d.id.clone(), source })
    }

    /// Walk every page of a paged endpoint and concatenate the rows.
    ///
    /// Pages run from 1 to `min(total, max_pages)`, where `total` is read from the first
    /// page's payload. Each page is its own cached, rate-limited call. An explicit page
    /// parameter from the caller, or an endpoint without paging, is a single fetch.
    pub async fn fetch_all<I, K, V>(&self, id: &str, params: I, cancel: &CancellationToken) -> Result<Fetched, EngineError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let t0 = Instant::now();
        let supplied: Vec<(String, String)> =
            params.into_iter().map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string())).collect();
        let d = self.catalog.get(id)?;
        let (param, max_pages, total_path) = match &d.paging {
            PagingPolicy::Page { param, max_pages, total_path }
                if !supplied.iter().any(|(k, v)| k.trim() == param && !v.trim().is_empty()) =>
            {
                (param.clone(), *max_pages, total_path.clone())
            }
            _ => return self.fetch_with_cancel(id, supplied, cancel).await,
        };

        let mut out = Fetched::default();
        let mut last = 1u32;
        let mut page = 1u32;
        while page <= last {
            if cancel.is_cancelled() {
                debug!(endpoint = %d.id, page, "paging cancelled");
                out.cancelled = true;
                break;
            }
            let mut with_page = supplied.clone();
            with_page.push((param.clone(), page.to_string()));
            // the descriptor captured above stays authoritative even if the catalog reloads mid-walk
            let resolved = statline_schema::validate(&d, with_page)
                .map_err(|source| EngineError::Validation { endpoint: d.id.clone(), source })?;
            let (payload, fetched) = match self.page(&d, &resolved, cancel).await {
                Ok(done) => done,
                Err(EngineError::Cancelled { .. }) => {
                    debug!(endpoint = %d.id, page, rows = out.rows.len(), "paging cancelled in flight");
                    out.cancelled = true;
                    break;
                }
                Err(e) => return Err(e),
            };
            if page == 1 {
                let total = statline_flatten::lookup_u64(&payload, &total_path).unwrap_or(1);
                last = u32::try_from(total).unwrap_or(u32::MAX).clamp(1, max_pages.max(1));
                debug!(endpoint = %d.id, total, last, "paging plan");
            }
            out.pages = page;
            out.rows.extend(fetched.rows);
            out.warnings.extend(fetched.warnings);
            if fetched.cancelled {
                out.cancelled = true;
                break;
            }
            page += 1;
        }
        statline_flatten::conform_rows(&mut out.rows);
        info!(endpoint = %d.id, pages = out.pages, rows = out.rows.len(), took_ms = %t0.elapsed().as_millis(), "fetch_all ok");
        Ok(out)
    }

    /// Execute one validated call and flatten it.
    async fn page(
        &self,
        d: &EndpointDescriptor,
        resolved: &ResolvedParams,
        cancel: &CancellationToken,
    ) -> Result<(Arc<Value>, Fetched), EngineError> {
        let payload = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(EngineError::Cancelled { endpoint: d.id.clone() }),
            r = self.executor.execute(d, resolved) => {
                r.map_err(|source| EngineError::Execution { endpoint: d.id.clone(), source })?
            }
        };
        let flat = statline_flatten::flatten_with_cancel(&d.response, &payload, cancel)
            .map_err(|source| EngineError::Flatten { endpoint: d.id.clone(), source })?;
        let fetched = Fetched { rows: flat.rows, warnings: flat.warnings, pages: 1, cancelled: flat.cancelled };
        Ok((payload, fetched))
    }
}
