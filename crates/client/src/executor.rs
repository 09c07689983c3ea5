use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use statline_core::{CacheKey, EndpointDescriptor, ResolvedParams};
use statline_store::{Admission, AdmissionController, ResponseCache};
use tracing::{debug, info, warn};

use crate::{truncate_body, ExecutionError, HttpRequest, HttpResponse, RateLimitOrigin, RetryPolicy, Transport};

pub const DEFAULT_CREDENTIAL_HEADER: &str = "x-apisports-key";

/// Everything the executor needs to address the remote API.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub credential: String,
    pub credential_header: String,
    /// namespace -> base URL
    pub base_urls: BTreeMap<String, String>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    /// Wait reported when the server answers 429.
    pub remote_retry_after_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            credential: String::new(),
            credential_header: DEFAULT_CREDENTIAL_HEADER.to_string(),
            base_urls: BTreeMap::new(),
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            remote_retry_after_secs: 60,
        }
    }
}

/// Read-only snapshot of the call counters.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct CallStats {
    pub network_calls: u64,
    pub cache_hits: u64,
}

/// Counters owned by one executor; updated atomically from concurrent calls.
#[derive(Debug, Default)]
pub struct CallCounters {
    network_calls: AtomicU64,
    cache_hits: AtomicU64,
}

impl CallCounters {
    fn network_call(&self) {
        self.network_calls.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("statline_network_calls_total", 1u64);
    }

    fn cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("statline_cache_hits_total", 1u64);
    }

    pub fn snapshot(&self) -> CallStats {
        CallStats {
            network_calls: self.network_calls.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
        }
    }
}

pub struct Executor {
    transport: Arc<dyn Transport>,
    cache: Arc<ResponseCache>,
    limiter: Arc<AdmissionController>,
    config: ClientConfig,
    counters: CallCounters,
}

impl Executor {
    pub fn new(
        transport: Arc<dyn Transport>,
        cache: Arc<ResponseCache>,
        limiter: Arc<AdmissionController>,
        config: ClientConfig,
    ) -> Self {
        Self { transport, cache, limiter, config, counters: CallCounters::default() }
    }

    pub fn cache(&self) -> &ResponseCache { &self.cache }
    pub fn stats(&self) -> CallStats { self.counters.snapshot() }

    /// Produce the JSON payload for one validated call, from cache or network.
    pub async fn execute(&self, d: &EndpointDescriptor, params: &ResolvedParams) -> Result<Arc<Value>, ExecutionError> {
        let key = CacheKey::new(&d.namespace, &d.path, params);
        if let Some(hit) = self.cache.get(&key) {
            self.counters.cache_hit();
            debug!(endpoint = %d.id, key = %key, "cache hit");
            return Ok(hit);
        }

        let req = self.build_request(d, params)?;
        let credential = if self.config.credential.is_empty() { "anonymous" } else { self.config.credential.as_str() };
        if let Admission::Denied { retry_after_secs } = self.limiter.try_admit(credential, d.meta.quota_weight) {
            metrics::counter!("statline_rate_limited_total", 1u64, "source" => "local");
            warn!(endpoint = %d.id, retry_after_secs, "local rate limit reached");
            return Err(ExecutionError::RateLimited { retry_after_secs, origin: RateLimitOrigin::Local });
        }

        let t0 = Instant::now();
        let resp = self.send_with_retry(d, &req).await?;
        metrics::histogram!("statline_request_ms", t0.elapsed().as_secs_f64() * 1000.0);
        info!(endpoint = %d.id, status = resp.status, took_ms = %t0.elapsed().as_millis(), "remote call finished");

        match resp.status {
            200..=299 => {
                let payload: Value =
                    serde_json::from_str(&resp.body).map_err(|e| ExecutionError::Decode(e.to_string()))?;
                if envelope_has_errors(&payload) {
                    warn!(endpoint = %d.id, errors = %payload["errors"], "response envelope reports errors");
                }
                let payload = Arc::new(payload);
                self.counters.network_call();
                self.cache.insert(key, Arc::clone(&payload), d.caching.effective_ttl());
                Ok(payload)
            }
            429 => {
                metrics::counter!("statline_rate_limited_total", 1u64, "source" => "remote");
                let retry_after_secs = self.config.remote_retry_after_secs;
                warn!(endpoint = %d.id, retry_after_secs, "server rate limit reached");
                Err(ExecutionError::RateLimited { retry_after_secs, origin: RateLimitOrigin::Remote })
            }
            status => Err(ExecutionError::Remote { status, body: truncate_body(&resp.body) }),
        }
    }

    /// `<base url><path>` with resolved params as the query and the credential header attached.
    pub fn build_request(&self, d: &EndpointDescriptor, params: &ResolvedParams) -> Result<HttpRequest, ExecutionError> {
        let base = self
            .config
            .base_urls
            .get(&d.namespace)
            .ok_or_else(|| ExecutionError::NoBaseUrl(d.namespace.clone()))?;
        let mut headers = vec![("Accept".to_string(), "application/json".to_string())];
        if !self.config.credential.is_empty() {
            headers.push((self.config.credential_header.clone(), self.config.credential.clone()));
        }
        Ok(HttpRequest {
            method: d.method,
            url: format!("{}{}", base.trim_end_matches('/'), d.path),
            query: params.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            headers,
            timeout: self.config.timeout,
        })
    }

    async fn send_with_retry(&self, d: &EndpointDescriptor, req: &HttpRequest) -> Result<HttpResponse, ExecutionError> {
        let policy = self.config.retry;
        let max = policy.attempts();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.transport.send(req).await {
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_retryable() && attempt < max => {
                    let delay = policy.delay_after(attempt);
                    metrics::counter!("statline_transport_retries_total", 1u64);
                    warn!(endpoint = %d.id, attempt, delay_ms = delay.as_millis() as u64, error = %e, "transport failure; retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!(endpoint = %d.id, attempt, retryable = e.is_retryable(), error = %e, "transport failure; giving up");
                    return Err(ExecutionError::Transport { attempts: attempt, source: e });
                }
            }
        }
    }
}

fn envelope_has_errors(payload: &Value) -> bool {
    match payload.get("errors") {
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
        Some(Value::String(s)) => !s.is_empty(),
        _ => false,
    }
}
