//! Statline request executor: the only part of statline that touches the network.
//!
//! `execute` goes cache -> admission -> HTTP (retrying transport failures only) -> cache.
//! The HTTP client sits behind the `Transport` trait so tests can script responses.

#![forbid(unsafe_code)]

mod error;
mod executor;
mod retry;
mod transport;

pub use error::{ExecutionError, RateLimitOrigin, TransportError};
pub use executor::{CallCounters, CallStats, ClientConfig, Executor, DEFAULT_CREDENTIAL_HEADER};
pub use retry::RetryPolicy;
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};

/// Cap for response bodies carried inside errors.
pub const MAX_ERROR_BODY_CHARS: usize = 512;

pub(crate) fn truncate_body(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}
