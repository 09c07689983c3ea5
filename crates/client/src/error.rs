use thiserror::Error;

/// Connection-level failure: nothing usable came back from the server.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("connection failed: {0}")]
    Connect(String),
    /// Request could not be built or sent for a reason a retry will not fix.
    #[error("transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Only timeouts and failed connections are worth another attempt.
    pub fn is_retryable(&self) -> bool { matches!(self, TransportError::Timeout(_) | TransportError::Connect(_)) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitOrigin {
    /// The local admission controller refused the call.
    Local,
    /// The server answered 429.
    Remote,
}

impl RateLimitOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitOrigin::Local => "local",
            RateLimitOrigin::Remote => "remote",
        }
    }
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("rate limited ({}); retry after {retry_after_secs}s", origin.as_str())]
    RateLimited { retry_after_secs: u64, origin: RateLimitOrigin },
    #[error("transport failed after {attempts} attempt(s): {source}")]
    Transport {
        attempts: u32,
        #[source]
        source: TransportError,
    },
    #[error("remote error: HTTP {status}: {body}")]
    Remote { status: u16, body: String },
    #[error("response is not valid JSON: {0}")]
    Decode(String),
    #[error("no base URL configured for namespace `{0}`")]
    NoBaseUrl(String),
}

impl ExecutionError {
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            ExecutionError::RateLimited { retry_after_secs, .. } => Some(*retry_after_secs),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ExecutionError::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }
}
