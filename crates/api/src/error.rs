use statline_catalog::CatalogError;
use statline_client::{ExecutionError, TransportError};
use statline_core::ValidationError;
use statline_flatten::FlattenError;
use thiserror::Error;

/// Every failure of a host call, tagged with the endpoint it concerns.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("{endpoint}: invalid parameters: {source}")]
    Validation {
        endpoint: String,
        #[source]
        source: ValidationError,
    },
    #[error("{endpoint}: {source}")]
    Execution {
        endpoint: String,
        #[source]
        source: ExecutionError,
    },
    #[error("{endpoint}: cannot flatten response: {source}")]
    Flatten {
        endpoint: String,
        #[source]
        source: FlattenError,
    },
    #[error("{endpoint}: cancelled")]
    Cancelled { endpoint: String },
    #[error("engine setup failed: {0}")]
    Setup(#[from] TransportError),
}

impl EngineError {
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            EngineError::Catalog(CatalogError::NotFound(id)) => Some(id),
            EngineError::Catalog(_) | EngineError::Setup(_) => None,
            EngineError::Validation { endpoint, .. }
            | EngineError::Execution { endpoint, .. }
            | EngineError::Flatten { endpoint, .. }
            | EngineError::Cancelled { endpoint } => Some(endpoint),
        }
    }

    /// Wait hint when the call was refused by a rate limit.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            EngineError::Execution { source, .. } => source.retry_after_secs(),
            _ => None,
        }
    }

    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            EngineError::Validation { source, .. } => Some(source),
            _ => None,
        }
    }
}
