//! Error types shared by the descriptor and validation layers.

use crate::ParamType;

/// Descriptor source could not be turned into a catalog. Any one of these aborts the whole load.
#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("reading descriptor source {path}: {reason}")]
    Io { path: String, reason: String },
    #[error("parsing descriptor source: {0}")]
    Parse(String),
    #[error("endpoint #{index}: missing required field `{field}`")]
    MissingField { index: usize, field: &'static str },
    #[error("endpoint `{id}`: duplicate id")]
    DuplicateId { id: String },
    #[error("endpoint `{id}`: duplicate parameter `{param}`")]
    DuplicateParam { id: String, param: String },
    #[error("endpoint `{id}`: parameter `{param}`: {reason}")]
    InvalidParam { id: String, param: String, reason: String },
    #[error("endpoint `{id}`: {reason}")]
    Invalid { id: String, reason: String },
}

/// A supplied parameter set was rejected before any network call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("missing required parameter `{param}`")]
    MissingRequired { param: String },
    #[error("at least one of [{}] is required", .group.join(", "))]
    MissingOneOf { group: Vec<String> },
    #[error("parameters [{}] are mutually exclusive", .params.join(", "))]
    MutuallyExclusive { params: Vec<String> },
    #[error("parameter `{param}`: expected {expected}, got `{value}`")]
    InvalidType { param: String, expected: ParamType, value: String },
    #[error("parameter `{param}`: {value} is outside {}", bounds(.min, .max))]
    OutOfRange { param: String, value: i64, min: Option<i64>, max: Option<i64> },
    #[error("parameter `{param}`: `{value}` does not match pattern `{pattern}`")]
    PatternMismatch { param: String, value: String, pattern: String },
    #[error("parameter `{param}`: length {len} is outside {}", len_bounds(.min, .max))]
    Length { param: String, len: usize, min: Option<usize>, max: Option<usize> },
    #[error("parameter `{param}`: `{value}` is not one of [{}]", .allowed.join(", "))]
    NotInEnum { param: String, value: String, allowed: Vec<String> },
}

impl ValidationError {
    /// Offending parameter, when the error concerns exactly one.
    pub fn param(&self) -> Option<&str> {
        match self {
            ValidationError::MissingRequired { param }
            | ValidationError::InvalidType { param, .. }
            | ValidationError::OutOfRange { param, .. }
            | ValidationError::PatternMismatch { param, .. }
            | ValidationError::Length { param, .. }
            | ValidationError::NotInEnum { param, .. } => Some(param),
            ValidationError::MissingOneOf { .. } | ValidationError::MutuallyExclusive { .. } => None,
        }
    }
}

fn bounds(min: &Option<i64>, max: &Option<i64>) -> String {
    match (min, max) {
        (Some(a), Some(b)) => format!("[{}, {}]", a, b),
        (Some(a), None) => format!("[{}, ..)", a),
        (None, Some(b)) => format!("(.., {}]", b),
        (None, None) => "(.., ..)".to_string(),
    }
}

fn len_bounds(min: &Option<usize>, max: &Option<usize>) -> String {
    bounds(&min.map(|v| v as i64), &max.map(|v| v as i64))
}
