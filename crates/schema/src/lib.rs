//! Statline schema: descriptor source (YAML) parsing and parameter validation.

#![forbid(unsafe_code)]

pub mod source;
pub mod validate;

pub use source::{parse_source, read_source};
pub use validate::{check_value, validate};
