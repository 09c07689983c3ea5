//! Parameter validation: supplied host values -> `ResolvedParams`.
//!
//! Order is fixed: defaults, required, at-least-one groups, mutually exclusive groups,
//! then per-parameter type/constraint checks in declaration order. The first violation
//! is returned. Never touches the network.

use chrono::NaiveDate;
use statline_core::{EndpointDescriptor, ParamType, ParameterDescriptor, ResolvedParams, ValidationError};
use tracing::debug;

pub fn validate<I, K, V>(d: &EndpointDescriptor, supplied: I) -> Result<ResolvedParams, ValidationError>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    // Blank values count as absent and never reach the wire.
    let mut resolved = ResolvedParams::new();
    for (k, v) in supplied {
        let (k, v) = (k.as_ref().trim(), v.as_ref().trim());
        if k.is_empty() || v.is_empty() { continue; }
        resolved.insert(k, v);
    }

    for p in d.params.iter() {
        if resolved.is_present(&p.name) { continue; }
        if let Some(def) = p.default_value.as_deref() {
            resolved.insert(p.name.as_str(), def);
        }
    }

    for name in d.required_names() {
        if !resolved.is_present(name) {
            return Err(ValidationError::MissingRequired { param: name.to_string() });
        }
    }

    for group in d.validation.at_least_one_of.iter() {
        if !group.iter().any(|n| resolved.is_present(n)) {
            return Err(ValidationError::MissingOneOf { group: group.clone() });
        }
    }

    for group in d.validation.mutually_exclusive.iter() {
        let present: Vec<String> = group.iter().filter(|n| resolved.is_present(n)).cloned().collect();
        if present.len() > 1 {
            return Err(ValidationError::MutuallyExclusive { params: present });
        }
    }

    for p in d.params.iter() {
        let Some(raw) = resolved.get(&p.name) else { continue };
        let normalized = check_value(p, raw)?;
        if normalized != raw {
            resolved.insert(p.name.as_str(), normalized);
        }
    }

    for (name, _) in resolved.iter() {
        if d.param(name).is_none() {
            debug!(endpoint = %d.id, param = %name, "passing undeclared parameter through");
        }
    }

    Ok(resolved)
}

/// Check one value against its declaration, returning the normalized wire value.
pub fn check_value(p: &ParameterDescriptor, value: &str) -> Result<String, ValidationError> {
    let type_err = || ValidationError::InvalidType { param: p.name.clone(), expected: p.ty, value: value.to_string() };
    match p.ty {
        ParamType::Integer => {
            let n: i64 = value.parse().map_err(|_| type_err())?;
            let below = p.min.map(|m| n < m).unwrap_or(false);
            let above = p.max.map(|m| n > m).unwrap_or(false);
            if below || above {
                return Err(ValidationError::OutOfRange { param: p.name.clone(), value: n, min: p.min, max: p.max });
            }
            Ok(n.to_string())
        }
        ParamType::String => {
            let len = value.chars().count();
            let short = p.min_length.map(|m| len < m).unwrap_or(false);
            let long = p.max_length.map(|m| len > m).unwrap_or(false);
            if short || long {
                return Err(ValidationError::Length { param: p.name.clone(), len, min: p.min_length, max: p.max_length });
            }
            if let Some(pat) = p.pattern.as_ref() {
                if !pat.matches(value) {
                    return Err(ValidationError::PatternMismatch {
                        param: p.name.clone(),
                        value: value.to_string(),
                        pattern: pat.as_str().to_string(),
                    });
                }
            }
            Ok(value.to_string())
        }
        ParamType::Boolean => {
            if value.eq_ignore_ascii_case("true") {
                Ok("true".to_string())
            } else if value.eq_ignore_ascii_case("false") {
                Ok("false".to_string())
            } else {
                Err(type_err())
            }
        }
        ParamType::Date => {
            NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| type_err())?;
            Ok(value.to_string())
        }
        ParamType::Enum => {
            if p.is_enum_member(value) {
                Ok(value.to_string())
            } else {
                Err(ValidationError::NotInEnum {
                    param: p.name.clone(),
                    value: value.to_string(),
                    allowed: p.values.iter().map(|v| v.value.clone()).collect(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use statline_core::{Pattern, ParameterDescriptor};

    #[test]
    fn integer_bounds_and_normalization() {
        let mut p = ParameterDescriptor::new("season", ParamType::Integer);
        p.min = Some(2008);
        p.max = Some(2100);
        assert_eq!(check_value(&p, "2024").unwrap(), "2024");
        assert_eq!(check_value(&p, "+2024").unwrap(), "2024");
        assert!(matches!(check_value(&p, "1999"), Err(ValidationError::OutOfRange { value: 1999, .. })));
        assert!(matches!(check_value(&p, "twenty"), Err(ValidationError::InvalidType { .. })));
    }

    #[test]
    fn boolean_and_date() {
        let b = ParameterDescriptor::new("live", ParamType::Boolean);
        assert_eq!(check_value(&b, "TRUE").unwrap(), "true");
        assert!(check_value(&b, "yes").is_err());
        let d = ParameterDescriptor::new("date", ParamType::Date);
        assert!(check_value(&d, "2024-02-29").is_ok());
        assert!(check_value(&d, "2023-02-29").is_err());
        assert!(check_value(&d, "29/02/2024").is_err());
    }

    #[test]
    fn string_length_then_pattern() {
        let mut p = ParameterDescriptor::new("search", ParamType::String);
        p.min_length = Some(3);
        p.pattern = Some(Pattern::new("[A-Za-z ]+").unwrap());
        assert!(matches!(check_value(&p, "ab"), Err(ValidationError::Length { len: 2, .. })));
        assert!(matches!(check_value(&p, "abc1"), Err(ValidationError::PatternMismatch { .. })));
        assert!(check_value(&p, "Man City").is_ok());
    }
}
