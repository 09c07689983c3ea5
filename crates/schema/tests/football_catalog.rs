use std::collections::HashMap;

use statline_core::{ArrayStrategy, CacheClass, DescriptorError, PagingPolicy, ValidationError};
use statline_schema::{parse_source, validate};

const FOOTBALL: &str = include_str!("../../../descriptors/football.yaml");

fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

#[test]
fn bundled_catalog_parses() {
    let eps = parse_source(FOOTBALL).unwrap();
    assert!(eps.len() >= 10);
    let fx = eps.iter().find(|e| e.id == "fixtures-by-league").unwrap();
    assert_eq!(fx.namespace, "football");
    assert_eq!(fx.path, "/fixtures");
    assert_eq!(fx.caching.class, CacheClass::Hourly);
    assert_eq!(fx.response.flatten.prefix, "fx_");
    assert_eq!(fx.validation.required_params, vec!["league", "season"]);

    let bb = eps.iter().find(|e| e.id == "basketball-games").unwrap();
    assert_eq!(bb.namespace, "basketball");
    assert_eq!(bb.caching.effective_ttl().as_secs(), 120);

    let players = eps.iter().find(|e| e.id == "players").unwrap();
    assert_eq!(
        players.paging,
        PagingPolicy::Page { param: "page".into(), max_pages: 20, total_path: "paging.total".into() }
    );
    assert!(matches!(players.response.flatten.array_rules[0].strategy, ArrayStrategy::Explode { .. }));
}

#[test]
fn fixtures_by_league_requires_league() {
    let eps = parse_source(FOOTBALL).unwrap();
    let fx = eps.iter().find(|e| e.id == "fixtures-by-league").unwrap();

    let err = validate(fx, &params(&[("season", "2024")])).unwrap_err();
    assert_eq!(err, ValidationError::MissingRequired { param: "league".into() });
    assert_eq!(err.param(), Some("league"));

    let ok = validate(fx, &params(&[("league", "39"), ("season", "2024")])).unwrap();
    assert_eq!(ok.get("league"), Some("39"));
    // declared default applied
    assert_eq!(ok.get("timezone"), Some("UTC"));
}

#[test]
fn at_least_one_group_is_checked_before_types() {
    let eps = parse_source(FOOTBALL).unwrap();
    let teams = eps.iter().find(|e| e.id == "teams").unwrap();

    // no group member but an invalid season: the group failure wins
    let err = validate(teams, &params(&[("season", "abc")])).unwrap_err();
    assert!(matches!(err, ValidationError::MissingOneOf { .. }));

    // blank counts as absent
    let err = validate(teams, &params(&[("search", "   ")])).unwrap_err();
    assert!(matches!(err, ValidationError::MissingOneOf { .. }));

    assert!(validate(teams, &params(&[("search", "manchester")])).is_ok());
    let err = validate(teams, &params(&[("search", "ma")])).unwrap_err();
    assert!(matches!(err, ValidationError::Length { .. }));
}

#[test]
fn mutually_exclusive_and_enum() {
    let eps = parse_source(FOOTBALL).unwrap();
    let fixtures = eps.iter().find(|e| e.id == "fixtures").unwrap();
    let err = validate(fixtures, &params(&[("id", "1"), ("live", "all")])).unwrap_err();
    assert_eq!(err, ValidationError::MutuallyExclusive { params: vec!["id".into(), "live".into()] });

    let fx = eps.iter().find(|e| e.id == "fixtures-by-league").unwrap();
    let err = validate(fx, &params(&[("league", "39"), ("season", "2024"), ("status", "XX")])).unwrap_err();
    assert!(matches!(err, ValidationError::NotInEnum { ref param, .. } if param == "status"));
}

#[test]
fn undeclared_parameters_pass_through() {
    let eps = parse_source(FOOTBALL).unwrap();
    let status = eps.iter().find(|e| e.id == "status").unwrap();
    let ok = validate(status, &params(&[("debug", "1")])).unwrap();
    assert_eq!(ok.get("debug"), Some("1"));
}

#[test]
fn missing_id_fails_whole_source() {
    let doc = r#"
namespace: football
endpoints:
  - { id: ok, path: /ok, category: c }
  - { path: /broken, category: c }
"#;
    match parse_source(doc) {
        Err(DescriptorError::MissingField { index, field }) => {
            assert_eq!(index, 1);
            assert_eq!(field, "id");
        }
        other => panic!("unexpected: {:?}", other.map(|v| v.len())),
    }
}

#[test]
fn structural_errors() {
    let dup = "namespace: f\nendpoints:\n  - { id: a, path: /a, category: c }\n  - { id: a, path: /b, category: c }\n";
    assert!(matches!(parse_source(dup), Err(DescriptorError::DuplicateId { .. })));

    let no_ns = "endpoints:\n  - { id: a, path: /a, category: c }\n";
    assert!(matches!(parse_source(no_ns), Err(DescriptorError::Invalid { .. })));

    let bad_rule = "namespace: f\nendpoints:\n  - id: a\n    path: /a\n    category: c\n    validation: { requiredParams: [league] }\n";
    assert!(matches!(parse_source(bad_rule), Err(DescriptorError::Invalid { .. })));

    let bad_default = "namespace: f\nendpoints:\n  - id: a\n    path: /a\n    category: c\n    parameters:\n      - { name: n, type: integer, max: 3, default: 9 }\n";
    assert!(matches!(parse_source(bad_default), Err(DescriptorError::InvalidParam { .. })));

    let empty_enum = "namespace: f\nendpoints:\n  - id: a\n    path: /a\n    category: c\n    parameters:\n      - { name: n, type: enum }\n";
    assert!(matches!(parse_source(empty_enum), Err(DescriptorError::InvalidParam { .. })));

    let negative_ttl = "namespace: f\nendpoints:\n  - { id: a, path: /a, category: c, caching: -5 }\n";
    assert!(parse_source(negative_ttl).is_err());
}
