use serde_json::{json, Value};
use statline_core::{Cell, EndpointDescriptor, ResponseShape};
use statline_flatten::{flatten, flatten_with_cancel, FlattenError};
use tokio_util::sync::CancellationToken;

const FOOTBALL: &str = include_str!("../../../descriptors/football.yaml");

fn shape(id: &str) -> ResponseShape {
    let eps: Vec<EndpointDescriptor> = statline_schema::parse_source(FOOTBALL).unwrap();
    eps.into_iter().find(|d| d.id == id).unwrap().response
}

fn custom(yaml_response: &str) -> ResponseShape {
    let doc = format!(
        "namespace: football\nendpoints:\n  - id: t\n    path: /t\n    category: test\n    response:\n{}",
        yaml_response.lines().map(|l| format!("      {l}\n")).collect::<String>()
    );
    statline_schema::parse_source(&doc).unwrap().remove(0).response
}

fn burnley_city() -> Value {
    json!({
        "fixture": {
            "id": 1035037, "referee": "C. Pawson", "timezone": "UTC",
            "date": "2023-08-11T19:00:00+00:00", "timestamp": 1691780400,
            "periods": {"first": 1691780400, "second": 1691784000},
            "venue": {"id": 512, "name": "Turf Moor", "city": "Burnley"},
            "status": {"long": "Match Finished", "short": "FT", "elapsed": 90}
        },
        "league": {"id": 39, "name": "Premier League", "country": "England", "logo": "l.png",
                   "flag": "f.svg", "season": 2023, "round": "Regular Season - 1"},
        "teams": {
            "home": {"id": 44, "name": "Burnley", "logo": "44.png", "winner": false},
            "away": {"id": 50, "name": "Manchester City", "logo": "50.png", "winner": true}
        },
        "goals": {"home": 0, "away": 3},
        "score": {"halftime": {"home": 0, "away": 2}, "fulltime": {"home": 0, "away": 3}}
    })
}

#[test]
fn fixtures_by_league_yields_one_prefixed_row() {
    let out = flatten(&shape("fixtures-by-league"), &json!({"errors": [], "response": [burnley_city()]})).unwrap();
    assert_eq!(out.rows.len(), 1);
    assert!(out.warnings.is_empty());
    let row = &out.rows[0];
    assert!(row.columns().all(|c| c.starts_with("fx_")), "{:?}", row.columns().collect::<Vec<_>>());
    for excluded in ["fx_fixture_timezone", "fx_league_logo", "fx_league_flag", "fx_home_logo", "fx_away_logo"] {
        assert!(!row.contains(excluded), "{excluded} should be excluded");
    }
    assert_eq!(row.get("fx_fixture_id"), Some(&Cell::Integer(1035037)));
    assert_eq!(row.get("fx_kickoff"), Some(&Cell::from("2023-08-11T19:00:00+00:00")));
    assert!(!row.contains("fx_fixture_date"));
    assert_eq!(row.get("fx_venue_name"), Some(&Cell::from("Turf Moor")));
    assert_eq!(row.get("fx_status_short"), Some(&Cell::from("FT")));
    assert_eq!(row.get("fx_home_winner"), Some(&Cell::Boolean(false)));
    assert_eq!(row.get("fx_away_name"), Some(&Cell::from("Manchester City")));
    assert_eq!(row.get("fx_goals_away"), Some(&Cell::Integer(3)));

    let Some(Cell::String(score)) = row.get("fx_score") else { panic!("score not stringified") };
    let parsed: Value = serde_json::from_str(score).unwrap();
    assert_eq!(parsed["fulltime"]["away"], 3);
    assert!(matches!(row.get("fx_fixture_periods"), Some(Cell::String(_))));
}

#[test]
fn explode_yields_one_row_per_member() {
    let player = json!({
        "player": {"id": 276, "name": "Neymar", "photo": "p.png", "birth": {"date": "1992-02-05", "place": "Mogi das Cruzes"}},
        "statistics": [
            {"team": {"id": 85, "name": "PSG", "logo": "x"}, "league": {"id": 61, "name": "Ligue 1"}, "games": {"appearences": 18}, "goals": {"total": 13}},
            {"team": {"id": 85, "name": "PSG", "logo": "x"}, "league": {"id": 2, "name": "UEFA Champions League"}, "games": {"appearences": 6}, "goals": {"total": 3}},
            {"team": {"id": 6, "name": "Brazil", "logo": "y"}, "league": {"id": 10, "name": "Friendlies"}, "games": {"appearences": 2}, "goals": {"total": null}}
        ]
    });
    let out = flatten(&shape("players"), &json!({"response": [player]})).unwrap();
    assert_eq!(out.rows.len(), 3);
    for row in out.rows.iter() {
        assert_eq!(row.get("player_name"), Some(&Cell::from("Neymar")));
        assert_eq!(row.get("birth_date"), Some(&Cell::from("1992-02-05")));
        assert!(!row.contains("player_photo"));
        assert!(!row.contains("stat_team_logo"));
    }
    let leagues: Vec<_> = out.rows.iter().map(|r| r.get("stat_league_name").cloned()).collect();
    assert_eq!(
        leagues,
        vec![
            Some(Cell::from("Ligue 1")),
            Some(Cell::from("UEFA Champions League")),
            Some(Cell::from("Friendlies"))
        ]
    );
    assert_eq!(out.rows[2].get("stat_goals_total"), Some(&Cell::Missing));
    assert_eq!(out.rows[0].get("stat_games_appearences"), Some(&Cell::Integer(18)));
}

#[test]
fn standings_groups_are_spread_into_team_rows() {
    let team = |rank: i64, id: i64, name: &str, group: &str| {
        let points = 90 - rank;
        json!({"rank": rank, "team": {"id": id, "name": name, "logo": "t.png"}, "points": points,
               "group": group, "all": {"played": 38, "goals": {"for": 80, "against": 30}}})
    };
    let payload = json!({"response": [{
        "league": {"id": 39, "name": "Premier League", "logo": "l", "flag": "f", "season": 2023,
                   "standings": [[team(1, 50, "Manchester City", "A"), team(2, 42, "Arsenal", "A")], [team(1, 40, "Liverpool", "B")]]}
    }]});
    let out = flatten(&shape("standings"), &payload).unwrap();
    assert_eq!(out.rows.len(), 3);
    let names: Vec<_> = out.rows.iter().map(|r| r.get("team_name").cloned().unwrap()).collect();
    assert_eq!(names, vec![Cell::from("Manchester City"), Cell::from("Arsenal"), Cell::from("Liverpool")]);
    let r = &out.rows[2];
    assert_eq!(r.get("league_name"), Some(&Cell::from("Premier League")));
    assert_eq!(r.get("rank"), Some(&Cell::Integer(1)));
    assert_eq!(r.get("group"), Some(&Cell::from("B")));
    assert_eq!(r.get("all_played"), Some(&Cell::Integer(38)));
    assert_eq!(r.get("all_goals_for"), Some(&Cell::Integer(80)));
    assert!(!r.contains("team_logo"));
    assert!(!r.contains("league_logo"));
}

#[test]
fn stringify_keeps_one_row_with_json_text() {
    let payload = json!({"response": [{
        "league": {"id": 39, "name": "Premier League", "type": "League", "logo": "l"},
        "country": {"name": "England", "code": "GB", "flag": "f"},
        "seasons": [{"year": 2022, "current": false}, {"year": 2023, "current": true}]
    }]});
    let out = flatten(&shape("leagues"), &payload).unwrap();
    assert_eq!(out.rows.len(), 1);
    let Some(Cell::String(text)) = out.rows[0].get("seasons") else { panic!("seasons not stringified") };
    let seasons: Value = serde_json::from_str(text).unwrap();
    assert_eq!(seasons.as_array().unwrap().len(), 2);
    assert_eq!(out.rows[0].get("country_code"), Some(&Cell::from("GB")));
    assert!(!out.rows[0].contains("country_flag"));
}

#[test]
fn ignore_keeps_one_row_without_the_column() {
    let s = custom("flatten:\n  nestedArrays:\n    tags: ignore\n");
    let out = flatten(&s, &json!({"response": [{"id": 1, "tags": ["a", "b", "c"]}]})).unwrap();
    assert_eq!(out.rows.len(), 1);
    assert!(!out.rows[0].contains("tags"));
    assert_eq!(out.rows[0].get("id"), Some(&Cell::Integer(1)));
}

#[test]
fn exclude_applies_to_columns_from_any_rule() {
    let s = custom(
        "flatten:\n  prefix: p_\n  nestedObjects:\n    team: flatten\n    meta: stringify\n  nestedArrays:\n    tags: stringify\n  exclude: [p_id, p_team_logo, p_meta, p_tags]\n",
    );
    let el = json!({"id": 1, "name": "x", "team": {"id": 2, "logo": "l"}, "meta": {"a": 1}, "tags": [1]});
    let out = flatten(&s, &json!({"response": [el]})).unwrap();
    let cols: Vec<_> = out.rows[0].columns().map(str::to_string).collect();
    assert_eq!(cols, vec!["p_name", "p_team_id"]);
}

#[test]
fn absent_and_null_fields_are_missing_not_empty() {
    let s = custom("flatten:\n  nestedObjects:\n    venue: flatten\n    score: stringify\n");
    let payload = json!({"response": [
        {"id": 1, "referee": "A. Taylor", "venue": {"name": "Anfield"}, "score": {"home": 1}},
        {"id": 2, "referee": null, "venue": null}
    ]});
    let out = flatten(&s, &payload).unwrap();
    assert_eq!(out.rows.len(), 2);
    let second = &out.rows[1];
    assert_eq!(second.get("referee"), Some(&Cell::Missing));
    assert_eq!(second.get("venue_name"), Some(&Cell::Missing));
    assert_eq!(second.get("score"), Some(&Cell::Missing));
    assert_eq!(second.columns().collect::<Vec<_>>(), out.rows[0].columns().collect::<Vec<_>>());
}

#[test]
fn malformed_element_is_skipped_and_the_rest_continue() {
    let s = custom("flatten:\n  nestedObjects:\n    team: flatten\n");
    let payload = json!({"response": [
        {"id": 1, "team": {"name": "Arsenal"}},
        {"id": 2, "team": "not an object"},
        null,
        {"id": 4, "team": {"name": "Chelsea"}}
    ]});
    let out = flatten(&s, &payload).unwrap();
    assert_eq!(out.rows.len(), 2);
    assert_eq!(out.warnings.iter().map(|w| w.index).collect::<Vec<_>>(), vec![1, 2]);
    assert!(out.warnings[0].reason.contains("team"));
    assert_eq!(out.rows[1].get("team_name"), Some(&Cell::from("Chelsea")));
}

#[test]
fn empty_explode_keeps_the_base_row() {
    let out = flatten(&shape("odds"), &json!({"response": [{"fixture": {"id": 9}, "bookmakers": []}]})).unwrap();
    assert_eq!(out.rows.len(), 1);
    assert_eq!(out.rows[0].get("fixture_id"), Some(&Cell::Integer(9)));
}

#[test]
fn null_members_still_explode_into_rows() {
    let s = custom("flatten:\n  nestedArrays:\n    events: explode\n");
    let out = flatten(&s, &json!({"response": [{"id": 1, "events": [{"t": 1}, null, {"t": 3}]}]})).unwrap();
    assert_eq!(out.rows.len(), 3);
    let ts: Vec<_> = out.rows.iter().map(|r| r.get("events_t").cloned()).collect();
    assert_eq!(ts, vec![Some(Cell::Integer(1)), Some(Cell::Missing), Some(Cell::Integer(3))]);
    assert!(out.rows.iter().all(|r| r.get("id") == Some(&Cell::Integer(1))));
}

#[test]
fn nested_groups_are_opened_only_with_spread() {
    let payload = json!({"response": [{"id": 1, "groups": [["a", "b"], ["c"]]}]});

    let s = custom("flatten:\n  nestedArrays:\n    groups: explode\n");
    let out = flatten(&s, &payload).unwrap();
    assert_eq!(out.rows.len(), 2);
    assert_eq!(out.rows[0].get("groups_value"), Some(&Cell::from(r#"["a","b"]"#)));
    assert_eq!(out.rows[1].get("groups_value"), Some(&Cell::from(r#"["c"]"#)));

    let s = custom("flatten:\n  nestedArrays:\n    groups: { strategy: explode, spread: true }\n");
    let out = flatten(&s, &payload).unwrap();
    let values: Vec<_> = out.rows.iter().map(|r| r.get("groups_value").cloned()).collect();
    assert_eq!(values, vec![Some(Cell::from("a")), Some(Cell::from("b")), Some(Cell::from("c"))]);
}

#[test]
fn nested_array_under_explode_is_stringified_per_member() {
    let payload = json!({"response": [{
        "fixture": {"id": 9},
        "bookmakers": [
            {"id": 6, "name": "Bwin", "bets": [{"id": 1, "name": "Match Winner"}]},
            {"id": 8, "name": "Bet365", "bets": []}
        ]
    }]});
    let out = flatten(&shape("odds"), &payload).unwrap();
    assert_eq!(out.rows.len(), 2);
    assert_eq!(out.rows[1].get("bookmaker_name"), Some(&Cell::from("Bet365")));
    assert_eq!(out.rows[1].get("bookmaker_bets"), Some(&Cell::from("[]")));
}

#[test]
fn scalar_payloads_become_value_rows() {
    let out = flatten(&shape("timezone"), &json!({"response": ["Africa/Abidjan", "Europe/London"]})).unwrap();
    assert_eq!(out.rows.len(), 2);
    assert_eq!(out.rows[1].get("value"), Some(&Cell::from("Europe/London")));
}

#[test]
fn object_shape_flattens_the_single_object() {
    let payload = json!({"response": {
        "account": {"firstname": "Ada", "email": "ada@example.com"},
        "subscription": {"plan": "Free", "active": true},
        "requests": {"current": 12, "limit_day": 100}
    }});
    let out = flatten(&shape("status"), &payload).unwrap();
    assert_eq!(out.rows.len(), 1);
    let row = &out.rows[0];
    assert_eq!(row.get("requests_current"), Some(&Cell::Integer(12)));
    assert_eq!(row.get("subscription_active"), Some(&Cell::Boolean(true)));
    assert!(!row.contains("account_email"));
}

#[test]
fn missing_root_is_an_error_and_null_root_is_empty() {
    let s = shape("countries");
    assert_eq!(
        flatten(&s, &json!({"errors": {"token": "bad"}})).unwrap_err(),
        FlattenError::MissingRoot { path: "response".into() }
    );
    assert!(flatten(&s, &json!({"response": null})).unwrap().rows.is_empty());
}

#[test]
fn cancellation_stops_before_the_next_element() {
    let token = CancellationToken::new();
    token.cancel();
    let payload = json!({"response": [{"name": "England"}, {"name": "Spain"}]});
    let out = flatten_with_cancel(&shape("countries"), &payload, &token).unwrap();
    assert!(out.cancelled);
    assert!(out.rows.is_empty());

    let out = flatten(&shape("countries"), &payload).unwrap();
    assert!(!out.cancelled);
    assert_eq!(out.rows.len(), 2);
    assert_eq!(out.rows[0].get("country_name"), Some(&Cell::from("England")));
}
