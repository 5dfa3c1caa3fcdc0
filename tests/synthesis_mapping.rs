use std::fs;
use std::path::PathBuf;

use serde_json::{Value, json};

use match_oracle::state::{JobParams, Match, Venue, Winner};
use match_oracle::synthesis::{SUMMARY_UNAVAILABLE, map_synthesis};

fn read_fixture(name: &str) -> Value {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    let raw = fs::read_to_string(path).expect("fixture file should be readable");
    serde_json::from_str(&raw).expect("fixture should be valid json")
}

fn palmeiras_match() -> Match {
    Match::from_params(&JobParams {
        opponent: "Palmeiras".to_string(),
        competition: "Brasileirão".to_string(),
        match_date: "2026-11-02T16:00".to_string(),
        venue: Venue::Home,
        special_directives: String::new(),
        deep_dive: false,
    })
}

#[test]
fn maps_backend_synthesis_fixture() {
    let raw = read_fixture("synthesis.json");
    let mapped = map_synthesis(&raw, &palmeiras_match(), "Corinthians");
    let result = mapped.result;

    assert!(mapped.defaulted.is_empty(), "{:?}", mapped.defaulted);
    assert_eq!(result.summary.lines().count(), 3);
    assert!(result.summary.starts_with("Corinthians tem vantagem"));
    assert_eq!(result.inferred_winner, Winner::Home);
    assert!((result.confidence - 0.85).abs() < 1e-9);
    assert!(result.confidence_breakdown.contains("85%"));
    assert_eq!(
        result.key_factors,
        vec!["Bola parada defensiva", "Transições rápidas pelo lado esquerdo"]
    );
    assert_eq!(result.risk_factors.len(), 2);

    assert_eq!(result.collected_players.len(), 2);
    let keeper = &result.collected_players[1];
    assert_eq!(keeper.name, "Hugo Souza");
    assert_eq!(keeper.shirt_number, Some(1));
    assert!(keeper.performance.is_none());
}

#[test]
fn empty_object_maps_to_defaults() {
    let mapped = map_synthesis(&json!({}), &palmeiras_match(), "Corinthians");
    let result = mapped.result;

    assert_eq!(result.summary, SUMMARY_UNAVAILABLE);
    assert_eq!(result.inferred_winner, Winner::Undetermined);
    assert_eq!(result.confidence, 0.0);
    assert!(result.key_factors.is_empty());
    assert!(result.risk_factors.is_empty());
    assert!(result.collected_players.is_empty());
    assert_eq!(mapped.defaulted.len(), 5);
}

#[test]
fn mistyped_fields_degrade_instead_of_failing() {
    let raw = json!({
        "insights_principais": "not a list",
        "pontos_atencao_criticos": [1, null, "  ", "Pressão alta"],
        "validacao_dados": {"nivel_confianca": "alta"},
        "dados_mercado_validados": [],
        "squad_data": {"players": {"name": "x"}}
    });
    let mapped = map_synthesis(&raw, &palmeiras_match(), "Corinthians");

    assert_eq!(mapped.result.summary, SUMMARY_UNAVAILABLE);
    assert_eq!(mapped.result.key_factors, vec!["Pressão alta"]);
    assert_eq!(mapped.result.confidence, 0.0);
    assert!(mapped.result.confidence_breakdown.contains("alta"));
    assert!(mapped.defaulted.contains(&"validacao_dados.nivel_confianca"));
    assert!(mapped.defaulted.contains(&"squad_data.players"));
}

#[test]
fn non_object_payloads_are_still_mapped() {
    for raw in [json!(null), json!([1, 2]), json!("texto"), json!(42)] {
        let mapped = map_synthesis(&raw, &palmeiras_match(), "Corinthians");
        assert_eq!(mapped.result.inferred_winner, Winner::Undetermined);
        assert_eq!(mapped.result.summary, SUMMARY_UNAVAILABLE);
    }
}

#[test]
fn opponent_advantage_maps_to_away() {
    let raw = json!({
        "insights_principais": ["Favoritismo para o Palmeiras pelo momento"],
        "validacao_dados": {"nivel_confianca": 60}
    });
    let mapped = map_synthesis(&raw, &palmeiras_match(), "Corinthians");
    assert_eq!(mapped.result.inferred_winner, Winner::Away);
    assert!((mapped.result.confidence - 0.6).abs() < 1e-9);
}
