use serde_json::Value;

use crate::state::{AnalysisResult, Match, Player, PlayerPerformance, Winner};

pub const SUMMARY_UNAVAILABLE: &str =
    "Summary not available. Check the synthesis file on the backend.";
const DRAW_PHRASES: &[&str] = &["empate"];

/// Mapped domain result plus the field paths that fell back to defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedSynthesis {
    pub result: AnalysisResult,
    pub defaulted: Vec<&'static str>,
}

/// Maps the service's free-form synthesis payload onto [`AnalysisResult`].
///
/// Total over any JSON value: every missing or mistyped field degrades to a
/// default and is listed in `defaulted`.
pub fn map_synthesis(raw: &Value, ctx: &Match, home_team: &str) -> MappedSynthesis {
    let mut defaulted = Vec::new();

    let insights = string_list(raw.get("insights_principais"));
    let summary = if insights.is_empty() {
        defaulted.push("insights_principais");
        SUMMARY_UNAVAILABLE.to_string()
    } else {
        insights.join("\n")
    };

    let key_factors = string_list(raw.get("pontos_atencao_criticos"));
    if key_factors.is_empty() {
        defaulted.push("pontos_atencao_criticos");
    }

    let risk_factors = string_list(
        raw.get("dados_mercado_validados")
            .and_then(|v| v.get("ameacas_identificadas")),
    );
    if risk_factors.is_empty() {
        defaulted.push("dados_mercado_validados.ameacas_identificadas");
    }

    let confidence_raw = raw
        .get("validacao_dados")
        .and_then(|v| v.get("nivel_confianca"));
    let confidence = match confidence_raw.and_then(parse_confidence) {
        Some(c) => c,
        None => {
            defaulted.push("validacao_dados.nivel_confianca");
            0.0
        }
    };
    let confidence_label = confidence_raw
        .map(display_value)
        .unwrap_or_else(|| "0%".to_string());
    let confidence_breakdown =
        format!("Confidence level based on the backend data validation: {confidence_label}.");

    let collected_players = match raw.get("squad_data").and_then(|v| v.get("players")) {
        Some(Value::Array(items)) => items.iter().filter_map(parse_player).collect(),
        _ => {
            defaulted.push("squad_data.players");
            Vec::new()
        }
    };

    let inferred_winner = infer_winner(&summary, home_team, &ctx.opponent);

    MappedSynthesis {
        result: AnalysisResult {
            summary,
            inferred_winner,
            confidence,
            confidence_breakdown,
            key_factors,
            risk_factors,
            collected_players,
        },
        defaulted,
    }
}

/// Checks home-advantage phrases, then opponent phrases, then draw phrases.
pub fn infer_winner(summary: &str, home_team: &str, opponent: &str) -> Winner {
    let text = summary.to_lowercase();
    if side_phrases(home_team).iter().any(|p| text.contains(p)) {
        return Winner::Home;
    }
    if side_phrases(opponent).iter().any(|p| text.contains(p)) {
        return Winner::Away;
    }
    if DRAW_PHRASES.iter().any(|p| text.contains(p)) {
        return Winner::Draw;
    }
    Winner::Undetermined
}

fn side_phrases(team: &str) -> Vec<String> {
    let team = team.trim().to_lowercase();
    if team.is_empty() {
        return Vec::new();
    }
    vec![
        format!("vitória do {team}"),
        format!("{team} tem vantagem"),
        format!("favoritismo para o {team}"),
    ]
}

/// Reads `"85%"`, `"85"` or `85` as a percentage and returns a fraction in
/// `[0, 1]`. Values are always percentages, so `1` is 1% and `0.85` is 0.85%.
pub fn parse_confidence(value: &Value) -> Option<f64> {
    let percent = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => parse_decimal(s.trim().trim_end_matches('%'))?,
        _ => return None,
    };
    let fraction = percent / 100.0;
    fraction.is_finite().then(|| fraction.clamp(0.0, 1.0))
}

fn parse_decimal(raw: &str) -> Option<f64> {
    raw.trim().replace(',', ".").parse::<f64>().ok()
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

fn parse_player(value: &Value) -> Option<Player> {
    let name = pick_str(value, "name")?;
    let performance = value
        .get("performance_stats")
        .filter(|v| v.is_object())
        .map(|stats| PlayerPerformance {
            games_played: pick_u32(stats, "games_played"),
            goals: pick_u32(stats, "goals"),
            assists: pick_u32(stats, "assists"),
            rating_average: stats.get("rating_average").and_then(Value::as_f64),
        });
    Some(Player {
        name,
        position: pick_str(value, "position").unwrap_or_default(),
        shirt_number: pick_u32(value, "shirt_number"),
        age: pick_u32(value, "age"),
        status: pick_str(value, "status").unwrap_or_default(),
        injury_details: pick_str(value, "injury_details"),
        performance,
    })
}

fn pick_str(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn pick_u32(value: &Value, key: &str) -> Option<u32> {
    match value.get(key)? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse::<u32>().ok(),
        _ => None,
    }
}
