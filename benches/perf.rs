use criterion::{Criterion, criterion_group, criterion_main};
use reqwest::StatusCode;
use serde_json::Value;
use std::hint::black_box;

use match_oracle::state::{AppState, Delta, JobParams, Match, Venue, apply_delta};
use match_oracle::synthesis::map_synthesis;
use match_oracle::workflow_client::{parse_result_response, parse_status_response};

fn sample_match() -> Match {
    Match::from_params(&JobParams {
        opponent: "Palmeiras".to_string(),
        competition: "Brasileirão".to_string(),
        match_date: "2026-11-02T16:00".to_string(),
        venue: Venue::Home,
        special_directives: String::new(),
        deep_dive: false,
    })
}

fn bench_synthesis_map(c: &mut Criterion) {
    let raw: Value = serde_json::from_str(SYNTHESIS_JSON).expect("valid fixture json");
    let ctx = sample_match();
    c.bench_function("synthesis_map", |b| {
        b.iter(|| {
            let mapped = map_synthesis(black_box(&raw), &ctx, "Corinthians");
            black_box(mapped.result.confidence);
        })
    });
}

fn bench_result_parse(c: &mut Criterion) {
    c.bench_function("result_parse", |b| {
        b.iter(|| {
            let value = parse_result_response(StatusCode::OK, black_box(SYNTHESIS_JSON)).unwrap();
            black_box(value.is_object());
        })
    });
}

fn bench_status_parse(c: &mut Criterion) {
    c.bench_function("status_parse", |b| {
        b.iter(|| {
            let status = parse_status_response(StatusCode::OK, black_box(STATUS_JSON)).unwrap();
            black_box(status.progress_percent);
        })
    });
}

fn bench_player_merge(c: &mut Criterion) {
    let raw: Value = serde_json::from_str(SYNTHESIS_JSON).expect("valid fixture json");
    let players = map_synthesis(&raw, &sample_match(), "Corinthians")
        .result
        .collected_players;
    let batches: Vec<_> = (0..50).map(|_| players.clone()).collect();
    c.bench_function("player_merge", |b| {
        b.iter(|| {
            let mut state = AppState::new();
            for batch in &batches {
                apply_delta(&mut state, Delta::MergePlayers(batch.clone()));
            }
            black_box(state.players.len());
        })
    });
}

criterion_group!(
    perf,
    bench_synthesis_map,
    bench_result_parse,
    bench_status_parse,
    bench_player_merge
);
criterion_main!(perf);

static SYNTHESIS_JSON: &str = include_str!("../tests/fixtures/synthesis.json");
static STATUS_JSON: &str = r#"{
    "current_step": 3,
    "step_status": {"step1": "completed", "step2": "completed", "step3": "pending"},
    "progress_percentage": 62.5
}"#;
