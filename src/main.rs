use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use tracing_subscriber::EnvFilter;

use match_oracle::config::AppConfig;
use match_oracle::credentials::{CredentialPool, Provider};
use match_oracle::polling::AnalysisRunner;
use match_oracle::state::{
    AppState, Delta, JobParams, Match, MatchStatus, Venue, apply_delta, winner_label,
};
use match_oracle::workflow_client::HttpWorkflowClient;

const DEFAULT_COMPETITION: &str = "Brasileirão";

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let cfg = AppConfig::from_env();

    if has_flag(&args, "--keys") {
        print_key_status(&cfg);
        return Ok(());
    }

    let params = parse_job_params(&args)?;
    let client = HttpWorkflowClient::from_config(&cfg).context("unable to set up http client")?;
    println!("Analysis service: {}", client.base());

    let (tx, rx) = mpsc::channel();
    let mut runner = AnalysisRunner::new(Arc::new(client), &cfg, tx);
    let mut state = AppState::new();
    runner.start(params);

    loop {
        match rx.recv_timeout(Duration::from_millis(250)) {
            Ok(delta) => handle_delta(&mut state, delta),
            Err(RecvTimeoutError::Timeout) => {
                if !runner.is_running() {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    while let Ok(delta) = rx.try_recv() {
        handle_delta(&mut state, delta);
    }
    runner.wait();

    let Some(record) = state.matches.last() else {
        return Err(anyhow!("analysis ended without a match record"));
    };
    if has_flag(&args, "--json") {
        let json = serde_json::to_string_pretty(record).context("serialize match record")?;
        println!("{json}");
    } else {
        print_report(record, &cfg.home_team);
    }
    if !state.players.is_empty() {
        println!("Players merged: {}", state.players.len());
    }

    match record.status {
        MatchStatus::Completed => Ok(()),
        _ => Err(anyhow!(
            "analysis failed: {}",
            record.error.as_deref().unwrap_or("unknown error")
        )),
    }
}

fn handle_delta(state: &mut AppState, delta: Delta) {
    if let Delta::Log(entry) = &delta {
        println!("{entry}");
    }
    apply_delta(state, delta);
}

fn print_report(record: &Match, home_team: &str) {
    println!();
    println!(
        "{} vs {} ({}, {})",
        home_team, record.opponent, record.competition, record.match_date
    );
    let Some(result) = record.result.as_ref() else {
        return;
    };
    println!(
        "Predicted winner: {}",
        winner_label(result.inferred_winner, home_team, &record.opponent)
    );
    println!("Confidence: {:.0}%", result.confidence * 100.0);
    println!("{}", result.confidence_breakdown);
    println!();
    println!("Summary:");
    for line in result.summary.lines() {
        println!("  {line}");
    }
    print_list("Key factors", &result.key_factors);
    print_list("Risk factors", &result.risk_factors);

    if !result.collected_players.is_empty() {
        println!("Players:");
        for player in &result.collected_players {
            let shirt = player
                .shirt_number
                .map(|n| format!("#{n} "))
                .unwrap_or_default();
            println!(
                "  {shirt}{} ({}) {}",
                player.name, player.position, player.status
            );
        }
    }
}

fn print_list(title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    println!("{title}:");
    for item in items {
        println!("  - {item}");
    }
}

fn print_key_status(cfg: &AppConfig) {
    let pool = CredentialPool::from_config(cfg);
    let now = Instant::now();
    for provider in Provider::ALL {
        println!(
            "{}: {} keys, {} available",
            provider.label(),
            pool.len(provider),
            pool.available_count_at(provider, now)
        );
    }
}

fn parse_job_params(args: &[String]) -> Result<JobParams> {
    let opponent = arg_value(args, "--opponent")
        .ok_or_else(|| anyhow!("missing --opponent <team>"))?;
    let venue = match arg_value(args, "--venue")
        .unwrap_or_else(|| "home".to_string())
        .to_ascii_lowercase()
        .as_str()
    {
        "home" | "casa" => Venue::Home,
        "away" | "fora" => Venue::Away,
        other => return Err(anyhow!("unknown --venue {other}, expected home or away")),
    };
    let match_date = arg_value(args, "--date")
        .unwrap_or_else(|| Utc::now().format("%Y-%m-%dT%H:%M").to_string());

    Ok(JobParams {
        opponent,
        competition: arg_value(args, "--competition")
            .unwrap_or_else(|| DEFAULT_COMPETITION.to_string()),
        match_date,
        venue,
        special_directives: arg_value(args, "--directives").unwrap_or_default(),
        deep_dive: has_flag(args, "--deep-dive"),
    })
}

fn arg_value(args: &[String], name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(value) = arg.strip_prefix(&prefix) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == name {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() && !next.starts_with("--") {
                return Some(next.trim().to_string());
            }
        }
    }
    None
}

fn has_flag(args: &[String], name: &str) -> bool {
    args.iter().any(|arg| arg == name)
}
