use std::time::{Duration, Instant};

use match_oracle::config::{AppConfig, parse_keys};
use match_oracle::credentials::{CredentialPool, EXHAUSTION_COOLDOWN, Provider};

fn next_secret(pool: &mut CredentialPool, now: Instant) -> Option<String> {
    pool.acquire_at(Provider::Gemini, now).map(|c| c.secret)
}

#[test]
fn interleaved_cooldowns_expire_independently() {
    let mut pool = CredentialPool::new();
    pool.add_keys(Provider::Gemini, parse_keys("k1,k2,k3"));
    let t0 = Instant::now();

    pool.report_exhausted_at(Provider::Gemini, "k1", t0);
    let t30 = t0 + Duration::from_secs(30);
    pool.report_exhausted_at(Provider::Gemini, "k2", t30);
    assert_eq!(next_secret(&mut pool, t30).as_deref(), Some("k3"));
    assert_eq!(pool.available_count_at(Provider::Gemini, t30), 1);

    let t66 = t0 + Duration::from_secs(66);
    assert_eq!(pool.available_count_at(Provider::Gemini, t66), 2);
    assert_eq!(next_secret(&mut pool, t66).as_deref(), Some("k1"));
    assert_eq!(next_secret(&mut pool, t66).as_deref(), Some("k3"));

    let k2_back = t30 + EXHAUSTION_COOLDOWN;
    assert_eq!(pool.available_count_at(Provider::Gemini, k2_back), 3);
    assert_eq!(next_secret(&mut pool, k2_back).as_deref(), Some("k1"));
    assert_eq!(next_secret(&mut pool, k2_back).as_deref(), Some("k2"));
}

#[test]
fn pool_is_built_from_configured_key_lists() {
    let cfg = AppConfig {
        gemini_keys: parse_keys("g1; g2"),
        openrouter_keys: parse_keys("o1"),
        ..AppConfig::default()
    };
    let pool = CredentialPool::from_config(&cfg);
    assert_eq!(pool.len(Provider::Gemini), 2);
    assert_eq!(pool.len(Provider::OpenRouter), 1);
    assert!(!pool.is_empty(Provider::OpenRouter));
}

#[test]
fn full_lap_starts_from_the_cursor() {
    let mut pool = CredentialPool::new();
    pool.add_keys(
        Provider::OpenRouter,
        ["a", "b", "c", "d"].iter().map(|k| k.to_string()),
    );
    let now = Instant::now();
    assert_eq!(
        pool.acquire_at(Provider::OpenRouter, now).map(|c| c.secret).as_deref(),
        Some("a")
    );

    let lap: Vec<String> = (0..4)
        .filter_map(|_| pool.acquire_at(Provider::OpenRouter, now))
        .map(|c| c.secret)
        .collect();
    assert_eq!(lap, vec!["b", "c", "d", "a"]);
}
