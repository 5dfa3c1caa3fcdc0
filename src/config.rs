use std::env;
use std::time::Duration;

use crate::http_client::DEFAULT_REQUEST_TIMEOUT_SECS;

pub const DEFAULT_API_BASE: &str = "http://localhost:5000";
pub const DEFAULT_POLL_SECS: u64 = 5;
pub const DEFAULT_HOME_TEAM: &str = "Corinthians";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_base: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub transport_retries: u32,
    pub home_team: String,
    pub gemini_keys: Vec<String>,
    pub openrouter_keys: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            poll_interval: Duration::from_secs(DEFAULT_POLL_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            transport_retries: 0,
            home_team: DEFAULT_HOME_TEAM.to_string(),
            gemini_keys: Vec::new(),
            openrouter_keys: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let api_base = env::var("ANALYSIS_API_BASE")
            .ok()
            .map(|s| normalize_base(&s))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let poll_secs = env_u64("ANALYSIS_POLL_SECS", DEFAULT_POLL_SECS).clamp(1, 300);
        let timeout_secs =
            env_u64("ANALYSIS_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS).clamp(1, 600);
        let transport_retries = env_u64("POLL_TRANSPORT_RETRIES", 0).clamp(0, 10) as u32;
        let home_team = env::var("HOME_TEAM")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_HOME_TEAM.to_string());

        Self {
            api_base,
            poll_interval: Duration::from_secs(poll_secs),
            request_timeout: Duration::from_secs(timeout_secs),
            transport_retries,
            home_team,
            gemini_keys: env_keys("GEMINI_API_KEYS"),
            openrouter_keys: env_keys("OPENROUTER_API_KEYS"),
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|val| val.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_keys(key: &str) -> Vec<String> {
    env::var(key).map(|raw| parse_keys(&raw)).unwrap_or_default()
}

/// Splits a credential list on commas, semicolons and whitespace, dropping blanks.
pub fn parse_keys(raw: &str) -> Vec<String> {
    raw.split([',', ';', ' ', '\n', '\t'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn normalize_base(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}
