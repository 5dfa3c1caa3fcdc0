use std::collections::HashMap;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::config::AppConfig;

/// Keys reported as exhausted sit out one per-minute quota window plus margin.
pub const EXHAUSTION_COOLDOWN: Duration = Duration::from_secs(65);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Gemini,
    OpenRouter,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::Gemini, Provider::OpenRouter];

    pub fn label(self) -> &'static str {
        match self {
            Provider::Gemini => "gemini",
            Provider::OpenRouter => "openrouter",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub secret: String,
    pub provider: Provider,
    pub cooldown_until: Option<Instant>,
}

impl Credential {
    fn is_available_at(&self, now: Instant) -> bool {
        match self.cooldown_until {
            Some(until) => until <= now,
            None => true,
        }
    }
}

#[derive(Debug, Default)]
struct ProviderKeys {
    keys: Vec<Credential>,
    cursor: usize,
}

#[derive(Debug, Default)]
pub struct CredentialPool {
    providers: HashMap<Provider, ProviderKeys>,
}

impl CredentialPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        let mut pool = Self::new();
        pool.add_keys(Provider::Gemini, cfg.gemini_keys.iter().cloned());
        pool.add_keys(Provider::OpenRouter, cfg.openrouter_keys.iter().cloned());
        for provider in Provider::ALL {
            if pool.len(provider) == 0 {
                warn!(
                    provider = provider.label(),
                    "no API keys configured; calls that need this provider will fail"
                );
            }
        }
        pool
    }

    pub fn add_keys<I>(&mut self, provider: Provider, secrets: I)
    where
        I: IntoIterator<Item = String>,
    {
        let entry = self.providers.entry(provider).or_default();
        for secret in secrets {
            let secret = secret.trim().to_string();
            if secret.is_empty() || entry.keys.iter().any(|k| k.secret == secret) {
                continue;
            }
            entry.keys.push(Credential {
                secret,
                provider,
                cooldown_until: None,
            });
        }
    }

    pub fn len(&self, provider: Provider) -> usize {
        self.providers.get(&provider).map_or(0, |p| p.keys.len())
    }

    pub fn is_empty(&self, provider: Provider) -> bool {
        self.len(provider) == 0
    }

    pub fn available_count_at(&self, provider: Provider, now: Instant) -> usize {
        self.providers.get(&provider).map_or(0, |p| {
            p.keys.iter().filter(|k| k.is_available_at(now)).count()
        })
    }

    pub fn acquire(&mut self, provider: Provider) -> Option<Credential> {
        self.acquire_at(provider, Instant::now())
    }

    /// Returns the next key whose cooldown has passed, scanning circularly from
    /// the cursor. The cursor moves to the slot after the returned key.
    pub fn acquire_at(&mut self, provider: Provider, now: Instant) -> Option<Credential> {
        let pool = self.providers.get_mut(&provider)?;
        let len = pool.keys.len();
        if len == 0 {
            return None;
        }

        let mut idx = pool.cursor % len;
        for _ in 0..len {
            if pool.keys[idx].is_available_at(now) {
                pool.cursor = (idx + 1) % len;
                return Some(pool.keys[idx].clone());
            }
            idx = (idx + 1) % len;
        }
        None
    }

    pub fn report_exhausted(&mut self, provider: Provider, secret: &str) {
        self.report_exhausted_at(provider, secret, Instant::now());
    }

    /// Starts a fresh cooldown window from `now`. Unknown secrets are ignored.
    pub fn report_exhausted_at(&mut self, provider: Provider, secret: &str, now: Instant) {
        let Some(pool) = self.providers.get_mut(&provider) else {
            return;
        };
        let Some(key) = pool.keys.iter_mut().find(|k| k.secret == secret) else {
            return;
        };
        key.cooldown_until = Some(now + EXHAUSTION_COOLDOWN);
        info!(
            provider = provider.label(),
            key = %fingerprint(secret),
            cooldown_secs = EXHAUSTION_COOLDOWN.as_secs(),
            "API key marked as exhausted"
        );
    }
}

/// Short stable identifier for a key that is safe to print.
pub fn fingerprint(secret: &str) -> String {
    let digest = Sha256::digest(secret.as_bytes());
    digest.iter().take(4).map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_with(provider: Provider, keys: &[&str]) -> CredentialPool {
        let mut pool = CredentialPool::new();
        pool.add_keys(provider, keys.iter().map(|k| k.to_string()));
        pool
    }

    #[test]
    fn round_robin_in_insertion_order() {
        let mut pool = pool_with(Provider::Gemini, &["a", "b", "c"]);
        let now = Instant::now();
        let got: Vec<String> = (0..3)
            .filter_map(|_| pool.acquire_at(Provider::Gemini, now))
            .map(|c| c.secret)
            .collect();
        assert_eq!(got, vec!["a", "b", "c"]);
        let wrapped = pool.acquire_at(Provider::Gemini, now).unwrap();
        assert_eq!(wrapped.secret, "a");
    }

    #[test]
    fn cursor_moves_past_the_returned_key_when_skipping() {
        let mut pool = pool_with(Provider::Gemini, &["a", "b", "c"]);
        let now = Instant::now();
        pool.report_exhausted_at(Provider::Gemini, "a", now);
        assert_eq!(pool.acquire_at(Provider::Gemini, now).unwrap().secret, "b");
        assert_eq!(pool.acquire_at(Provider::Gemini, now).unwrap().secret, "c");
        assert_eq!(pool.acquire_at(Provider::Gemini, now).unwrap().secret, "b");
    }

    #[test]
    fn empty_and_all_cooling_yield_none() {
        let mut empty = CredentialPool::new();
        assert!(empty.acquire(Provider::OpenRouter).is_none());

        let mut pool = pool_with(Provider::OpenRouter, &["x", "y"]);
        let now = Instant::now();
        pool.report_exhausted_at(Provider::OpenRouter, "x", now);
        pool.report_exhausted_at(Provider::OpenRouter, "y", now);
        assert!(pool.acquire_at(Provider::OpenRouter, now).is_none());
        assert_eq!(pool.available_count_at(Provider::OpenRouter, now), 0);
    }

    #[test]
    fn providers_do_not_share_keys() {
        let mut pool = pool_with(Provider::Gemini, &["g1"]);
        assert!(pool.acquire(Provider::OpenRouter).is_none());
        pool.report_exhausted(Provider::OpenRouter, "g1");
        assert_eq!(pool.acquire(Provider::Gemini).unwrap().secret, "g1");
    }

    #[test]
    fn rereport_restarts_window_instead_of_adding() {
        let mut pool = pool_with(Provider::Gemini, &["a"]);
        let t0 = Instant::now();
        pool.report_exhausted_at(Provider::Gemini, "a", t0);
        let t1 = t0 + Duration::from_secs(30);
        pool.report_exhausted_at(Provider::Gemini, "a", t1);
        assert!(pool.acquire_at(Provider::Gemini, t1 + Duration::from_secs(64)).is_none());
        assert!(pool.acquire_at(Provider::Gemini, t1 + EXHAUSTION_COOLDOWN).is_some());
    }

    #[test]
    fn unknown_secret_is_ignored() {
        let mut pool = pool_with(Provider::Gemini, &["a"]);
        pool.report_exhausted(Provider::Gemini, "nope");
        assert_eq!(pool.available_count_at(Provider::Gemini, Instant::now()), 1);
    }

    #[test]
    fn duplicate_and_blank_keys_are_skipped() {
        let pool = pool_with(Provider::Gemini, &["a", " ", "a", "b"]);
        assert_eq!(pool.len(Provider::Gemini), 2);
    }

    #[test]
    fn fingerprint_hides_the_secret() {
        let fp = fingerprint("sk-secret-value");
        assert_eq!(fp.len(), 8);
        assert!(!fp.contains("secret"));
        assert_eq!(fp, fingerprint("sk-secret-value"));
    }
}
