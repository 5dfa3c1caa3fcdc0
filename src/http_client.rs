use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

pub fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent("match-oracle/0.1")
        .build()
        .context("failed to build http client")
}
