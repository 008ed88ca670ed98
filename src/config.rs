use std::env;
use std::time::Duration;

use anyhow::Context;

use crate::cache::RetryPolicy;

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_addr: String,
    pub appointments_url: String,
    pub appointments_token: Option<String>,
    pub fetch_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_vars(|key| env::var(key).ok())
    }

    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let appointments_url = var("APPOINTMENTS_URL").context("APPOINTMENTS_URL must be set")?;
        let bind_addr = var("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string());
        let appointments_token = var("APPOINTMENTS_TOKEN").filter(|t| !t.is_empty());
        let fetch_timeout_secs = var("FETCH_TIMEOUT_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(10);
        let max_attempts = var("REFRESH_MAX_ATTEMPTS")
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(3);
        let backoff_ms = var("REFRESH_BACKOFF_MS")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(250);

        Ok(Self {
            bind_addr,
            appointments_url,
            appointments_token,
            fetch_timeout: Duration::from_secs(fetch_timeout_secs),
            retry: match max_attempts {
                0 | 1 => RetryPolicy::none(),
                n => RetryPolicy {
                    max_attempts: n,
                    backoff: Duration::from_millis(backoff_ms),
                },
            },
        })
    }
}
