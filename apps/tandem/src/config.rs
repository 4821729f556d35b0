use std::env;
use std::time::Duration;

const DEFAULT_RELAY_URL: &str = "ws://127.0.0.1:4000/ws";
const DEFAULT_OFFER_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub relay_url: String,
    pub offer_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            relay_url: env::var("TANDEM_RELAY_URL")
                .ok()
                .unwrap_or_else(|| DEFAULT_RELAY_URL.to_string()),
            offer_timeout: env::var("TANDEM_OFFER_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(DEFAULT_OFFER_TIMEOUT_SECS)),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            relay_url: DEFAULT_RELAY_URL.to_string(),
            offer_timeout: Duration::from_secs(DEFAULT_OFFER_TIMEOUT_SECS),
        }
    }
}
