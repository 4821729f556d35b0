use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env::var("TANDEM_RELAY_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(4000),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self { port: 4000 }
    }
}
