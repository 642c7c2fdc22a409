use std::time::Duration;

/// Timing knobs for the wait phase. Defaults match the production web
/// client: a 60 second prompt budget, booking status read every 4 seconds,
/// verification fallback every 5.
#[derive(Debug, Clone)]
pub struct FlowConfig {
    pub countdown_secs: u32,
    pub booking_poll_secs: u64,
    pub verify_poll_secs: u64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            countdown_secs: 60,
            booking_poll_secs: 4,
            verify_poll_secs: 5,
        }
    }
}

impl FlowConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            countdown_secs: env_parsed("PESAFLOW_COUNTDOWN_SECS", defaults.countdown_secs),
            booking_poll_secs: env_parsed("PESAFLOW_BOOKING_POLL_SECS", defaults.booking_poll_secs),
            verify_poll_secs: env_parsed("PESAFLOW_VERIFY_POLL_SECS", defaults.verify_poll_secs),
        }
    }

    pub fn booking_poll_interval(&self) -> Duration {
        Duration::from_secs(self.booking_poll_secs)
    }

    pub fn verify_poll_interval(&self) -> Duration {
        Duration::from_secs(self.verify_poll_secs)
    }
}

/// Connection settings for the REST API the adapters talk to.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
}

impl ApiConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("PESAFLOW_API_URL")
                .unwrap_or_else(|_| "http://localhost:8000/api".to_string()),
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
