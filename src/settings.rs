use config::{Config, ConfigError};
use serde::Deserialize;
use std::time::Duration;

pub const ENV_PREFIX: &str = "GROWATT";
pub const API_URL: &str = "https://server.growatt.com/";
/// Seconds a login stays trusted
pub const SESSION_TTL: i64 = 30 * 60;
/// Seconds a snapshot is served from cache
pub const CACHE_TTL: i64 = 60;
pub const REQUEST_TIMEOUT: i64 = 30;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub api_url: String,
    /// Credentials are optional here; their absence is reported per request.
    pub username: Option<String>,
    pub password: Option<String>,
    pub session_ttl: u64,
    pub cache_ttl: u64,
    pub request_timeout: u64,
}

impl Settings {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

/// Read `GROWATT_*` environment variables on top of defaults.
pub fn read_settings() -> Result<Settings, ConfigError> {
    read_settings_with_prefix(ENV_PREFIX)
}

pub fn read_settings_with_prefix(prefix: &str) -> Result<Settings, ConfigError> {
    let mut settings = Config::default();
    settings
        .merge(config::Environment::with_prefix(prefix))?
        .set_default("api_url", API_URL)?
        .set_default("session_ttl", SESSION_TTL)?
        .set_default("cache_ttl", CACHE_TTL)?
        .set_default("request_timeout", REQUEST_TIMEOUT)?;

    settings.try_into()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_without_environment() {
        let settings = read_settings_with_prefix("GROWATT_TEST_DEFAULTS").unwrap();
        assert_eq!(API_URL, settings.api_url);
        assert_eq!(None, settings.username);
        assert_eq!(None, settings.password);
        assert_eq!(Duration::from_secs(1800), settings.session_ttl());
        assert_eq!(Duration::from_secs(60), settings.cache_ttl());
        assert_eq!(Duration::from_secs(30), settings.request_timeout());
    }

    #[test]
    fn environment_overrides() {
        std::env::set_var("GROWATT_TEST_ENV_USERNAME", "someone");
        std::env::set_var("GROWATT_TEST_ENV_PASSWORD", "secret");
        std::env::set_var("GROWATT_TEST_ENV_CACHE_TTL", "15");

        let settings = read_settings_with_prefix("GROWATT_TEST_ENV").unwrap();
        assert_eq!(Some("someone".to_string()), settings.username);
        assert_eq!(Some("secret".to_string()), settings.password);
        assert_eq!(15, settings.cache_ttl);
    }
}
