use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::queue::QueueConfig;
use crate::services::aladhan::DEFAULT_BASE_URL;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://ayyamul_bidh.db?mode=rwc";

#[derive(Debug, Clone)]
pub struct Config {
    pub aladhan_base_url: String,
    pub database_url: String,
    pub http_timeout_seconds: u64,
    pub queue_max_concurrent: usize,
    pub queue_delay_ms: u64,
    pub queue_retry_attempts: u32,
    pub queue_retry_delay_ms: u64,
    pub queue_retry_jitter_ms: u64,
    pub prayer_cache_max_age_seconds: u64,
    pub refresh_interval_seconds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the config from any variable source. Unset variables take their
    /// defaults; set but invalid ones are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let text = |name: &str, default: &str| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let aladhan_base_url = text("ALADHAN_BASE_URL", DEFAULT_BASE_URL);
        if !aladhan_base_url.starts_with("http://") && !aladhan_base_url.starts_with("https://") {
            return Err(format!("Invalid ALADHAN_BASE_URL: {}", aladhan_base_url));
        }

        let http_timeout_seconds = number(&lookup, "HTTP_TIMEOUT_SECONDS", 10)?;
        if http_timeout_seconds == 0 {
            return Err("HTTP_TIMEOUT_SECONDS must be at least 1".to_string());
        }

        let queue_max_concurrent = number(&lookup, "QUEUE_MAX_CONCURRENT", 3)?;
        if queue_max_concurrent == 0 {
            return Err("QUEUE_MAX_CONCURRENT must be at least 1".to_string());
        }

        let refresh_interval_seconds = number(&lookup, "REFRESH_INTERVAL_SECONDS", 3600)?;
        if refresh_interval_seconds == 0 {
            return Err("REFRESH_INTERVAL_SECONDS must be at least 1".to_string());
        }

        Ok(Self {
            aladhan_base_url,
            database_url: text("DATABASE_URL", DEFAULT_DATABASE_URL),
            http_timeout_seconds,
            queue_max_concurrent,
            queue_delay_ms: number(&lookup, "QUEUE_DELAY_MS", 150)?,
            queue_retry_attempts: number(&lookup, "QUEUE_RETRY_ATTEMPTS", 2)?,
            queue_retry_delay_ms: number(&lookup, "QUEUE_RETRY_DELAY_MS", 1000)?,
            queue_retry_jitter_ms: number(&lookup, "QUEUE_RETRY_JITTER_MS", 0)?,
            prayer_cache_max_age_seconds: number(&lookup, "PRAYER_CACHE_MAX_AGE_SECONDS", 86_400)?,
            refresh_interval_seconds,
        })
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            max_concurrent: self.queue_max_concurrent,
            delay_between_dispatches: Duration::from_millis(self.queue_delay_ms),
            retry_attempts: self.queue_retry_attempts,
            retry_base_delay: Duration::from_millis(self.queue_retry_delay_ms),
            retry_jitter: Duration::from_millis(self.queue_retry_jitter_ms),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_seconds)
    }

    pub fn prayer_cache_max_age(&self) -> Duration {
        Duration::from_secs(self.prayer_cache_max_age_seconds)
    }
}

fn number<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T, String> {
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|_| format!("{} must be a valid number", name)),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.aladhan_base_url, "https://api.aladhan.com/v1");
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.refresh_interval_seconds, 3600);
        assert_eq!(config.prayer_cache_max_age(), Duration::from_secs(86_400));

        let queue = config.queue_config();
        assert_eq!(queue.max_concurrent, 3);
        assert_eq!(queue.delay_between_dispatches, Duration::from_millis(150));
        assert_eq!(queue.retry_attempts, 2);
        assert_eq!(queue.retry_base_delay, Duration::from_millis(1000));
        assert_eq!(queue.retry_jitter, Duration::ZERO);
    }

    #[test]
    fn values_are_read_from_the_environment() {
        let config = config_from(&[
            ("ALADHAN_BASE_URL", "http://localhost:8080/v1"),
            ("QUEUE_MAX_CONCURRENT", "5"),
            ("QUEUE_RETRY_JITTER_MS", "250"),
            ("HTTP_TIMEOUT_SECONDS", " 30 "),
        ])
        .unwrap();

        assert_eq!(config.aladhan_base_url, "http://localhost:8080/v1");
        assert_eq!(config.queue_max_concurrent, 5);
        assert_eq!(config.queue_config().retry_jitter, Duration::from_millis(250));
        assert_eq!(config.http_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn invalid_numbers_are_errors() {
        let err = config_from(&[("QUEUE_DELAY_MS", "soon")]).unwrap_err();
        assert_eq!(err, "QUEUE_DELAY_MS must be a valid number");

        assert!(config_from(&[("QUEUE_RETRY_ATTEMPTS", "-1")]).is_err());
        assert!(config_from(&[("QUEUE_MAX_CONCURRENT", "0")]).is_err());
        assert!(config_from(&[("ALADHAN_BASE_URL", "api.aladhan.com")]).is_err());
    }
}
