#[cfg(feature = "config")]
use core_config::{ConfigError, FromEnv, var, var_parsed};

/// Connection settings for the broker/cache Redis.
///
/// With the `config` feature this loads from `REDIS_URL` (or `REDIS_HOST`
/// for older deployments) plus `REDIS_CONNECT_ATTEMPTS`.
#[derive(Clone, Debug)]
pub struct RedisConfig {
    /// Connection URL, e.g. "redis://127.0.0.1:6379"
    pub url: String,
    /// Attempt budget for `connect_with_retry` at process startup
    pub connect_attempts: u32,
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_attempts: 5,
        }
    }

    pub fn with_connect_attempts(mut self, attempts: u32) -> Self {
        self.connect_attempts = attempts;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self::new("redis://127.0.0.1:6379")
    }
}

#[cfg(feature = "config")]
impl FromEnv for RedisConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let url = var("REDIS_URL")
            .or_else(|| var("REDIS_HOST"))
            .ok_or_else(|| ConfigError::Missing("REDIS_URL or REDIS_HOST".to_string()))?;

        Ok(Self {
            url,
            connect_attempts: var_parsed("REDIS_CONNECT_ATTEMPTS", 5)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RedisConfig::default();
        assert_eq!(config.url(), "redis://127.0.0.1:6379");
        assert_eq!(config.connect_attempts, 5);
    }

    #[cfg(feature = "config")]
    #[test]
    fn test_from_env_prefers_redis_url() {
        temp_env::with_vars(
            [
                ("REDIS_URL", Some("redis://broker:6379")),
                ("REDIS_HOST", Some("redis://ignored:6379")),
            ],
            || {
                let config = RedisConfig::from_env().unwrap();
                assert_eq!(config.url, "redis://broker:6379");
            },
        );
    }

    #[cfg(feature = "config")]
    #[test]
    fn test_from_env_falls_back_to_redis_host() {
        temp_env::with_vars(
            [
                ("REDIS_URL", None::<&str>),
                ("REDIS_HOST", Some("redis://fallback:6379")),
            ],
            || {
                let config = RedisConfig::from_env().unwrap();
                assert_eq!(config.url, "redis://fallback:6379");
            },
        );
    }

    #[cfg(feature = "config")]
    #[test]
    fn test_from_env_missing_both() {
        temp_env::with_vars(
            [("REDIS_URL", None::<&str>), ("REDIS_HOST", None::<&str>)],
            || {
                let err = RedisConfig::from_env().unwrap_err();
                assert!(err.to_string().contains("REDIS"));
            },
        );
    }
}
