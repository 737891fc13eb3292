use sea_orm::ConnectOptions;
use std::time::Duration;

#[cfg(feature = "config")]
use core_config::{ConfigError, FromEnv, require, var_parsed};

/// Pool and startup settings for the metadata store.
///
/// With the `config` feature this loads from `DATABASE_URL` (required)
/// plus `PG_MAX_CONNECTIONS`, `PG_MIN_CONNECTIONS`,
/// `PG_ACQUIRE_TIMEOUT_SECS` and `PG_CONNECT_ATTEMPTS`.
#[derive(Clone, Debug)]
pub struct PostgresConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    /// Attempt budget for `connect_with_retry` at process startup
    pub connect_attempts: u32,
}

impl PostgresConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 50,
            min_connections: 2,
            acquire_timeout_secs: 8,
            connect_attempts: 5,
        }
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_connect_attempts(mut self, attempts: u32) -> Self {
        self.connect_attempts = attempts;
        self
    }

    /// SeaORM connect options for this configuration.
    pub fn connect_options(&self) -> ConnectOptions {
        let timeout = Duration::from_secs(self.acquire_timeout_secs);

        let mut opt = ConnectOptions::new(&self.url);
        opt.max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .connect_timeout(timeout)
            .acquire_timeout(timeout)
            .sqlx_logging(false);
        opt
    }
}

#[cfg(feature = "config")]
impl FromEnv for PostgresConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            url: require("DATABASE_URL")?,
            max_connections: var_parsed("PG_MAX_CONNECTIONS", 50)?,
            min_connections: var_parsed("PG_MIN_CONNECTIONS", 2)?,
            acquire_timeout_secs: var_parsed("PG_ACQUIRE_TIMEOUT_SECS", 8)?,
            connect_attempts: var_parsed("PG_CONNECT_ATTEMPTS", 5)?,
        })
    }
}
