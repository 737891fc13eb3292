//! Database connectors for the job queue: PostgreSQL (metadata store) and
//! Redis (broker + status cache).
//!
//! Connecting at startup retries with doubling smeared waits up to the
//! attempt budget on each backend's config, per the expectation that the
//! stores may come up alongside the workers.
//!
//! # Features
//!
//! - `postgres` (default) - PostgreSQL support with SeaORM
//! - `redis` (default) - Redis support
//! - `config` - `FromEnv` loading via `core_config`
//!
//! # Examples
//!
//! ```ignore
//! let db = database::postgres::connect_with_retry(&pg_config).await?;
//! let redis = database::redis::connect_with_retry(&redis_config).await?;
//! ```

pub mod common;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "redis")]
pub mod redis;

pub use common::{DatabaseError, DatabaseResult};
