//! Broker layer for the job queue, built on Redis Streams.
//!
//! Responsibilities:
//! - The queue topology: three durable priority streams (`jobs.high`,
//!   `jobs.medium`, `jobs.low`) consumed through one consumer group
//! - The canonical message envelope (`{job_id, job_type, payload}`)
//! - Delayed re-delivery via the `jobs.delayed` sorted set and a promoter
//! - At-least-once consumption: explicit ACK, XAUTOCLAIM recovery of
//!   entries abandoned by crashed consumers
//! - The broker-level dead-letter stream `jobs.dlq` for poison messages
//! - Health/readiness endpoints and Prometheus metrics
//!
//! # Architecture
//!
//! ```text
//! submitters ──publish──▶ jobs.high / jobs.medium / jobs.low
//!                               ▲                │ (consumer group)
//!       promoter ──XADD─────────┘                ▼
//!    jobs.delayed (ZSET) ◀──publish_delayed── consumers ──reject──▶ jobs.dlq
//! ```

mod config;
mod consumer;
mod envelope;
mod error;
mod health;
mod producer;
mod queues;

pub mod dlq;
pub mod metrics;

pub use config::ConsumerConfig;
pub use consumer::{DecodeFailure, Delivery, QueueConsumer};
pub use envelope::{DelayedEnvelope, JobEnvelope, PayloadMap};
pub use error::{BrokerError, Recovery};
pub use health::{HealthState, health_handler, health_router, queues_info_handler, ready_handler};
pub use producer::QueueProducer;
pub use queues::{CONSUMER_GROUP, DELAYED_SET, DLQ_STREAM, JobQueue};

/// Result type alias for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;
