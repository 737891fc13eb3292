//! Consumer configuration.

use crate::queues::CONSUMER_GROUP;
use uuid::Uuid;

/// Configuration for a queue consumer.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Consumer group name.
    pub consumer_group: String,

    /// Unique consumer ID within the group (auto-generated if not set).
    pub consumer_id: String,

    /// Prefetch: maximum entries taken per read.
    pub batch_size: usize,

    /// Poll interval in milliseconds when no messages are available.
    pub poll_interval_ms: u64,

    /// Blocking read timeout in milliseconds (None = non-blocking polling).
    pub block_timeout_ms: Option<u64>,

    /// Idle time in seconds before an entry held by a dead consumer is
    /// claimed by someone else.
    pub claim_idle_time_secs: u64,
}

impl ConsumerConfig {
    pub fn new() -> Self {
        Self {
            consumer_group: CONSUMER_GROUP.to_string(),
            consumer_id: format!("worker-{}", Uuid::new_v4()),
            batch_size: 4,
            poll_interval_ms: 500,
            block_timeout_ms: None,
            claim_idle_time_secs: 30,
        }
    }

    pub fn with_consumer_id(mut self, id: impl Into<String>) -> Self {
        self.consumer_id = id.into();
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn with_poll_interval_ms(mut self, interval: u64) -> Self {
        self.poll_interval_ms = interval;
        self
    }

    pub fn with_blocking(mut self, timeout_ms: Option<u64>) -> Self {
        self.block_timeout_ms = timeout_ms;
        self
    }

    pub fn with_claim_idle_time_secs(mut self, secs: u64) -> Self {
        self.claim_idle_time_secs = secs;
        self
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self::new()
    }
}
