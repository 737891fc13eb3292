//! Publishing jobs to the priority queues and the delayed set.

use crate::envelope::{DelayedEnvelope, JobEnvelope};
use crate::error::BrokerError;
use crate::queues::{DELAYED_SET, DLQ_STREAM, JobQueue};
use chrono::{DateTime, Duration, Utc};
use redis::aio::ConnectionManager;
use std::sync::Arc;
use tracing::{debug, warn};

/// How many due entries the promoter moves per pass.
const PROMOTE_BATCH: usize = 64;

/// Publishes job envelopes to the priority streams, parks them in the
/// delayed set, and promotes due entries back into their target stream.
///
/// # Example
///
/// ```rust,ignore
/// let producer = QueueProducer::new(redis);
/// producer.publish(&envelope, JobQueue::High).await?;
/// producer.publish_delayed(&envelope, JobQueue::High, Duration::seconds(4)).await?;
/// ```
pub struct QueueProducer {
    redis: Arc<ConnectionManager>,
}

impl QueueProducer {
    pub fn new(redis: ConnectionManager) -> Self {
        Self {
            redis: Arc::new(redis),
        }
    }

    /// Publish an envelope to a priority queue for immediate delivery.
    ///
    /// Returns the stream entry ID assigned by Redis.
    pub async fn publish(
        &self,
        envelope: &JobEnvelope,
        queue: JobQueue,
    ) -> Result<String, BrokerError> {
        let mut conn = (*self.redis).clone();
        let body = envelope.to_json()?;

        let message_id: String = redis::cmd("XADD")
            .arg(queue.stream())
            .arg("*")
            .arg("job")
            .arg(&body)
            .arg("priority")
            .arg(queue.broker_priority())
            .query_async(&mut conn)
            .await?;

        debug!(
            stream = %queue.stream(),
            message_id = %message_id,
            job_id = %envelope.job_id,
            "Published job"
        );

        Ok(message_id)
    }

    /// Park an envelope in the delayed set, to be released into `queue`
    /// after `delay`.
    pub async fn publish_delayed(
        &self,
        envelope: &JobEnvelope,
        queue: JobQueue,
        delay: Duration,
    ) -> Result<(), BrokerError> {
        self.publish_at(envelope, queue, Utc::now() + delay).await
    }

    /// Park an envelope in the delayed set until an absolute release
    /// instant. Used for jobs submitted with a future `scheduled_for`.
    pub async fn publish_at(
        &self,
        envelope: &JobEnvelope,
        queue: JobQueue,
        release_at: DateTime<Utc>,
    ) -> Result<(), BrokerError> {
        let mut conn = (*self.redis).clone();

        let parked = DelayedEnvelope {
            queue,
            envelope: envelope.clone(),
        };
        let member = serde_json::to_string(&parked)?;

        let _: () = redis::cmd("ZADD")
            .arg(DELAYED_SET)
            .arg(release_at.timestamp_millis())
            .arg(&member)
            .query_async(&mut conn)
            .await?;

        debug!(
            job_id = %envelope.job_id,
            release_at = %release_at,
            stream = %queue.stream(),
            "Parked job for delayed delivery"
        );

        Ok(())
    }

    /// Move entries whose release instant has passed from the delayed set
    /// into their target streams. Returns the number promoted.
    ///
    /// XADD happens before ZREM: a crash between the two duplicates the
    /// message instead of losing it, and the lifecycle preconditions absorb
    /// the duplicate downstream.
    pub async fn promote_due(&self, now: DateTime<Utc>) -> Result<usize, BrokerError> {
        let mut conn = (*self.redis).clone();

        let due: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(DELAYED_SET)
            .arg("-inf")
            .arg(now.timestamp_millis())
            .arg("LIMIT")
            .arg(0)
            .arg(PROMOTE_BATCH)
            .query_async(&mut conn)
            .await?;

        let mut promoted = 0;
        for member in due {
            let parked: DelayedEnvelope = match serde_json::from_str(&member) {
                Ok(parked) => parked,
                Err(e) => {
                    warn!(error = %e, "Dropping unparseable delayed entry to DLQ");
                    self.reject_raw(&member, "unparseable delayed entry").await?;
                    let _: i64 = redis::cmd("ZREM")
                        .arg(DELAYED_SET)
                        .arg(&member)
                        .query_async(&mut conn)
                        .await?;
                    continue;
                }
            };

            self.publish(&parked.envelope, parked.queue).await?;

            let _: i64 = redis::cmd("ZREM")
                .arg(DELAYED_SET)
                .arg(&member)
                .query_async(&mut conn)
                .await?;
            promoted += 1;
        }

        if promoted > 0 {
            debug!(count = promoted, "Promoted delayed jobs");
        }

        Ok(promoted)
    }

    /// Append a raw (unparseable) body to the broker dead-letter stream.
    async fn reject_raw(&self, raw: &str, error: &str) -> Result<(), BrokerError> {
        let mut conn = (*self.redis).clone();

        let _: String = redis::cmd("XADD")
            .arg(DLQ_STREAM)
            .arg("*")
            .arg("raw")
            .arg(raw)
            .arg("error")
            .arg(error)
            .arg("failed_at")
            .arg(Utc::now().to_rfc3339())
            .query_async(&mut conn)
            .await?;

        Ok(())
    }

    /// Current length of a priority stream.
    pub async fn queue_depth(&self, queue: JobQueue) -> Result<usize, BrokerError> {
        let mut conn = (*self.redis).clone();
        let depth: usize = redis::cmd("XLEN")
            .arg(queue.stream())
            .query_async(&mut conn)
            .await?;
        Ok(depth)
    }

    /// Number of entries parked in the delayed set.
    pub async fn delayed_depth(&self) -> Result<usize, BrokerError> {
        let mut conn = (*self.redis).clone();
        let depth: usize = redis::cmd("ZCARD")
            .arg(DELAYED_SET)
            .query_async(&mut conn)
            .await?;
        Ok(depth)
    }

    /// Number of entries in the broker dead-letter stream.
    pub async fn dlq_depth(&self) -> Result<usize, BrokerError> {
        let mut conn = (*self.redis).clone();
        let depth: usize = redis::cmd("XLEN")
            .arg(DLQ_STREAM)
            .query_async(&mut conn)
            .await?;
        Ok(depth)
    }
}

impl Clone for QueueProducer {
    fn clone(&self) -> Self {
        Self {
            redis: Arc::clone(&self.redis),
        }
    }
}
