//! Consuming the priority streams through a consumer group.

use crate::config::ConsumerConfig;
use crate::envelope::JobEnvelope;
use crate::error::BrokerError;
use crate::queues::{DLQ_STREAM, JobQueue};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A message read from one of the priority streams.
#[derive(Debug)]
pub struct Delivery {
    pub queue: JobQueue,
    pub message_id: String,
    /// The decoded envelope, or the raw body plus the decode error for
    /// poison messages.
    pub envelope: Result<JobEnvelope, DecodeFailure>,
}

/// A stream entry whose body could not be decoded into an envelope.
#[derive(Debug, Clone)]
pub struct DecodeFailure {
    pub raw: String,
    pub reason: String,
}

/// Reads the three priority streams through the shared consumer group and
/// hands entries back in strict high → medium → low order.
///
/// Also owns the acknowledgement and recovery discipline:
/// - `ack` after the processing outcome is durably committed
/// - `reject_to_dlq` for poison messages
/// - XAUTOCLAIM-based recovery of entries abandoned by crashed consumers
pub struct QueueConsumer {
    redis: Arc<ConnectionManager>,
    config: ConsumerConfig,
}

impl QueueConsumer {
    pub fn new(redis: ConnectionManager, config: ConsumerConfig) -> Self {
        Self {
            redis: Arc::new(redis),
            config,
        }
    }

    pub fn redis(&self) -> &ConnectionManager {
        &self.redis
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    pub fn is_blocking(&self) -> bool {
        self.config.block_timeout_ms.is_some()
    }

    /// Ensure the consumer group exists on every priority stream.
    ///
    /// Groups start at "0" so a backlog published before any worker came up
    /// is still delivered.
    pub async fn ensure_groups(&self) -> Result<(), BrokerError> {
        let mut conn = (*self.redis).clone();

        for queue in JobQueue::DISPATCH_ORDER {
            let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
                .arg("CREATE")
                .arg(queue.stream())
                .arg(&self.config.consumer_group)
                .arg("0")
                .arg("MKSTREAM")
                .query_async(&mut conn)
                .await;

            match result {
                Ok(_) => {
                    info!(stream = %queue.stream(), group = %self.config.consumer_group, "Created consumer group");
                }
                Err(e) if e.to_string().contains("BUSYGROUP") => {
                    debug!(stream = %queue.stream(), "Consumer group already exists");
                }
                Err(e) => return Err(BrokerError::ConsumerGroup(e.to_string())),
            }
        }

        Ok(())
    }

    /// Read entries already delivered to this consumer but not yet ACKed.
    pub async fn read_pending(&self) -> Result<Vec<Delivery>, BrokerError> {
        self.read_with_ids(&["0", "0", "0"], false).await
    }

    /// Read new entries from the streams.
    ///
    /// Blocking mode waits on Redis up to `block_timeout_ms`; polling mode
    /// returns immediately and the caller sleeps between polls.
    pub async fn read_new(&self) -> Result<Vec<Delivery>, BrokerError> {
        self.read_with_ids(&[">", ">", ">"], true).await
    }

    async fn read_with_ids(
        &self,
        ids: &[&str; 3],
        allow_block: bool,
    ) -> Result<Vec<Delivery>, BrokerError> {
        let mut conn = (*self.redis).clone();

        let mut opts = StreamReadOptions::default()
            .group(&self.config.consumer_group, &self.config.consumer_id)
            .count(self.config.batch_size);

        if allow_block {
            if let Some(timeout_ms) = self.config.block_timeout_ms {
                opts = opts.block(timeout_ms as usize);
            }
        }

        let streams: Vec<&str> = JobQueue::DISPATCH_ORDER.iter().map(|q| q.stream()).collect();

        let result: Result<StreamReadReply, _> =
            conn.xread_options(&streams, ids, &opts).await;

        match result {
            Ok(reply) => Ok(self.parse_reply(reply)),
            // A blocking read that elapses without messages surfaces as a
            // timeout (or a nil reply) rather than an empty set
            Err(e) if e.is_timeout() || e.to_string().contains("nil") => Ok(vec![]),
            Err(e) => Err(BrokerError::Redis(e)),
        }
    }

    /// Flatten a reply into deliveries ordered high → medium → low.
    fn parse_reply(&self, reply: StreamReadReply) -> Vec<Delivery> {
        let mut deliveries = Vec::new();

        for stream_key in reply.keys {
            let Some(queue) = JobQueue::from_stream(&stream_key.key) else {
                warn!(stream = %stream_key.key, "Ignoring entries from unknown stream");
                continue;
            };

            for message in stream_key.ids {
                deliveries.push(Delivery {
                    queue,
                    message_id: message.id.clone(),
                    envelope: Self::decode_entry(&message.map),
                });
            }
        }

        deliveries.sort_by_key(|d| d.queue.dispatch_rank());
        deliveries
    }

    fn decode_entry(
        map: &HashMap<String, redis::Value>,
    ) -> Result<JobEnvelope, DecodeFailure> {
        let raw = match map.get("job") {
            Some(redis::Value::BulkString(bytes)) => String::from_utf8_lossy(bytes).to_string(),
            Some(redis::Value::SimpleString(s)) => s.clone(),
            Some(other) => {
                return Err(DecodeFailure {
                    raw: format!("{:?}", other),
                    reason: "invalid 'job' field type".to_string(),
                });
            }
            None => {
                return Err(DecodeFailure {
                    raw: format!("{:?}", map),
                    reason: "missing 'job' field".to_string(),
                });
            }
        };

        JobEnvelope::from_json(&raw).map_err(|e| DecodeFailure {
            raw,
            reason: e.to_string(),
        })
    }

    /// Acknowledge a processed entry.
    pub async fn ack(&self, queue: JobQueue, message_id: &str) -> Result<(), BrokerError> {
        let mut conn = (*self.redis).clone();

        let _: () = conn
            .xack(queue.stream(), &self.config.consumer_group, &[message_id])
            .await?;

        debug!(stream = %queue.stream(), message_id = %message_id, "Acknowledged message");
        Ok(())
    }

    /// Copy a poison entry to the broker dead-letter stream.
    ///
    /// The caller still ACKs the original entry afterwards.
    pub async fn reject_to_dlq(
        &self,
        queue: JobQueue,
        message_id: &str,
        raw: &str,
        error: &str,
    ) -> Result<(), BrokerError> {
        let mut conn = (*self.redis).clone();

        let _: String = redis::cmd("XADD")
            .arg(DLQ_STREAM)
            .arg("*")
            .arg("source")
            .arg(queue.stream())
            .arg("original_id")
            .arg(message_id)
            .arg("raw")
            .arg(raw)
            .arg("error")
            .arg(error)
            .arg("failed_at")
            .arg(chrono::Utc::now().to_rfc3339())
            .query_async(&mut conn)
            .await?;

        warn!(
            stream = %queue.stream(),
            message_id = %message_id,
            error = %error,
            "Rejected poison message to DLQ"
        );
        Ok(())
    }

    /// Claim every pending entry across all streams, regardless of idle
    /// time. Run on startup so entries held by a previous consumer id are
    /// not stranded.
    pub async fn claim_all_pending_on_startup(&self) -> Result<usize, BrokerError> {
        let mut total = 0;
        for queue in JobQueue::DISPATCH_ORDER {
            total += self.autoclaim(queue, 0, 100).await?;
        }

        if total > 0 {
            info!(
                count = total,
                consumer = %self.config.consumer_id,
                "Claimed pending messages on startup"
            );
        }

        Ok(total)
    }

    /// Claim entries abandoned by crashed consumers (idle past the
    /// configured threshold).
    pub async fn claim_abandoned(&self) -> Result<usize, BrokerError> {
        let idle_ms = self.config.claim_idle_time_secs * 1000;
        let mut total = 0;
        for queue in JobQueue::DISPATCH_ORDER {
            total += self.autoclaim(queue, idle_ms, 10).await?;
        }

        if total > 0 {
            info!(
                count = total,
                consumer = %self.config.consumer_id,
                "Claimed abandoned messages"
            );
        }

        Ok(total)
    }

    /// Run XAUTOCLAIM over one stream, paging until exhausted.
    async fn autoclaim(
        &self,
        queue: JobQueue,
        min_idle_ms: u64,
        count: usize,
    ) -> Result<usize, BrokerError> {
        let mut conn = (*self.redis).clone();
        let mut claimed = 0;
        let mut start_id = "0-0".to_string();

        loop {
            // XAUTOCLAIM returns [next-start-id, [[msg-id, fields], ...], [deleted-ids]]
            let result: redis::Value = redis::cmd("XAUTOCLAIM")
                .arg(queue.stream())
                .arg(&self.config.consumer_group)
                .arg(&self.config.consumer_id)
                .arg(min_idle_ms)
                .arg(&start_id)
                .arg("COUNT")
                .arg(count)
                .query_async(&mut conn)
                .await
                .unwrap_or(redis::Value::Nil);

            let redis::Value::Array(arr) = &result else {
                break;
            };
            if arr.len() < 2 {
                break;
            }

            match &arr[0] {
                redis::Value::BulkString(next_id) => {
                    let next = String::from_utf8_lossy(next_id).to_string();
                    if next == "0-0" {
                        if let redis::Value::Array(messages) = &arr[1] {
                            claimed += messages.len();
                        }
                        break;
                    }
                    start_id = next;
                }
                _ => break,
            }

            match &arr[1] {
                redis::Value::Array(messages) => {
                    claimed += messages.len();
                    if messages.is_empty() {
                        break;
                    }
                }
                _ => break,
            }
        }

        Ok(claimed)
    }
}
