//! Inspection and administration of the broker dead-letter stream.
//!
//! `jobs.dlq` only ever holds poison messages (undecodable envelopes,
//! unregistered types, row-less scheduled emissions that failed). Jobs that
//! exhausted their retry budget are quarantined in the metadata store's
//! `dead_letters` table instead.

use crate::error::BrokerError;
use crate::queues::{DLQ_STREAM, JobQueue};
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

// Shape of XRANGE replies: entry id plus flat field/value pairs
type StreamEntries = Vec<(String, Vec<(String, String)>)>;

/// Manager for the poison-message stream.
pub struct PoisonQueue {
    redis: Arc<ConnectionManager>,
}

/// One poison entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoisonEntry {
    /// Entry id within `jobs.dlq`.
    pub dlq_id: String,
    /// Stream the message was consumed from.
    pub source: Option<String>,
    /// Entry id in the source stream.
    pub original_id: Option<String>,
    /// Raw message body.
    pub raw: String,
    /// Why it was rejected.
    pub error: String,
    pub failed_at: Option<DateTime<Utc>>,
}

/// Summary statistics for the poison stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoisonStats {
    pub length: i64,
    pub oldest_entry_id: Option<String>,
    pub newest_entry_id: Option<String>,
}

impl PoisonQueue {
    pub fn new(redis: ConnectionManager) -> Self {
        Self {
            redis: Arc::new(redis),
        }
    }

    pub async fn stats(&self) -> Result<PoisonStats, BrokerError> {
        let mut conn = (*self.redis).clone();

        let length: i64 = conn.xlen(DLQ_STREAM).await.unwrap_or(0);

        let oldest: Option<StreamEntries> = redis::cmd("XRANGE")
            .arg(DLQ_STREAM)
            .arg("-")
            .arg("+")
            .arg("COUNT")
            .arg(1)
            .query_async(&mut conn)
            .await
            .ok();

        let newest: Option<StreamEntries> = redis::cmd("XREVRANGE")
            .arg(DLQ_STREAM)
            .arg("+")
            .arg("-")
            .arg("COUNT")
            .arg(1)
            .query_async(&mut conn)
            .await
            .ok();

        Ok(PoisonStats {
            length,
            oldest_entry_id: oldest.and_then(|v| v.first().map(|(id, _)| id.clone())),
            newest_entry_id: newest.and_then(|v| v.first().map(|(id, _)| id.clone())),
        })
    }

    /// List entries, oldest first.
    pub async fn list(
        &self,
        count: usize,
        start: Option<&str>,
    ) -> Result<Vec<PoisonEntry>, BrokerError> {
        let mut conn = (*self.redis).clone();

        let entries: StreamEntries = redis::cmd("XRANGE")
            .arg(DLQ_STREAM)
            .arg(start.unwrap_or("-"))
            .arg("+")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        Ok(entries
            .into_iter()
            .map(|(id, fields)| Self::entry_from_fields(id, &fields))
            .collect())
    }

    fn entry_from_fields(dlq_id: String, fields: &[(String, String)]) -> PoisonEntry {
        let get = |key: &str| {
            fields
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        };

        PoisonEntry {
            dlq_id,
            source: get("source"),
            original_id: get("original_id"),
            raw: get("raw").unwrap_or_default(),
            error: get("error").unwrap_or_default(),
            failed_at: get("failed_at")
                .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }

    /// Push one poison entry back onto its source stream (e.g. after the
    /// missing handler was deployed), then delete it from the DLQ.
    ///
    /// Returns false when the entry does not exist or has no replayable
    /// source.
    pub async fn requeue(&self, dlq_id: &str) -> Result<bool, BrokerError> {
        let mut conn = (*self.redis).clone();

        let entries: StreamEntries = redis::cmd("XRANGE")
            .arg(DLQ_STREAM)
            .arg(dlq_id)
            .arg(dlq_id)
            .query_async(&mut conn)
            .await?;

        let Some((id, fields)) = entries.into_iter().next() else {
            return Ok(false);
        };
        let entry = Self::entry_from_fields(id, &fields);

        let Some(source) = entry.source.as_deref().and_then(JobQueue::from_stream) else {
            debug!(dlq_id = %dlq_id, "Poison entry has no replayable source stream");
            return Ok(false);
        };

        let _: String = redis::cmd("XADD")
            .arg(source.stream())
            .arg("*")
            .arg("job")
            .arg(&entry.raw)
            .arg("priority")
            .arg(source.broker_priority())
            .query_async(&mut conn)
            .await?;

        let _: i64 = conn.xdel(DLQ_STREAM, &[dlq_id]).await?;

        info!(dlq_id = %dlq_id, stream = %source.stream(), "Requeued poison entry");
        Ok(true)
    }

    /// Delete one entry.
    pub async fn delete(&self, dlq_id: &str) -> Result<bool, BrokerError> {
        let mut conn = (*self.redis).clone();
        let deleted: i64 = conn.xdel(DLQ_STREAM, &[dlq_id]).await?;
        Ok(deleted > 0)
    }

    /// Delete every entry. Returns how many were purged.
    pub async fn purge(&self) -> Result<i64, BrokerError> {
        let mut conn = (*self.redis).clone();

        let len: i64 = conn.xlen(DLQ_STREAM).await?;
        if len > 0 {
            let _: () = redis::cmd("XTRIM")
                .arg(DLQ_STREAM)
                .arg("MAXLEN")
                .arg(0)
                .query_async(&mut conn)
                .await?;
            info!(count = len, "Purged poison queue");
        }

        Ok(len)
    }
}

impl Clone for PoisonQueue {
    fn clone(&self) -> Self {
        Self {
            redis: Arc::clone(&self.redis),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_from_fields() {
        let fields = vec![
            ("source".to_string(), "jobs.low".to_string()),
            ("original_id".to_string(), "1-0".to_string()),
            ("raw".to_string(), "{not json".to_string()),
            ("error".to_string(), "missing 'job' field".to_string()),
        ];

        let entry = PoisonQueue::entry_from_fields("2-0".to_string(), &fields);
        assert_eq!(entry.dlq_id, "2-0");
        assert_eq!(entry.source.as_deref(), Some("jobs.low"));
        assert_eq!(entry.error, "missing 'job' field");
        assert!(entry.failed_at.is_none());
    }
}
