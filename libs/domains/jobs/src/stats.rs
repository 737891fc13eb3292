//! Read-only statistics for the monitoring dashboard.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sea_orm::Iterable;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cache::StatusCache;
use crate::error::JobResult;
use crate::models::{JobPriority, JobStatus};
use crate::repository::JobRepository;
use broker::{JobQueue, QueueProducer};

/// Point-in-time view over the metadata store, the queues and the worker
/// heartbeats.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub jobs_by_status: BTreeMap<String, u64>,
    pub jobs_by_type: BTreeMap<String, u64>,
    pub jobs_by_priority: BTreeMap<String, u64>,
    pub dead_letters: u64,
    /// Stream depths keyed by stream name
    pub queue_depths: BTreeMap<String, u64>,
    /// Entries parked for delayed delivery
    pub delayed: u64,
    /// Poison entries in the broker DLQ
    pub broker_dlq: u64,
    /// Workers with a live heartbeat
    pub live_workers: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

pub struct StatsAggregator<R: JobRepository> {
    repository: Arc<R>,
    producer: QueueProducer,
    cache: StatusCache,
}

impl<R: JobRepository> StatsAggregator<R> {
    pub fn new(repository: Arc<R>, producer: QueueProducer, cache: StatusCache) -> Self {
        Self {
            repository,
            producer,
            cache,
        }
    }

    pub async fn snapshot(&self) -> JobResult<QueueStats> {
        let mut jobs_by_status = BTreeMap::new();
        for status in JobStatus::iter() {
            let count = self.repository.count_with_status(status).await?;
            jobs_by_status.insert(status.to_string(), count);
        }

        let mut jobs_by_priority = BTreeMap::new();
        for priority in JobPriority::iter() {
            let count = self.repository.count_with_priority(priority).await?;
            jobs_by_priority.insert(priority.to_string(), count);
        }

        let jobs_by_type: BTreeMap<String, u64> =
            self.repository.counts_by_type().await?.into_iter().collect();

        let mut queue_depths = BTreeMap::new();
        for queue in JobQueue::DISPATCH_ORDER {
            let depth = self.producer.queue_depth(queue).await?;
            queue_depths.insert(queue.stream().to_string(), depth as u64);
        }

        let mut live_workers = self.cache.live_workers().await?;
        live_workers.sort_unstable();

        Ok(QueueStats {
            jobs_by_status,
            jobs_by_type,
            jobs_by_priority,
            dead_letters: self.repository.dead_letter_count().await?,
            queue_depths,
            delayed: self.producer.delayed_depth().await? as u64,
            broker_dlq: self.producer.dlq_depth().await? as u64,
            live_workers,
            generated_at: Utc::now(),
        })
    }
}
