//! Redis status mirror and worker heartbeats.
//!
//! The cache is a fast-read mirror only: the metadata store stays
//! authoritative, and every write here is best-effort from the caller's
//! point of view.

use crate::error::JobResult;
use crate::models::{JobStatus, WorkerHeartbeat};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use uuid::Uuid;

/// TTL for `job:<id>:status` mirror keys.
const STATUS_TTL_SECS: u64 = 3600;

/// TTL for `worker/<id>` heartbeat keys. A worker refreshing every 20 s
/// gets three chances before it is presumed dead.
pub const WORKER_TTL_SECS: u64 = 60;

/// Interval at which a live worker refreshes its heartbeat.
pub const HEARTBEAT_INTERVAL_SECS: u64 = 20;

#[derive(Clone)]
pub struct StatusCache {
    redis: ConnectionManager,
}

impl StatusCache {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    fn status_key(job_id: Uuid) -> String {
        format!("job:{}:status", job_id)
    }

    fn worker_key(worker_id: &str) -> String {
        format!("worker/{}", worker_id)
    }

    /// Mirror a job's status with a one-hour TTL.
    pub async fn set_status(&self, job_id: Uuid, status: JobStatus) -> JobResult<()> {
        let mut conn = self.redis.clone();
        conn.set_ex::<_, _, ()>(Self::status_key(job_id), status.to_string(), STATUS_TTL_SECS)
            .await?;
        Ok(())
    }

    /// Read the mirrored status, if the key is still live.
    pub async fn get_status(&self, job_id: Uuid) -> JobResult<Option<String>> {
        let mut conn = self.redis.clone();
        let status: Option<String> = conn.get(Self::status_key(job_id)).await?;
        Ok(status)
    }

    /// Refresh this worker's heartbeat key.
    pub async fn heartbeat(&self, beat: &WorkerHeartbeat) -> JobResult<()> {
        let mut conn = self.redis.clone();
        let payload = serde_json::to_string(beat)
            .map_err(|e| crate::error::JobError::Internal(e.to_string()))?;
        conn.set_ex::<_, _, ()>(Self::worker_key(&beat.worker_id), payload, WORKER_TTL_SECS)
            .await?;
        Ok(())
    }

    /// Whether a worker's heartbeat key is still live.
    pub async fn worker_alive(&self, worker_id: &str) -> JobResult<bool> {
        let mut conn = self.redis.clone();
        let exists: bool = conn.exists(Self::worker_key(worker_id)).await?;
        Ok(exists)
    }

    /// IDs of workers with a live heartbeat.
    pub async fn live_workers(&self) -> JobResult<Vec<String>> {
        let mut conn = self.redis.clone();
        let keys: Vec<String> = conn.keys("worker/*").await?;
        Ok(keys
            .into_iter()
            .filter_map(|k| k.strip_prefix("worker/").map(String::from))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_shapes() {
        let id = Uuid::nil();
        assert_eq!(
            StatusCache::status_key(id),
            "job:00000000-0000-0000-0000-000000000000:status"
        );
        assert_eq!(StatusCache::worker_key("w-1"), "worker/w-1");
    }

    #[test]
    fn test_heartbeat_cadence_fits_ttl() {
        // Three missed beats before the key lapses
        assert!(HEARTBEAT_INTERVAL_SECS * 3 == WORKER_TTL_SECS);
    }
}
