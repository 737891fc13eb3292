//! The canonical message envelope.

use crate::queues::JobQueue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Job payloads are JSON objects end to end.
pub type PayloadMap = serde_json::Map<String, serde_json::Value>;

/// Canonical queue message body.
///
/// `job_id` is a string rather than a UUID because scheduled emissions use
/// synthetic ids of the form `scheduled-<schedule_id>-<unix_seconds>` that
/// have no row in the jobs table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub job_id: String,
    pub job_type: String,
    pub payload: PayloadMap,
}

impl JobEnvelope {
    pub fn new(
        job_id: impl Into<String>,
        job_type: impl Into<String>,
        payload: PayloadMap,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            job_type: job_type.into(),
            payload,
        }
    }

    /// Envelope for a recurring-schedule emission.
    pub fn scheduled(
        schedule_id: Uuid,
        fired_at: DateTime<Utc>,
        job_type: impl Into<String>,
        payload: PayloadMap,
    ) -> Self {
        Self {
            job_id: format!("scheduled-{}-{}", schedule_id, fired_at.timestamp()),
            job_type: job_type.into(),
            payload,
        }
    }

    /// The job id as a UUID, when this envelope refers to a persisted job.
    pub fn job_uuid(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.job_id).ok()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

/// A parked envelope in the delayed set: the envelope plus the queue it is
/// released into when due.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelayedEnvelope {
    pub queue: JobQueue,
    pub envelope: JobEnvelope,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payload() -> PayloadMap {
        let mut payload = PayloadMap::new();
        payload.insert("to".to_string(), serde_json::json!("a@b"));
        payload.insert("subject".to_string(), serde_json::json!("x"));
        payload
    }

    #[test]
    fn test_envelope_round_trip() {
        let id = Uuid::new_v4();
        let envelope = JobEnvelope::new(id.to_string(), "send_email", sample_payload());

        let json = envelope.to_json().unwrap();
        let decoded = JobEnvelope::from_json(&json).unwrap();

        assert_eq!(decoded, envelope);
        assert_eq!(decoded.job_uuid(), Some(id));
    }

    #[test]
    fn test_envelope_wire_shape() {
        let envelope = JobEnvelope::new("abc", "scrape_website", PayloadMap::new());
        let value: serde_json::Value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(value["job_id"], "abc");
        assert_eq!(value["job_type"], "scrape_website");
        assert!(value["payload"].is_object());
    }

    #[test]
    fn test_scheduled_envelope_id_shape() {
        let schedule_id = Uuid::new_v4();
        let fired_at = Utc::now();
        let envelope =
            JobEnvelope::scheduled(schedule_id, fired_at, "send_email", PayloadMap::new());

        assert_eq!(
            envelope.job_id,
            format!("scheduled-{}-{}", schedule_id, fired_at.timestamp())
        );
        // Synthetic ids never resolve to a persisted job
        assert!(envelope.job_uuid().is_none());
    }

    #[test]
    fn test_delayed_envelope_round_trip() {
        let parked = DelayedEnvelope {
            queue: JobQueue::Low,
            envelope: JobEnvelope::new("abc", "process_video", PayloadMap::new()),
        };

        let json = serde_json::to_string(&parked).unwrap();
        assert!(json.contains("\"queue\":\"low\""));

        let decoded: DelayedEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.queue, JobQueue::Low);
        assert_eq!(decoded.envelope.job_type, "process_video");
    }
}
