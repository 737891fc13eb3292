//! Queue topology constants.

use serde::{Deserialize, Serialize};

/// Consumer group shared by all worker processes.
pub const CONSUMER_GROUP: &str = "job_workers";

/// Broker-level dead-letter stream. Receives poison messages only; the
/// application-level quarantine record lives in the metadata store.
pub const DLQ_STREAM: &str = "jobs.dlq";

/// Sorted set holding messages awaiting delayed delivery, scored by their
/// release instant in epoch milliseconds.
pub const DELAYED_SET: &str = "jobs.delayed";

/// The three priority queues.
///
/// Consumers drain `High` before `Medium` before `Low` within every read
/// cycle; the numeric broker priority (10/5/1) rides along on each message
/// for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobQueue {
    High,
    Medium,
    Low,
}

impl JobQueue {
    /// Queues in dispatch order.
    pub const DISPATCH_ORDER: [JobQueue; 3] = [JobQueue::High, JobQueue::Medium, JobQueue::Low];

    /// The Redis stream backing this queue.
    pub fn stream(&self) -> &'static str {
        match self {
            JobQueue::High => "jobs.high",
            JobQueue::Medium => "jobs.medium",
            JobQueue::Low => "jobs.low",
        }
    }

    /// Numeric broker priority carried on each message.
    pub fn broker_priority(&self) -> u8 {
        match self {
            JobQueue::High => 10,
            JobQueue::Medium => 5,
            JobQueue::Low => 1,
        }
    }

    /// Position in the dispatch order (0 = drained first).
    pub fn dispatch_rank(&self) -> usize {
        match self {
            JobQueue::High => 0,
            JobQueue::Medium => 1,
            JobQueue::Low => 2,
        }
    }

    pub fn from_stream(name: &str) -> Option<Self> {
        match name {
            "jobs.high" => Some(JobQueue::High),
            "jobs.medium" => Some(JobQueue::Medium),
            "jobs.low" => Some(JobQueue::Low),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.stream())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_names() {
        assert_eq!(JobQueue::High.stream(), "jobs.high");
        assert_eq!(JobQueue::Medium.stream(), "jobs.medium");
        assert_eq!(JobQueue::Low.stream(), "jobs.low");
    }

    #[test]
    fn test_broker_priorities() {
        assert_eq!(JobQueue::High.broker_priority(), 10);
        assert_eq!(JobQueue::Medium.broker_priority(), 5);
        assert_eq!(JobQueue::Low.broker_priority(), 1);
    }

    #[test]
    fn test_dispatch_order() {
        let ranks: Vec<usize> = JobQueue::DISPATCH_ORDER
            .iter()
            .map(|q| q.dispatch_rank())
            .collect();
        assert_eq!(ranks, vec![0, 1, 2]);
    }

    #[test]
    fn test_from_stream_round_trip() {
        for queue in JobQueue::DISPATCH_ORDER {
            assert_eq!(JobQueue::from_stream(queue.stream()), Some(queue));
        }
        assert_eq!(JobQueue::from_stream("jobs.unknown"), None);
    }
}
