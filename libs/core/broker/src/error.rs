//! Error types for broker operations.

use thiserror::Error;

/// Errors that can occur while talking to the broker.
#[derive(Error, Debug)]
pub enum BrokerError {
    /// Redis connection or command error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// JSON serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Malformed or missing envelope in a stream entry.
    #[error("Envelope error: {0}")]
    Envelope(String),

    /// Consumer group error.
    #[error("Consumer group error: {0}")]
    ConsumerGroup(String),

    /// Stream/queue operation error.
    #[error("Queue error: {0}")]
    Queue(String),
}

/// What a failed queue read means for the consume loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// The consumer group is gone (flushed Redis, failover onto an empty
    /// replica); recreate it before the next read.
    RecreateGroup,
    /// The connection is unhealthy; back off and let the connection
    /// manager re-establish it.
    Reconnect,
    /// Nothing structural to repair; log it and keep consuming.
    None,
}

impl BrokerError {
    /// Classify this error into the action the consume loop should take.
    ///
    /// Connection health comes from the redis crate's own error kinds;
    /// only the NOGROUP reply has no kind of its own and is matched on
    /// the server's error text.
    pub fn recovery(&self) -> Recovery {
        match self {
            Self::Redis(e) if e.to_string().contains("NOGROUP") => Recovery::RecreateGroup,
            Self::Redis(e)
                if e.is_io_error()
                    || e.is_connection_dropped()
                    || e.is_connection_refusal()
                    || e.is_timeout() =>
            {
                Recovery::Reconnect
            }
            Self::ConsumerGroup(msg) | Self::Queue(msg) if msg.contains("NOGROUP") => {
                Recovery::RecreateGroup
            }
            _ => Recovery::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = BrokerError::Envelope("missing 'job' field".to_string());
        assert_eq!(err.to_string(), "Envelope error: missing 'job' field");
    }

    #[test]
    fn test_missing_group_recreates() {
        let err = BrokerError::ConsumerGroup(
            "NOGROUP No such consumer group 'job_workers' for key 'jobs.high'".to_string(),
        );
        assert_eq!(err.recovery(), Recovery::RecreateGroup);

        let err = BrokerError::Queue("NOGROUP consumer group vanished".to_string());
        assert_eq!(err.recovery(), Recovery::RecreateGroup);
    }

    #[test]
    fn test_io_failure_reconnects() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = BrokerError::Redis(redis::RedisError::from(io));
        assert_eq!(err.recovery(), Recovery::Reconnect);
    }

    #[test]
    fn test_everything_else_is_unclassified() {
        let bad_json = serde_json::from_str::<i32>("not a number").unwrap_err();
        assert_eq!(BrokerError::from(bad_json).recovery(), Recovery::None);

        let err = BrokerError::Envelope("invalid 'job' field type".to_string());
        assert_eq!(err.recovery(), Recovery::None);

        let err = BrokerError::Queue("stream trimmed".to_string());
        assert_eq!(err.recovery(), Recovery::None);
    }
}
