//! The handler contract and registry.
//!
//! A handler for a job type is a capability `{validate, execute}` registered
//! explicitly at worker startup; discovery by name is a map lookup. Handlers
//! must tolerate being called more than once with the same input: delivery
//! is at-least-once.

use async_trait::async_trait;
use broker::PayloadMap;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Structured failure raised by a handler.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct HandlerFailure {
    pub message: String,
    pub traceback: Option<String>,
    pub kind: FailureKind,
}

/// Failure classification, carried for the audit trail. The retry
/// controller treats all kinds uniformly: payload errors consume the retry
/// budget like any other failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Payload failed the handler's shape validation
    BadPayload,
    /// The handler ran and raised
    Execution,
}

impl HandlerFailure {
    pub fn bad_payload(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            traceback: None,
            kind: FailureKind::BadPayload,
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            traceback: None,
            kind: FailureKind::Execution,
        }
    }

    pub fn with_traceback(mut self, traceback: impl Into<String>) -> Self {
        self.traceback = Some(traceback.into());
        self
    }
}

/// A registered job handler.
///
/// # Example
///
/// ```rust,ignore
/// struct SendEmail;
///
/// #[async_trait]
/// impl JobHandler for SendEmail {
///     fn job_type(&self) -> &'static str { "send_email" }
///     fn required_keys(&self) -> &'static [&'static str] { &["to", "subject", "body"] }
///
///     async fn execute(&self, payload: &PayloadMap) -> Result<PayloadMap, HandlerFailure> {
///         // deliver the email
///         Ok(PayloadMap::new())
///     }
/// }
/// ```
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// The job type this handler serves.
    fn job_type(&self) -> &'static str;

    /// Payload keys that must be present.
    fn required_keys(&self) -> &'static [&'static str] {
        &[]
    }

    /// Check payload shape before execution. The default checks
    /// `required_keys`; override for stricter validation.
    fn validate(&self, payload: &PayloadMap) -> Result<(), HandlerFailure> {
        let missing: Vec<&str> = self
            .required_keys()
            .iter()
            .copied()
            .filter(|key| !payload.contains_key(*key))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(HandlerFailure::bad_payload(format!(
                "missing required payload keys: {}",
                missing.join(", ")
            )))
        }
    }

    /// Run the job. Must be idempotent or replay-tolerant.
    async fn execute(&self, payload: &PayloadMap) -> Result<PayloadMap, HandlerFailure>;
}

/// Registry mapping job types to handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<&'static str, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its job type. Later registrations replace
    /// earlier ones.
    pub fn register(&mut self, handler: Arc<dyn JobHandler>) -> &mut Self {
        self.handlers.insert(handler.job_type(), handler);
        self
    }

    pub fn get(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(job_type).cloned()
    }

    pub fn contains(&self, job_type: &str) -> bool {
        self.handlers.contains_key(job_type)
    }

    /// Registered job types, sorted.
    pub fn job_types(&self) -> Vec<&'static str> {
        let mut types: Vec<&'static str> = self.handlers.keys().copied().collect();
        types.sort_unstable();
        types
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoHandler;

    #[async_trait]
    impl JobHandler for EchoHandler {
        fn job_type(&self) -> &'static str {
            "echo"
        }

        fn required_keys(&self) -> &'static [&'static str] {
            &["message"]
        }

        async fn execute(&self, payload: &PayloadMap) -> Result<PayloadMap, HandlerFailure> {
            Ok(payload.clone())
        }
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(EchoHandler));

        assert!(registry.contains("echo"));
        assert!(!registry.contains("send_email"));
        assert_eq!(registry.job_types(), vec!["echo"]);
    }

    #[test]
    fn test_default_validation_flags_missing_keys() {
        let handler = EchoHandler;

        let err = handler.validate(&PayloadMap::new()).unwrap_err();
        assert_eq!(err.kind, FailureKind::BadPayload);
        assert!(err.message.contains("message"));

        let mut payload = PayloadMap::new();
        payload.insert("message".to_string(), serde_json::json!("hi"));
        assert!(handler.validate(&payload).is_ok());
    }

    #[tokio::test]
    async fn test_execute_round_trip() {
        let handler = EchoHandler;
        let mut payload = PayloadMap::new();
        payload.insert("message".to_string(), serde_json::json!("hi"));

        let result = handler.execute(&payload).await.unwrap();
        assert_eq!(result, payload);
    }

    #[test]
    fn test_handler_failure_constructors() {
        let failure = HandlerFailure::execution("boom").with_traceback("at line 3");
        assert_eq!(failure.kind, FailureKind::Execution);
        assert_eq!(failure.to_string(), "boom");
        assert_eq!(failure.traceback.as_deref(), Some("at line 3"));
    }
}
