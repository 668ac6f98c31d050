//! Error handling module
//!
//! Defines error types and handling logic used in the project

use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum MonitorError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),

    /// Unparsable request/response body or SSE chunk
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// A response arrived with no matching pending request
    #[error("No pending request for flow {0} (orphaned response)")]
    OrphanedResponse(u64),

    /// Model is missing from the pricing table
    #[error("Model '{0}' not found in pricing table")]
    ModelNotPriced(String),

    /// Reported usage does not satisfy total == prompt + completion
    #[error("Usage invariant violated: total {total} != prompt {prompt} + completion {completion}")]
    UsageInvariant {
        prompt: u64,
        completion: u64,
        total: u64,
    },

    /// Monitored program could not be launched
    #[error("Failed to launch monitored program: {0}")]
    Launch(String),

    /// Interception layer failed to start or died mid-session
    #[error("Interception layer error: {0}")]
    Intercept(String),

    /// Remote sink delivery failed
    #[error("Beam delivery failed: {0}")]
    Beam(String),

    /// HTTP client error
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MonitorError {
    /// Whether processing can continue after this error.
    ///
    /// Recoverable errors skip the offending unit (a body, a chunk, a
    /// launch attempt, a beam delivery) and let the session carry on.
    /// Everything else is fatal to the round trip or cost calculation
    /// it occurred in.
    pub fn is_recoverable(&self) -> bool {
        match self {
            MonitorError::MalformedPayload(_)
            | MonitorError::Launch(_)
            | MonitorError::Beam(_) => true,
            MonitorError::OrphanedResponse(_)
            | MonitorError::ModelNotPriced(_)
            | MonitorError::UsageInvariant { .. }
            | MonitorError::Intercept(_)
            | MonitorError::Config(_)
            | MonitorError::HttpClient(_)
            | MonitorError::Io(_) => false,
        }
    }

    /// Get error type string for structured logging
    pub fn error_type(&self) -> &'static str {
        match self {
            MonitorError::Config(_) => "config_error",
            MonitorError::MalformedPayload(_) => "malformed_payload",
            MonitorError::OrphanedResponse(_) => "orphaned_response",
            MonitorError::ModelNotPriced(_) => "pricing_gap",
            MonitorError::UsageInvariant { .. } => "usage_invariant",
            MonitorError::Launch(_) => "launch_failure",
            MonitorError::Intercept(_) => "intercept_error",
            MonitorError::Beam(_) => "beam_error",
            MonitorError::HttpClient(_) => "http_client_error",
            MonitorError::Io(_) => "io_error",
        }
    }
}

/// Result type alias
pub type MonitorResult<T> = Result<T, MonitorError>;

/// Error handling helper functions
pub mod helpers {
    use super::*;

    /// Create malformed payload error
    pub fn malformed(message: impl Into<String>) -> MonitorError {
        MonitorError::MalformedPayload(message.into())
    }

    /// Create interception layer error
    pub fn intercept_error(message: impl Into<String>) -> MonitorError {
        MonitorError::Intercept(message.into())
    }

    /// Create launch failure error
    pub fn launch_error(message: impl Into<String>) -> MonitorError {
        MonitorError::Launch(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverability() {
        assert!(MonitorError::MalformedPayload("bad json".to_string()).is_recoverable());
        assert!(MonitorError::Launch("not found".to_string()).is_recoverable());
        assert!(MonitorError::Beam("503".to_string()).is_recoverable());

        assert!(!MonitorError::OrphanedResponse(3).is_recoverable());
        assert!(!MonitorError::ModelNotPriced("gpt-x".to_string()).is_recoverable());
        assert!(!MonitorError::UsageInvariant {
            prompt: 100,
            completion: 40,
            total: 150
        }
        .is_recoverable());
    }

    #[test]
    fn test_error_types() {
        assert_eq!(
            MonitorError::ModelNotPriced("gpt-x".to_string()).error_type(),
            "pricing_gap"
        );
        assert_eq!(
            MonitorError::OrphanedResponse(0).error_type(),
            "orphaned_response"
        );
        assert_eq!(
            MonitorError::MalformedPayload("x".to_string()).error_type(),
            "malformed_payload"
        );
    }

    #[test]
    fn test_display_messages() {
        let err = MonitorError::UsageInvariant {
            prompt: 100,
            completion: 40,
            total: 150,
        };
        let msg = err.to_string();
        assert!(msg.contains("150"));
        assert!(msg.contains("100"));

        let err = MonitorError::ModelNotPriced("gpt-x".to_string());
        assert!(err.to_string().contains("gpt-x"));
    }

    #[test]
    fn test_helpers() {
        assert!(matches!(
            helpers::malformed("oops"),
            MonitorError::MalformedPayload(_)
        ));
        assert!(matches!(
            helpers::intercept_error("down"),
            MonitorError::Intercept(_)
        ));
        assert!(matches!(
            helpers::launch_error("missing"),
            MonitorError::Launch(_)
        ));
    }
}
