//! Error types for the idea consultation client.

use crate::session::Stage;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Client(#[from] ClientError),

    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Session(#[from] SessionError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Local key/value persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage unavailable")]
    Unavailable,
}

/// Failures at the remote session boundary.
///
/// Both variants carry a message that is already fit for display: the
/// server's `detail` when one was returned, a generic transport message
/// otherwise.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// No response reached the client (network, timeout, undecodable body).
    #[error("{message}")]
    Transport { message: String },

    /// The backend answered with an error payload.
    #[error("{message}")]
    Server { status: u16, message: String },
}

impl ClientError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
        }
    }

    /// The normalized, human-readable message.
    pub fn message(&self) -> &str {
        match self {
            Self::Transport { message } | Self::Server { message, .. } => message,
        }
    }

    /// Whether the backend reported the session as unknown.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Server { status: 404, .. })
    }
}

/// A single field that failed local validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Local, pre-transmission validation failure, reported field by field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Validation failed: {}", summarize(.errors))]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            errors: vec![FieldError {
                field: field.into(),
                message: message.into(),
            }],
        }
    }

    /// Message reported for `field`, if it failed.
    pub fn for_field(&self, field: &str) -> Option<&str> {
        self.errors
            .iter()
            .find(|e| e.field == field)
            .map(|e| e.message.as_str())
    }
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Orchestrator-level errors. None of these are fatal; the session stays in
/// the last stage it reached.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("No active session")]
    NoActiveSession,

    #[error("Operation requires stage {expected}, session is in {actual}")]
    InvalidStage { expected: Stage, actual: Stage },

    #[error("Cannot transition from {from} to {to}")]
    InvalidTransition { from: Stage, to: Stage },

    #[error("A message is already being sent for this session")]
    SendInFlight,

    #[error("Lead already captured for this session")]
    LeadAlreadyCaptured,

    #[error("Report generation requires a captured lead")]
    LeadNotCaptured,

    #[error("Progress polling stopped before the report was ready")]
    PollingStopped,

    #[error("The report is still being generated")]
    GenerationInProgress,

    #[error("No refinements left for this report")]
    BudgetExhausted,

    #[error("{message}")]
    RefinementRejected {
        message: String,
        cta_url: Option<String>,
    },
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_error_displays_only_message() {
        let err = ClientError::server(404, "Session not found");
        assert_eq!(err.to_string(), "Session not found");
        assert!(err.is_not_found());

        let err = ClientError::transport("No response from server. Please try again.");
        assert_eq!(err.message(), "No response from server. Please try again.");
        assert!(!err.is_not_found());
    }

    #[test]
    fn validation_error_lists_fields() {
        let err = ValidationError {
            errors: vec![
                FieldError {
                    field: "name".into(),
                    message: "Name is required".into(),
                },
                FieldError {
                    field: "email".into(),
                    message: "Invalid email format".into(),
                },
            ],
        };
        assert_eq!(err.for_field("email"), Some("Invalid email format"));
        assert_eq!(err.for_field("phone"), None);
        assert!(err.to_string().contains("name: Name is required"));
    }
}
