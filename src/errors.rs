use std::str::FromStr;

use thiserror::Error;

/// Error types for SQS consumer and gateway operations.
///
/// This enum represents all failures that can surface from queue
/// resolution, transport calls, message dispatch and processing.
#[derive(Debug, Error)]
pub enum SqsConsumerError {
    /// A caller supplied an argument that cannot be used, such as a blank queue name.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The backend could not resolve the queue name, either because it does not
    /// exist or because the credentials in use have no access to it.
    #[error(
        "could not retrieve the URL for queue '{queue_name}' as it does not exist or you do not have access to it"
    )]
    QueueNotFound { queue_name: String },

    /// A queue operation returned a non-success response or failed in transport.
    #[error("{operation} failed for queue '{queue_name}': {source}")]
    Backend {
        queue_name: String,
        operation: &'static str,
        #[source]
        source: BackendError,
    },

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Failure reported by a message processor.
    #[error("{0}")]
    Processing(#[from] GenericError),

    #[error("failed to serialize message body: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Error that occurs during client or configuration initialization.
    #[error("failed to initialize AWS SQS consumer: {0}")]
    InitializationError(String),
}

impl SqsConsumerError {
    pub(crate) fn backend(queue_name: &str, operation: &'static str, source: BackendError) -> Self {
        SqsConsumerError::Backend {
            queue_name: queue_name.to_string(),
            operation,
            source,
        }
    }
}

/// Classified result of a failed transport primitive.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// The backend reported that the named queue does not exist.
    #[error("queue does not exist")]
    QueueDoesNotExist,

    /// The backend answered with a non-success status.
    #[error("service returned status {status:?} ({code}): {message}")]
    Service {
        status: Option<u16>,
        code: String,
        message: String,
    },

    /// No response was obtained (connection, timeout, dispatch or decode failure).
    #[error("transport fault: {0}")]
    Transport(String),
}

impl BackendError {
    pub fn service(status: Option<u16>, code: impl Into<String>, message: impl Into<String>) -> Self {
        BackendError::Service {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    /// HTTP status attached to a non-success response, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            BackendError::Service { status, .. } => *status,
            _ => None,
        }
    }
}

/// Reasons a received message could not be routed to a processor.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("no 'MessageType' attribute present in message {message_id}")]
    MissingMessageType { message_id: String },

    #[error("no processor found for message type '{message_type}'")]
    NoProcessor { message_type: String },

    #[error("{count} processors claim message type '{message_type}'")]
    AmbiguousProcessor { message_type: String, count: usize },
}

/// Generic error type for failures raised by message processors.
#[derive(Debug, Error)]
pub struct GenericError(String);

impl GenericError {
    /// Creates a new `GenericError` with the provided message.
    pub fn new(message: impl Into<String>) -> Self {
        GenericError(message.into())
    }
}

impl std::fmt::Display for GenericError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GenericError {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(GenericError::new(s))
    }
}

impl From<String> for GenericError {
    fn from(s: String) -> Self {
        GenericError::new(s)
    }
}

impl From<&str> for GenericError {
    fn from(s: &str) -> Self {
        GenericError::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_not_found_message_names_queue() {
        let err = SqsConsumerError::QueueNotFound {
            queue_name: "orders".to_string(),
        };
        assert!(err.to_string().contains("'orders'"));
    }

    #[test]
    fn test_backend_error_status() {
        let err = BackendError::service(Some(500), "InternalError", "boom");
        assert_eq!(err.status(), Some(500));
        assert_eq!(BackendError::Transport("reset".into()).status(), None);
    }

    #[test]
    fn test_processing_error_from_generic() {
        let err: SqsConsumerError = GenericError::from("handler failed").into();
        assert_eq!(err.to_string(), "handler failed");
    }
}
