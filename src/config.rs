use serde::Deserialize;

use crate::errors::SqsConsumerError;

/// Longest wait SQS accepts for a single long-poll receive.
pub const MAX_LONG_POLL_SECONDS: i32 = 20;

/// Largest batch SQS returns from a single receive.
pub const MAX_RECEIVE_BATCH: i32 = 10;

/// Configuration for the SQS consumer and its queue gateway.
///
/// This struct is handed to every component at construction time. It carries the
/// logical queue name and ordering flags from which the main and dead-letter
/// queue names are derived, plus long-poll and credential settings.
///
/// # Fields
/// - `queue_name`: Logical base name of the main queue.
/// - `is_fifo`: Whether the queues are ordered (FIFO) queues.
/// - `fifo_suffix`: Suffix SQS requires on ordered queue names.
/// - `long_poll_seconds`: The wait time for long polling, in seconds.
/// - `max_number_of_messages`: The maximum number of messages to receive in a single request.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SqsConfig {
    /// Logical base name of the main queue.
    pub queue_name: String,

    /// Whether the main and dead-letter queues are FIFO queues.
    pub is_fifo: bool,

    /// Suffix applied to FIFO queue names.
    pub fifo_suffix: String,

    /// The wait time for long polling, in seconds.
    pub long_poll_seconds: i32,

    /// The maximum number of messages to receive in a single request.
    pub max_number_of_messages: i32,

    /// AWS region the queues live in.
    pub region: String,

    pub access_key_id: Option<String>,

    pub secret_access_key: Option<String>,

    /// Create the queues when the consumer is bootstrapped.
    pub auto_create: bool,

    /// Pause after a failed receive before polling again, in milliseconds.
    pub receive_error_backoff_ms: u64,
}

impl Default for SqsConfig {
    fn default() -> Self {
        SqsConfig {
            queue_name: String::new(),
            is_fifo: false,
            fifo_suffix: ".fifo".to_string(),
            long_poll_seconds: MAX_LONG_POLL_SECONDS,
            max_number_of_messages: MAX_RECEIVE_BATCH,
            region: "us-east-1".to_string(),
            access_key_id: None,
            secret_access_key: None,
            auto_create: false,
            receive_error_backoff_ms: 1000,
        }
    }
}

impl SqsConfig {
    /// Creates a configuration for the given queue with default settings.
    pub fn new(queue_name: impl Into<String>) -> Self {
        SqsConfig {
            queue_name: queue_name.into(),
            ..SqsConfig::default()
        }
    }

    /// Loads configuration from an optional `config/sqs` file and `SQS__*` environment variables.
    ///
    /// Environment variables override file values, e.g. `SQS__QUEUE_NAME=orders`
    /// sets `queue_name`. The result is not validated so callers can apply
    /// overrides first; call [`SqsConfig::validate`] before use.
    pub fn load() -> Result<Self, SqsConsumerError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("config/sqs").required(false))
            .add_source(config::Environment::with_prefix("SQS").separator("__"))
            .build()
            .map_err(|e| SqsConsumerError::InitializationError(e.to_string()))?;

        settings
            .try_deserialize()
            .map_err(|e| SqsConsumerError::InitializationError(e.to_string()))
    }

    /// Rejects configuration the gateway cannot operate with.
    pub fn validate(&self) -> Result<(), SqsConsumerError> {
        if self.queue_name.trim().is_empty() {
            return Err(SqsConsumerError::InvalidArgument(
                "queue name should not be blank".to_string(),
            ));
        }
        if self.is_fifo && self.fifo_suffix.is_empty() {
            return Err(SqsConsumerError::InvalidArgument(
                "fifo suffix should not be blank for FIFO queues".to_string(),
            ));
        }
        Ok(())
    }

    /// Long-poll wait clamped to the range SQS accepts.
    pub fn receive_wait_seconds(&self) -> i32 {
        self.long_poll_seconds.clamp(0, MAX_LONG_POLL_SECONDS)
    }

    /// Receive batch size clamped to the range SQS accepts.
    pub fn receive_batch_size(&self) -> i32 {
        self.max_number_of_messages.clamp(1, MAX_RECEIVE_BATCH)
    }

    pub fn receive_error_backoff(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.receive_error_backoff_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SqsConfig::default();
        assert_eq!(config.fifo_suffix, ".fifo");
        assert_eq!(config.long_poll_seconds, 20);
        assert_eq!(config.max_number_of_messages, 10);
        assert!(!config.auto_create);
    }

    #[test]
    fn test_validate_rejects_blank_queue_name() {
        let config = SqsConfig::new("  ");
        assert!(matches!(
            config.validate(),
            Err(SqsConsumerError::InvalidArgument(_))
        ));
        assert!(SqsConfig::new("orders").validate().is_ok());
    }

    #[test]
    fn test_receive_settings_are_clamped() {
        let config = SqsConfig {
            long_poll_seconds: 45,
            max_number_of_messages: 0,
            ..SqsConfig::new("orders")
        };
        assert_eq!(config.receive_wait_seconds(), 20);
        assert_eq!(config.receive_batch_size(), 1);
    }

    #[test]
    fn test_deserialize_partial_document() {
        let config: SqsConfig =
            serde_json::from_str(r#"{"queue_name":"orders","is_fifo":true}"#).unwrap();
        assert_eq!(config.queue_name, "orders");
        assert!(config.is_fifo);
        assert_eq!(config.fifo_suffix, ".fifo");
    }
}
