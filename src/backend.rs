//! Transport primitives the gateway drives.
//!
//! [`QueueBackend`] is the seam between the consumer logic and the queue
//! service. [`aws::AwsSqsBackend`] talks to SQS; [`memory::InMemoryBackend`]
//! simulates it in-process.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;

use crate::errors::BackendError;
use crate::message::{OutgoingMessage, QueueMessage};

pub mod aws;
pub mod memory;

/// Queue attribute names used by the gateway.
pub mod attributes {
    pub const QUEUE_ARN: &str = "QueueArn";
    pub const FIFO_QUEUE: &str = "FifoQueue";
    pub const REDRIVE_POLICY: &str = "RedrivePolicy";
    pub const RECEIVE_MESSAGE_WAIT_TIME_SECONDS: &str = "ReceiveMessageWaitTimeSeconds";
    pub const APPROXIMATE_NUMBER_OF_MESSAGES: &str = "ApproximateNumberOfMessages";
    pub const APPROXIMATE_NUMBER_OF_MESSAGES_NOT_VISIBLE: &str =
        "ApproximateNumberOfMessagesNotVisible";
    pub const LAST_MODIFIED_TIMESTAMP: &str = "LastModifiedTimestamp";
}

/// Transport-level handle of a resolved queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueUrl(String);

impl QueueUrl {
    pub fn new(url: impl Into<String>) -> Self {
        QueueUrl(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QueueUrl {
    fn from(url: &str) -> Self {
        QueueUrl::new(url)
    }
}

/// The queue service operations the consumer is built from.
///
/// Implementations report non-success responses and transport faults as
/// [`BackendError`]; they never retry on their own.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Creates a queue, or returns the URL of an identical existing queue.
    async fn create_queue(
        &self,
        queue_name: &str,
        attributes: HashMap<String, String>,
    ) -> Result<QueueUrl, BackendError>;

    /// Resolves a queue name. Unknown names yield [`BackendError::QueueDoesNotExist`].
    async fn get_queue_url(&self, queue_name: &str) -> Result<QueueUrl, BackendError>;

    async fn get_queue_attributes(
        &self,
        queue_url: &QueueUrl,
        attribute_names: &[&str],
    ) -> Result<HashMap<String, String>, BackendError>;

    async fn set_queue_attributes(
        &self,
        queue_url: &QueueUrl,
        attributes: HashMap<String, String>,
    ) -> Result<(), BackendError>;

    /// Long-polls for up to `max_messages`, returning the receive count and all
    /// custom attributes of each message.
    async fn receive_messages(
        &self,
        queue_url: &QueueUrl,
        max_messages: i32,
        wait_seconds: i32,
    ) -> Result<Vec<QueueMessage>, BackendError>;

    /// Sends a message and returns the id the backend assigned to it.
    async fn send_message(
        &self,
        queue_url: &QueueUrl,
        message: OutgoingMessage,
    ) -> Result<String, BackendError>;

    async fn delete_message(
        &self,
        queue_url: &QueueUrl,
        receipt_handle: &str,
    ) -> Result<(), BackendError>;
}
