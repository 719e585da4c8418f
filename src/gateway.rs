//! Queue gateway: name resolution plus the receive, send, delete, status and
//! dead-letter redrive operations the consumer is built from.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::backend::{QueueBackend, QueueUrl, attributes};
use crate::cancel::CancelSignal;
use crate::config::SqsConfig;
use crate::errors::{BackendError, SqsConsumerError};
use crate::message::{MESSAGE_TYPE_ATTRIBUTE, MessageType, OutgoingMessage, QueueMessage};

mod cache;
pub mod names;

pub use cache::QueueUrlCache;
pub use names::QueueNames;

/// Deliveries after which the main queue hands a message to the dead-letter queue.
pub const MAX_RECEIVE_COUNT: u32 = 3;

/// Snapshot of the main queue, recomputed on every query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStatus {
    /// True when the attribute query returned a success response.
    pub is_healthy: bool,
    pub region: String,
    pub queue_name: String,
    pub long_poll_seconds: i32,
    pub approximate_number_of_messages: u64,
    pub approximate_number_of_messages_not_visible: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub is_consuming: bool,
}

/// Outcome of one dead-letter redrive pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RedriveSummary {
    /// Messages re-sent to the main queue and removed from the dead-letter queue.
    pub requeued: usize,
    /// Messages without a type tag, left in the dead-letter queue.
    pub skipped_untyped: usize,
}

/// Front door to the main and dead-letter queues of one logical queue.
pub struct QueueGateway {
    config: SqsConfig,
    names: QueueNames,
    backend: Arc<dyn QueueBackend>,
    urls: QueueUrlCache,
}

impl std::fmt::Debug for QueueGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueGateway")
            .field("names", &self.names)
            .field("region", &self.config.region)
            .finish_non_exhaustive()
    }
}

impl QueueGateway {
    pub fn new(config: SqsConfig, backend: Arc<dyn QueueBackend>) -> Self {
        let names = QueueNames::from_config(&config);
        QueueGateway {
            config,
            names,
            backend,
            urls: QueueUrlCache::new(),
        }
    }

    pub fn config(&self) -> &SqsConfig {
        &self.config
    }

    pub fn queue_name(&self) -> &str {
        &self.names.main
    }

    pub fn dead_letter_queue_name(&self) -> &str {
        &self.names.dead_letter
    }

    /// Resolves a queue name through the URL cache.
    pub async fn resolve(&self, queue_name: &str) -> Result<QueueUrl, SqsConsumerError> {
        self.urls.resolve(queue_name, self.backend.as_ref()).await
    }

    /// Creates both queues and wires the redrive policy, logging any failure.
    ///
    /// Queue creation is a best-effort bootstrap step; use
    /// [`QueueGateway::try_create_queues`] when the caller needs the error.
    pub async fn create_queues(&self) {
        if let Err(err) = self.try_create_queues().await {
            error!(
                queue = %self.names.main,
                dead_letter_queue = %self.names.dead_letter,
                error = %err,
                "Error when creating SQS queues"
            );
        }
    }

    /// Creates the main and dead-letter queues, then points the main queue's
    /// redrive policy at the dead-letter queue and enables long polling.
    pub async fn try_create_queues(&self) -> Result<(), SqsConsumerError> {
        let mut queue_attributes = HashMap::new();
        if self.config.is_fifo {
            queue_attributes.insert(attributes::FIFO_QUEUE.to_string(), "true".to_string());
        }

        let main_url = self
            .create_queue(&self.names.main, queue_attributes.clone())
            .await?;
        let dead_letter_url = self
            .create_queue(&self.names.dead_letter, queue_attributes)
            .await?;

        let dead_letter_arn = self
            .backend
            .get_queue_attributes(&dead_letter_url, &[attributes::QUEUE_ARN])
            .await
            .map_err(|e| {
                SqsConsumerError::backend(&self.names.dead_letter, "GetQueueAttributes", e)
            })?
            .remove(attributes::QUEUE_ARN)
            .ok_or_else(|| {
                SqsConsumerError::backend(
                    &self.names.dead_letter,
                    "GetQueueAttributes",
                    BackendError::Transport("response carried no QueueArn".to_string()),
                )
            })?;

        let redrive_policy = serde_json::json!({
            "maxReceiveCount": MAX_RECEIVE_COUNT.to_string(),
            "deadLetterTargetArn": dead_letter_arn,
        });
        let main_attributes = HashMap::from([
            (
                attributes::REDRIVE_POLICY.to_string(),
                redrive_policy.to_string(),
            ),
            (
                attributes::RECEIVE_MESSAGE_WAIT_TIME_SECONDS.to_string(),
                self.config.receive_wait_seconds().to_string(),
            ),
        ]);
        self.backend
            .set_queue_attributes(&main_url, main_attributes)
            .await
            .map_err(|e| SqsConsumerError::backend(&self.names.main, "SetQueueAttributes", e))?;

        info!(
            queue = %self.names.main,
            dead_letter_queue = %self.names.dead_letter,
            max_receive_count = MAX_RECEIVE_COUNT,
            "Created SQS queues"
        );
        Ok(())
    }

    async fn create_queue(
        &self,
        queue_name: &str,
        queue_attributes: HashMap<String, String>,
    ) -> Result<QueueUrl, SqsConsumerError> {
        let url = self
            .backend
            .create_queue(queue_name, queue_attributes)
            .await
            .map_err(|e| SqsConsumerError::backend(queue_name, "CreateQueue", e))?;
        self.urls.insert(queue_name, url.clone()).await;
        Ok(url)
    }

    /// Queries the main queue's counters. `is_consuming` is left false for the
    /// consumer to fill in.
    pub async fn status(&self) -> Result<QueueStatus, SqsConsumerError> {
        let queue_name = &self.names.main;
        let url = self.resolve(queue_name).await?;

        let mut status = QueueStatus {
            is_healthy: false,
            region: self.config.region.clone(),
            queue_name: queue_name.clone(),
            long_poll_seconds: self.config.receive_wait_seconds(),
            approximate_number_of_messages: 0,
            approximate_number_of_messages_not_visible: 0,
            last_modified: None,
            is_consuming: false,
        };

        let requested = [
            attributes::APPROXIMATE_NUMBER_OF_MESSAGES,
            attributes::APPROXIMATE_NUMBER_OF_MESSAGES_NOT_VISIBLE,
            attributes::LAST_MODIFIED_TIMESTAMP,
        ];
        match self.backend.get_queue_attributes(&url, &requested).await {
            Ok(values) => {
                let count = |name: &str| {
                    values
                        .get(name)
                        .and_then(|v| v.parse::<u64>().ok())
                        .unwrap_or(0)
                };
                status.is_healthy = true;
                status.approximate_number_of_messages =
                    count(attributes::APPROXIMATE_NUMBER_OF_MESSAGES);
                status.approximate_number_of_messages_not_visible =
                    count(attributes::APPROXIMATE_NUMBER_OF_MESSAGES_NOT_VISIBLE);
                status.last_modified = values
                    .get(attributes::LAST_MODIFIED_TIMESTAMP)
                    .and_then(|v| v.parse::<i64>().ok())
                    .and_then(|secs| DateTime::from_timestamp(secs, 0));
                Ok(status)
            }
            Err(err @ BackendError::Service { .. }) => {
                warn!(queue = %queue_name, error = %err, "Queue status query was not successful");
                Ok(status)
            }
            Err(err) => {
                error!(queue = %queue_name, error = %err, "Failed to get status for queue");
                Err(SqsConsumerError::backend(
                    queue_name,
                    "GetQueueAttributes",
                    err,
                ))
            }
        }
    }

    /// Long-polls the named queue. A fired `signal` ends the wait early with an
    /// empty batch rather than an error.
    pub async fn receive(
        &self,
        queue_name: &str,
        signal: &CancelSignal,
    ) -> Result<Vec<QueueMessage>, SqsConsumerError> {
        let url = self.resolve(queue_name).await?;

        tokio::select! {
            biased;
            _ = signal.cancelled() => {
                warn!(queue = queue_name, "Receive from queue was cancelled");
                Ok(Vec::new())
            }
            result = self.backend.receive_messages(
                &url,
                self.config.receive_batch_size(),
                self.config.receive_wait_seconds(),
            ) => {
                let messages = result.map_err(|e| {
                    error!(queue = queue_name, error = %e, "Failed to receive messages");
                    SqsConsumerError::backend(queue_name, "ReceiveMessage", e)
                })?;
                debug!(queue = queue_name, count = messages.len(), "Received messages");
                Ok(messages)
            }
        }
    }

    pub async fn receive_main(
        &self,
        signal: &CancelSignal,
    ) -> Result<Vec<QueueMessage>, SqsConsumerError> {
        self.receive(&self.names.main, signal).await
    }

    /// Sends `body` tagged with `message_type`. Ordered queues get the type as
    /// group id and a fresh deduplication id on every call.
    pub async fn send(
        &self,
        queue_name: &str,
        body: &str,
        message_type: &str,
    ) -> Result<String, SqsConsumerError> {
        if message_type.trim().is_empty() {
            return Err(SqsConsumerError::InvalidArgument(
                "message type should not be blank".to_string(),
            ));
        }
        let url = self.resolve(queue_name).await?;

        let ordered = names::is_ordered(queue_name, &self.config.fifo_suffix);
        let message = OutgoingMessage {
            body: body.to_string(),
            attributes: HashMap::from([(
                MESSAGE_TYPE_ATTRIBUTE.to_string(),
                message_type.to_string(),
            )]),
            group_id: ordered.then(|| message_type.to_string()),
            deduplication_id: ordered.then(|| Uuid::new_v4().to_string()),
        };

        let message_id = self
            .backend
            .send_message(&url, message)
            .await
            .map_err(|e| {
                error!(queue = queue_name, message_type, error = %e, "Failed to send message");
                SqsConsumerError::backend(queue_name, "SendMessage", e)
            })?;
        debug!(queue = queue_name, message_type, message_id = %message_id, "Sent message");
        Ok(message_id)
    }

    pub async fn send_to_main(
        &self,
        body: &str,
        message_type: &str,
    ) -> Result<String, SqsConsumerError> {
        self.send(&self.names.main, body, message_type).await
    }

    /// Serializes `payload` as JSON and sends it to the main queue under `T::MESSAGE_TYPE`.
    pub async fn send_typed<T>(&self, payload: &T) -> Result<String, SqsConsumerError>
    where
        T: Serialize + MessageType + Sync,
    {
        let body = serde_json::to_string(payload)?;
        self.send_to_main(&body, T::MESSAGE_TYPE).await
    }

    /// Deletes one delivered message. On failure the message stays queued and
    /// is redelivered after its visibility timeout.
    pub async fn delete(&self, queue_name: &str, receipt_handle: &str) -> Result<(), SqsConsumerError> {
        let url = self.resolve(queue_name).await?;
        self.backend
            .delete_message(&url, receipt_handle)
            .await
            .map_err(|e| {
                error!(queue = queue_name, receipt_handle, error = %e, "Failed to delete message");
                SqsConsumerError::backend(queue_name, "DeleteMessage", e)
            })
    }

    pub async fn delete_from_main(&self, receipt_handle: &str) -> Result<(), SqsConsumerError> {
        self.delete(&self.names.main, receipt_handle).await
    }

    /// Moves dead-lettered messages back to the main queue until a receive comes
    /// back empty or holds only messages this pass already skipped.
    ///
    /// Each message is re-sent under its original type and only then deleted from
    /// the dead-letter queue, one at a time. The first failure aborts the pass.
    pub async fn redrive(&self, signal: &CancelSignal) -> Result<RedriveSummary, SqsConsumerError> {
        let mut summary = RedriveSummary::default();

        match self.redrive_pass(signal, &mut summary).await {
            Ok(()) => {
                info!(
                    queue = %self.names.dead_letter,
                    requeued = summary.requeued,
                    skipped_untyped = summary.skipped_untyped,
                    "Dead-letter redrive finished"
                );
                Ok(summary)
            }
            Err(err) => {
                error!(
                    queue = %self.names.dead_letter,
                    requeued = summary.requeued,
                    error = %err,
                    "Failed to reprocess messages from dead-letter queue"
                );
                Err(err)
            }
        }
    }

    async fn redrive_pass(
        &self,
        signal: &CancelSignal,
        summary: &mut RedriveSummary,
    ) -> Result<(), SqsConsumerError> {
        let dead_letter = self.names.dead_letter.as_str();
        let mut skipped: HashSet<String> = HashSet::new();

        loop {
            // Skipped messages come back once their visibility timeout lapses;
            // a batch of nothing else means the queue is drained.
            let messages = self.receive(dead_letter, signal).await?;
            if messages.iter().all(|m| skipped.contains(&m.message_id)) {
                return Ok(());
            }

            for message in messages {
                let Some(message_type) = message.message_type() else {
                    if skipped.insert(message.message_id.clone()) {
                        warn!(
                            queue = dead_letter,
                            message_id = %message.message_id,
                            "Dead-letter message has no type and was left in place"
                        );
                        summary.skipped_untyped += 1;
                    }
                    continue;
                };
                self.send_to_main(&message.body, message_type).await?;
                self.delete(dead_letter, &message.receipt_handle).await?;
                summary.requeued += 1;
            }
        }
    }
}
