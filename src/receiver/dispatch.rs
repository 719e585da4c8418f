use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, error};

use crate::errors::{DispatchError, SqsConsumerError};
use crate::gateway::QueueGateway;
use crate::message::QueueMessage;
use crate::processor::ProcessorRegistry;

/// Routes one message to its processor and deletes it from the main queue on success.
///
/// Nothing is deleted when the type tag is missing, no single processor claims
/// the type, or the processor fails; the message then returns after its
/// visibility timeout and eventually lands in the dead-letter queue.
pub async fn process_message(
    gateway: &QueueGateway,
    registry: &ProcessorRegistry,
    message: &QueueMessage,
) -> Result<(), SqsConsumerError> {
    let message_type = message
        .message_type()
        .ok_or_else(|| DispatchError::MissingMessageType {
            message_id: message.message_id.clone(),
        })?;

    let processor = registry.lookup(message_type).into_result(message_type)?;
    processor.process(message).await?;
    gateway.delete_from_main(&message.receipt_handle).await
}

/// Runs [`process_message`] as an isolated unit: errors and panics are logged
/// with the message context and never escape.
pub(crate) async fn dispatch_message(
    gateway: Arc<QueueGateway>,
    registry: Arc<ProcessorRegistry>,
    message: QueueMessage,
) {
    let outcome = AssertUnwindSafe(process_message(&gateway, &registry, &message))
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(())) => {
            debug!(
                queue = gateway.queue_name(),
                message_id = %message.message_id,
                message_type = message.message_type().unwrap_or_default(),
                "Processed message"
            );
        }
        Ok(Err(err)) => {
            error!(
                queue = gateway.queue_name(),
                message_id = %message.message_id,
                receipt_handle = %message.receipt_handle,
                body = %message.body,
                error = %err,
                "Cannot process message"
            );
        }
        Err(panic) => {
            error!(
                queue = gateway.queue_name(),
                message_id = %message.message_id,
                receipt_handle = %message.receipt_handle,
                body = %message.body,
                panic = panic_message(panic.as_ref()),
                "Processor panicked while handling message"
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
