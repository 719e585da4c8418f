use std::collections::HashMap;

/// Name of the message attribute that carries the declared message type.
pub const MESSAGE_TYPE_ATTRIBUTE: &str = "MessageType";

/// A message received from a queue.
///
/// The type tag travels out-of-band as a string message attribute and is never
/// parsed from the body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueMessage {
    pub message_id: String,
    pub body: String,

    /// Per-delivery token required to delete this delivered instance.
    pub receipt_handle: String,

    /// Custom string attributes, including [`MESSAGE_TYPE_ATTRIBUTE`] when present.
    pub attributes: HashMap<String, String>,

    /// `ApproximateReceiveCount` reported by the backend.
    pub receive_count: Option<u32>,
}

impl QueueMessage {
    /// The declared message type, if the sender attached one.
    pub fn message_type(&self) -> Option<&str> {
        self.attributes
            .get(MESSAGE_TYPE_ATTRIBUTE)
            .map(String::as_str)
            .filter(|t| !t.is_empty())
    }
}

/// Payload types that can be posted with [`crate::gateway::QueueGateway::send_typed`].
///
/// ```rust
/// use rs_sqs_consumer::message::MessageType;
///
/// #[derive(serde::Serialize)]
/// struct OrderPlaced {
///     order_id: u64,
/// }
///
/// impl MessageType for OrderPlaced {
///     const MESSAGE_TYPE: &'static str = "OrderPlaced";
/// }
/// ```
pub trait MessageType {
    const MESSAGE_TYPE: &'static str;
}

/// Outgoing message as handed to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub body: String,
    pub attributes: HashMap<String, String>,
    pub group_id: Option<String>,
    pub deduplication_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_reads_attribute() {
        let mut message = QueueMessage::default();
        assert_eq!(message.message_type(), None);

        message
            .attributes
            .insert(MESSAGE_TYPE_ATTRIBUTE.to_string(), "OrderPlaced".to_string());
        assert_eq!(message.message_type(), Some("OrderPlaced"));
    }

    #[test]
    fn test_empty_message_type_is_absent() {
        let mut message = QueueMessage::default();
        message
            .attributes
            .insert(MESSAGE_TYPE_ATTRIBUTE.to_string(), String::new());
        assert_eq!(message.message_type(), None);
    }
}
