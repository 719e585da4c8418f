use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::{DispatchError, SqsConsumerError};
use crate::message::QueueMessage;

/// Trait for implementing handlers of one declared message type.
///
/// The consumer asks every registered processor whether it claims a message's
/// type and hands the message to the single one that does. Returning `Ok(())`
/// acknowledges the message; any error leaves it queued for redelivery.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use rs_sqs_consumer::{errors::SqsConsumerError, message::QueueMessage, processor::MessageProcessor};
///
/// struct OrderPlacedProcessor;
///
/// #[async_trait]
/// impl MessageProcessor for OrderPlacedProcessor {
///     fn can_process(&self, message_type: &str) -> bool {
///         message_type == "OrderPlaced"
///     }
///
///     async fn process(&self, message: &QueueMessage) -> Result<(), SqsConsumerError> {
///         println!("order placed: {}", message.body);
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait MessageProcessor: Send + Sync {
    fn can_process(&self, message_type: &str) -> bool;

    async fn process(&self, message: &QueueMessage) -> Result<(), SqsConsumerError>;
}

/// Result of looking up the processor for a message type.
pub enum ProcessorMatch {
    Found(Arc<dyn MessageProcessor>),
    NotFound,
    Ambiguous(usize),
}

impl ProcessorMatch {
    /// Turns the lookup into the processor or the matching dispatch error.
    pub fn into_result(self, message_type: &str) -> Result<Arc<dyn MessageProcessor>, DispatchError> {
        match self {
            ProcessorMatch::Found(processor) => Ok(processor),
            ProcessorMatch::NotFound => Err(DispatchError::NoProcessor {
                message_type: message_type.to_string(),
            }),
            ProcessorMatch::Ambiguous(count) => Err(DispatchError::AmbiguousProcessor {
                message_type: message_type.to_string(),
                count,
            }),
        }
    }
}

/// Explicit list of processors the consumer dispatches to.
#[derive(Default, Clone)]
pub struct ProcessorRegistry {
    processors: Vec<Arc<dyn MessageProcessor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        ProcessorRegistry::default()
    }

    pub fn with_processor<P>(mut self, processor: P) -> Self
    where
        P: MessageProcessor + 'static,
    {
        self.register(Arc::new(processor));
        self
    }

    pub fn register(&mut self, processor: Arc<dyn MessageProcessor>) {
        self.processors.push(processor);
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    pub fn lookup(&self, message_type: &str) -> ProcessorMatch {
        let mut claiming = self
            .processors
            .iter()
            .filter(|processor| processor.can_process(message_type));

        match (claiming.next(), claiming.count()) {
            (None, _) => ProcessorMatch::NotFound,
            (Some(processor), 0) => ProcessorMatch::Found(Arc::clone(processor)),
            (Some(_), others) => ProcessorMatch::Ambiguous(others + 1),
        }
    }

    /// Checks at startup that every listed type has exactly one processor.
    pub fn verify<S: AsRef<str>>(&self, message_types: &[S]) -> Result<(), DispatchError> {
        for message_type in message_types {
            let message_type = message_type.as_ref();
            self.lookup(message_type).into_result(message_type)?;
        }
        Ok(())
    }
}

impl FromIterator<Arc<dyn MessageProcessor>> for ProcessorRegistry {
    fn from_iter<I: IntoIterator<Item = Arc<dyn MessageProcessor>>>(iter: I) -> Self {
        ProcessorRegistry {
            processors: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Claims(&'static str);

    #[async_trait]
    impl MessageProcessor for Claims {
        fn can_process(&self, message_type: &str) -> bool {
            message_type == self.0
        }

        async fn process(&self, _message: &QueueMessage) -> Result<(), SqsConsumerError> {
            Ok(())
        }
    }

    #[test]
    fn test_lookup_found_and_not_found() {
        let registry = ProcessorRegistry::new()
            .with_processor(Claims("T1"))
            .with_processor(Claims("T2"));

        assert!(matches!(registry.lookup("T1"), ProcessorMatch::Found(_)));
        assert!(matches!(registry.lookup("T3"), ProcessorMatch::NotFound));
    }

    #[test]
    fn test_lookup_reports_ambiguity() {
        let registry = ProcessorRegistry::new()
            .with_processor(Claims("T1"))
            .with_processor(Claims("T1"))
            .with_processor(Claims("T1"));

        assert!(matches!(registry.lookup("T1"), ProcessorMatch::Ambiguous(3)));
        assert_eq!(
            registry.verify(&["T1"]),
            Err(DispatchError::AmbiguousProcessor {
                message_type: "T1".to_string(),
                count: 3
            })
        );
    }

    #[test]
    fn test_verify_accepts_unique_processors() {
        let registry: ProcessorRegistry = vec![
            Arc::new(Claims("T1")) as Arc<dyn MessageProcessor>,
            Arc::new(Claims("T2")),
        ]
        .into_iter()
        .collect();

        assert_eq!(registry.len(), 2);
        assert!(registry.verify(&["T1", "T2"]).is_ok());
        assert!(matches!(
            registry.verify(&["T3"]),
            Err(DispatchError::NoProcessor { .. })
        ));
    }
}
