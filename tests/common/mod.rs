#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rs_sqs_consumer::{
    backend::{
        QueueBackend,
        memory::{InMemoryBackend, Operation},
    },
    config::SqsConfig,
    errors::{GenericError, SqsConsumerError},
    gateway::QueueGateway,
    message::{OutgoingMessage, QueueMessage},
    processor::MessageProcessor,
};

/// Configuration with a short long-poll so loops react quickly in tests.
pub fn test_config(queue_name: &str) -> SqsConfig {
    SqsConfig {
        long_poll_seconds: 1,
        receive_error_backoff_ms: 20,
        ..SqsConfig::new(queue_name)
    }
}

/// Creates the queues for `config` on a fresh in-memory backend and clears the call counters.
pub async fn provisioned(config: &SqsConfig) -> (Arc<InMemoryBackend>, Arc<QueueGateway>) {
    provisioned_on(config, Arc::new(InMemoryBackend::default())).await
}

pub async fn provisioned_on(
    config: &SqsConfig,
    backend: Arc<InMemoryBackend>,
) -> (Arc<InMemoryBackend>, Arc<QueueGateway>) {
    let gateway = Arc::new(QueueGateway::new(config.clone(), backend.clone()));
    gateway
        .try_create_queues()
        .await
        .expect("queues should be created");
    backend.reset_calls();
    (backend, gateway)
}

/// Stores a message without a type tag, which the gateway itself refuses to send.
pub async fn send_untyped(
    backend: &InMemoryBackend,
    gateway: &QueueGateway,
    queue_name: &str,
    body: &str,
) {
    let url = gateway
        .resolve(queue_name)
        .await
        .expect("queue should resolve");
    backend
        .send_message(
            &url,
            OutgoingMessage {
                body: body.to_string(),
                attributes: HashMap::new(),
                group_id: None,
                deduplication_id: None,
            },
        )
        .await
        .expect("untyped message should be stored");
}

/// Polls `condition` until it holds or `limit` elapses.
pub async fn eventually<F>(limit: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Bodies seen by a processor, shared between the test and the consumer.
#[derive(Clone, Default)]
pub struct SharedLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl SharedLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

/// How a [`TestProcessor`] responds to a message.
#[derive(Clone, Copy, Debug)]
pub enum Behavior {
    Succeed,
    Fail,
    Panic,
    /// Succeeds after sleeping when the body starts with "slow".
    SlowWhenAsked(Duration),
}

/// Processor claiming one message type that records every body it is given.
pub struct TestProcessor {
    message_type: String,
    log: SharedLog,
    behavior: Behavior,
    /// When set, the processor records how many deletes had happened when it ran.
    backend: Option<Arc<InMemoryBackend>>,
}

impl TestProcessor {
    pub fn new(message_type: &str, log: SharedLog, behavior: Behavior) -> Self {
        TestProcessor {
            message_type: message_type.to_string(),
            log,
            behavior,
            backend: None,
        }
    }

    pub fn observing(mut self, backend: Arc<InMemoryBackend>) -> Self {
        self.backend = Some(backend);
        self
    }
}

#[async_trait]
impl MessageProcessor for TestProcessor {
    fn can_process(&self, message_type: &str) -> bool {
        message_type == self.message_type
    }

    async fn process(&self, message: &QueueMessage) -> Result<(), SqsConsumerError> {
        match &self.backend {
            Some(backend) => {
                let deletes = backend.calls(Operation::DeleteMessage);
                self.log.push(format!("{}@deletes={deletes}", message.body));
            }
            None => self.log.push(message.body.clone()),
        }

        match self.behavior {
            Behavior::Succeed => Ok(()),
            Behavior::Fail => Err(GenericError::new("processor rejected message").into()),
            Behavior::Panic => panic!("processor blew up on {}", message.body),
            Behavior::SlowWhenAsked(delay) => {
                if message.body.starts_with("slow") {
                    tokio::time::sleep(delay).await;
                }
                Ok(())
            }
        }
    }
}
