//! Round trip against a real SQS account.
//!
//! Run with `cargo test -- --ignored` after setting `TEST_SQS_QUEUE_NAME` and the
//! usual AWS credential variables (a `.env` file is honoured).

use async_trait::async_trait;
use rs_sqs_consumer::{
    backend::aws::AwsSqsBackend,
    client,
    config::SqsConfig,
    errors::SqsConsumerError,
    message::QueueMessage,
    processor::{MessageProcessor, ProcessorRegistry},
    receiver::SqsConsumer,
};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;

#[derive(Clone)]
struct SharedCounter {
    count: Arc<Mutex<i32>>,
}

impl SharedCounter {
    fn new() -> Self {
        Self {
            count: Arc::new(Mutex::new(0)),
        }
    }

    async fn increment(&self) {
        let mut count = self.count.lock().await;
        *count += 1;
    }

    async fn get_count(&self) -> i32 {
        *self.count.lock().await
    }
}

struct CountingProcessor {
    counter: SharedCounter,
}

#[async_trait]
impl MessageProcessor for CountingProcessor {
    fn can_process(&self, message_type: &str) -> bool {
        message_type == "IntegrationPing"
    }

    async fn process(&self, message: &QueueMessage) -> Result<(), SqsConsumerError> {
        println!("Received message: {}", message.body);
        self.counter.increment().await;
        Ok(())
    }
}

#[tokio::test]
#[ignore = "requires AWS credentials and TEST_SQS_QUEUE_NAME"]
async fn test_sqs_round_trip() {
    dotenvy::dotenv().ok();

    let queue_name = env::var("TEST_SQS_QUEUE_NAME").expect("TEST_SQS_QUEUE_NAME must be set");
    let config = SqsConfig {
        long_poll_seconds: 5,
        ..SqsConfig::new(queue_name)
    };

    let sqs_client = client::create_sqs_client_from_env().await;
    let shared_counter = SharedCounter::new();
    let registry = ProcessorRegistry::new().with_processor(CountingProcessor {
        counter: shared_counter.clone(),
    });
    let consumer = Arc::new(SqsConsumer::with_backend(
        config,
        Arc::new(AwsSqsBackend::new(sqs_client)),
        registry,
    ));
    let gateway = consumer.gateway();

    gateway
        .try_create_queues()
        .await
        .expect("Failed to create test queues");
    gateway
        .send_to_main("Test message 1", "IntegrationPing")
        .await
        .expect("Failed to send test message 1");
    gateway
        .send_to_main("Test message 2", "IntegrationPing")
        .await
        .expect("Failed to send test message 2");

    println!("Sent 2 test messages to queue");

    consumer.start();

    let timeout_result = timeout(Duration::from_secs(30), async {
        loop {
            let count = shared_counter.get_count().await;
            println!("Current message count: {}", count);
            if count >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    })
    .await;

    let status = consumer.status().await.expect("Failed to query queue status");
    assert!(status.is_healthy);
    assert!(status.is_consuming);

    timeout(Duration::from_secs(10), consumer.shutdown())
        .await
        .expect("Consumer did not shut down gracefully");
    assert!(!consumer.is_consuming());

    match timeout_result {
        Ok(_) => {
            let final_count = shared_counter.get_count().await;
            println!("Successfully processed {} messages", final_count);
            assert!(
                final_count >= 2,
                "Should have processed at least 2 messages"
            );
        }
        Err(_) => {
            let final_count = shared_counter.get_count().await;
            panic!("Test timed out. Only processed {} messages", final_count);
        }
    }
}
