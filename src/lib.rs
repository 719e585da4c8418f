//! # AWS SQS Consumer
//!
//! An asynchronous AWS SQS consumer/producer that polls a queue, routes each
//! message to the processor registered for its declared type, and moves
//! dead-lettered messages back into circulation on demand.
//!
//! ## Features
//!
//! - Start/stop polling loop with cooperative cancellation of long polls
//! - Type-based dispatch to an explicit registry of processors
//! - Delete-on-success acknowledgment; failed messages are redelivered by SQS
//! - Queue provisioning with a dead-letter redrive policy
//! - Manual dead-letter redrive back to the main queue
//! - Cached queue URL resolution
//! - Status and health reporting
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use rs_sqs_consumer::{
//!     backend::aws::AwsSqsBackend, client::create_sqs_client_from_env, config::SqsConfig,
//!     errors::SqsConsumerError, message::QueueMessage, processor::{MessageProcessor, ProcessorRegistry},
//!     receiver::SqsConsumer,
//! };
//!
//! struct OrderPlacedProcessor;
//!
//! #[async_trait]
//! impl MessageProcessor for OrderPlacedProcessor {
//!     fn can_process(&self, message_type: &str) -> bool {
//!         message_type == "OrderPlaced"
//!     }
//!
//!     async fn process(&self, message: &QueueMessage) -> Result<(), SqsConsumerError> {
//!         println!("Processing message: {}", message.body);
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = create_sqs_client_from_env().await;
//!     let registry = ProcessorRegistry::new().with_processor(OrderPlacedProcessor);
//!     let consumer = SqsConsumer::with_backend(
//!         SqsConfig::new("orders"),
//!         Arc::new(AwsSqsBackend::new(client)),
//!         registry,
//!     );
//!
//!     consumer.start();
//!     tokio::signal::ctrl_c().await?;
//!     consumer.shutdown().await;
//!
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod cancel;
pub mod client;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod health;
pub mod message;
pub mod processor;
pub mod receiver;
