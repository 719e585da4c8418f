use std::sync::Arc;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use rs_sqs_consumer::{
    backend::aws::AwsSqsBackend,
    cancel::cancel_pair,
    client::create_sqs_client,
    config::SqsConfig,
    errors::SqsConsumerError,
    health::HealthReport,
    message::QueueMessage,
    processor::{MessageProcessor, ProcessorRegistry},
    receiver::SqsConsumer,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Administrative commands for an SQS queue and its dead-letter queue.
#[derive(Debug, Parser)]
#[command(name = "sqs-admin", version, about)]
struct Cli {
    /// Overrides the configured queue name.
    #[arg(long, env = "SQS_QUEUE_NAME", global = true)]
    queue: Option<String>,

    /// Treat the queues as FIFO queues.
    #[arg(long, global = true)]
    fifo: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the main and dead-letter queues with a redrive policy.
    CreateQueues,
    /// Print the main queue status and health.
    Status,
    /// Move dead-lettered messages back to the main queue.
    Reprocess,
    /// Send a message to the main queue.
    Send {
        #[arg(long = "type")]
        message_type: String,
        #[arg(long)]
        body: String,
    },
    /// Consume the main queue, logging every message of the given types, until Ctrl-C.
    Consume {
        #[arg(long = "type", required = true)]
        message_types: Vec<String>,
    },
}

/// Acknowledges every message of the types it was started with after logging it.
struct LoggingProcessor {
    message_types: Vec<String>,
}

#[async_trait]
impl MessageProcessor for LoggingProcessor {
    fn can_process(&self, message_type: &str) -> bool {
        self.message_types.iter().any(|t| t == message_type)
    }

    async fn process(&self, message: &QueueMessage) -> Result<(), SqsConsumerError> {
        info!(
            message_id = %message.message_id,
            message_type = message.message_type().unwrap_or_default(),
            receive_count = message.receive_count.unwrap_or_default(),
            body = %message.body,
            "Received message"
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rs_sqs_consumer=info,sqs_admin=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = SqsConfig::load()?;
    if let Some(queue) = cli.queue {
        config.queue_name = queue;
    }
    config.is_fifo |= cli.fifo;
    config.validate()?;

    let backend = Arc::new(AwsSqsBackend::new(create_sqs_client(&config).await));

    let registry = match &cli.command {
        Command::Consume { message_types } => {
            ProcessorRegistry::new().with_processor(LoggingProcessor {
                message_types: message_types.clone(),
            })
        }
        _ => ProcessorRegistry::new(),
    };
    let consumer = Arc::new(SqsConsumer::with_backend(config, backend, registry));
    let gateway = Arc::clone(consumer.gateway());

    match cli.command {
        Command::CreateQueues => {
            gateway.try_create_queues().await?;
            println!(
                "Created '{}' and '{}'",
                gateway.queue_name(),
                gateway.dead_letter_queue_name()
            );
        }
        Command::Status => {
            let outcome = consumer.status().await;
            let health = HealthReport::from_outcome(gateway.queue_name(), &outcome);
            if let Ok(status) = &outcome {
                println!("{status:#?}");
            }
            println!("{:?}: {}", health.status, health.description);
            outcome?;
        }
        Command::Reprocess => {
            let (cancel, signal) = cancel_pair();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            });
            let summary = consumer.reprocess_until(&signal).await?;
            println!(
                "Requeued {} message(s); left {} untyped message(s) in '{}'",
                summary.requeued,
                summary.skipped_untyped,
                gateway.dead_letter_queue_name()
            );
        }
        Command::Send { message_type, body } => {
            let message_id = gateway.send_to_main(&body, &message_type).await?;
            println!("Sent message {message_id}");
        }
        Command::Consume { .. } => {
            consumer.bootstrap().await;
            consumer.start();
            tokio::signal::ctrl_c().await?;
            info!("Shutdown signal received");
            consumer.shutdown().await;
        }
    }

    Ok(())
}
