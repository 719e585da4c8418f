use std::sync::Arc;

use tracing::warn;

use crate::errors::SqsConsumerError;
use crate::gateway::QueueStatus;
use crate::receiver::SqsConsumer;

/// Binary health signal for external probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub description: String,
}

impl HealthReport {
    pub fn from_status(status: &QueueStatus) -> Self {
        HealthReport {
            status: if status.is_healthy {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            },
            description: format!("Status for '{}' queue", status.queue_name),
        }
    }

    /// Report for one status query; a failed query is unhealthy with the error in the description.
    pub fn from_outcome(queue_name: &str, outcome: &Result<QueueStatus, SqsConsumerError>) -> Self {
        match outcome {
            Ok(status) => HealthReport::from_status(status),
            Err(err) => HealthReport {
                status: HealthStatus::Unhealthy,
                description: format!("Status for '{queue_name}' queue: {err}"),
            },
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Health check over a consumer's queue status.
#[derive(Clone)]
pub struct SqsHealthCheck {
    consumer: Arc<SqsConsumer>,
}

impl SqsHealthCheck {
    pub fn new(consumer: Arc<SqsConsumer>) -> Self {
        SqsHealthCheck { consumer }
    }

    /// Queries the queue; a failed query reports unhealthy with the error in the description.
    pub async fn check(&self) -> HealthReport {
        let queue_name = self.consumer.gateway().queue_name();
        let outcome = self.consumer.status().await;
        if let Err(err) = &outcome {
            warn!(queue = queue_name, error = %err, "Health check could not query queue status");
        }
        HealthReport::from_outcome(queue_name, &outcome)
    }
}
