use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info};

use crate::backend::QueueBackend;
use crate::cancel::{CancelHandle, CancelSignal, cancel_pair};
use crate::config::SqsConfig;
use crate::errors::SqsConsumerError;
use crate::gateway::{QueueGateway, QueueStatus, RedriveSummary};
use crate::processor::ProcessorRegistry;

pub mod dispatch;

/// Consumes the main queue and routes each message to its processor.
///
/// `start` spawns a detached polling loop and returns at once; `stop` fires the
/// loop's cancellation signal. Both are no-ops when already in the requested
/// state. They are meant to be driven by one administrative caller; concurrent
/// callers are serialized but racing start/stop pairs have no defined winner.
pub struct SqsConsumer {
    /// The gateway used for every queue operation.
    gateway: Arc<QueueGateway>,

    /// Processors that messages are dispatched to.
    registry: Arc<ProcessorRegistry>,

    run: Mutex<Option<ConsumerRun>>,
}

struct ConsumerRun {
    cancel: CancelHandle,
    task: JoinHandle<()>,
}

impl ConsumerRun {
    fn is_active(&self) -> bool {
        !self.cancel.is_cancelled() && !self.task.is_finished()
    }
}

impl SqsConsumer {
    pub fn new(gateway: Arc<QueueGateway>, registry: ProcessorRegistry) -> Self {
        SqsConsumer {
            gateway,
            registry: Arc::new(registry),
            run: Mutex::new(None),
        }
    }

    /// Builds the gateway for `config` over `backend` and wraps it in a consumer.
    pub fn with_backend(
        config: SqsConfig,
        backend: Arc<dyn QueueBackend>,
        registry: ProcessorRegistry,
    ) -> Self {
        SqsConsumer::new(Arc::new(QueueGateway::new(config, backend)), registry)
    }

    pub fn gateway(&self) -> &Arc<QueueGateway> {
        &self.gateway
    }

    /// Creates the queues when the configuration asks for it. Failures are logged only.
    pub async fn bootstrap(&self) {
        if self.gateway.config().auto_create {
            self.gateway.create_queues().await;
        }
    }

    fn lock_run(&self) -> MutexGuard<'_, Option<ConsumerRun>> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts the polling loop on the current tokio runtime.
    pub fn start(&self) {
        let mut run = self.lock_run();
        if run.as_ref().is_some_and(ConsumerRun::is_active) {
            debug!(queue = self.gateway.queue_name(), "Consumer already running");
            return;
        }

        let (cancel, signal) = cancel_pair();
        let task = tokio::spawn(consume(
            Arc::clone(&self.gateway),
            Arc::clone(&self.registry),
            signal,
        ));
        *run = Some(ConsumerRun { cancel, task });
    }

    /// Signals the polling loop to exit. Returns without waiting for it.
    pub fn stop(&self) {
        let run = self.lock_run();
        if let Some(active) = run.as_ref().filter(|r| r.is_active()) {
            active.cancel.cancel();
            info!(queue = self.gateway.queue_name(), "Stopping consumer");
        }
    }

    /// Stops the loop and waits until it and its in-flight messages have finished.
    pub async fn shutdown(&self) {
        let run = self.lock_run().take();
        if let Some(run) = run {
            run.cancel.cancel();
            if let Err(err) = run.task.await {
                error!(queue = self.gateway.queue_name(), error = %err, "Consumer loop ended abnormally");
            }
        }
    }

    pub fn is_consuming(&self) -> bool {
        self.lock_run().as_ref().is_some_and(ConsumerRun::is_active)
    }

    /// Main queue status together with the consumer's run state.
    pub async fn status(&self) -> Result<QueueStatus, SqsConsumerError> {
        let mut status = self.gateway.status().await?;
        status.is_consuming = self.is_consuming();
        Ok(status)
    }

    /// Runs one dead-letter redrive pass. Independent of the polling loop.
    pub async fn reprocess(&self) -> Result<RedriveSummary, SqsConsumerError> {
        self.gateway.redrive(&CancelSignal::never()).await
    }

    /// Like [`SqsConsumer::reprocess`], ending early once `signal` fires.
    pub async fn reprocess_until(
        &self,
        signal: &CancelSignal,
    ) -> Result<RedriveSummary, SqsConsumerError> {
        self.gateway.redrive(signal).await
    }
}

impl Drop for SqsConsumer {
    fn drop(&mut self) {
        let run = self.run.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(run) = run.as_ref() {
            run.cancel.cancel();
        }
    }
}

/// Polls until `signal` fires, spawning one supervised task per message.
async fn consume(gateway: Arc<QueueGateway>, registry: Arc<ProcessorRegistry>, signal: CancelSignal) {
    let queue = gateway.queue_name().to_string();
    let backoff = gateway.config().receive_error_backoff();
    let mut inflight: JoinSet<()> = JoinSet::new();

    info!(queue = %queue, processors = registry.len(), "Started consuming");

    while !signal.is_cancelled() {
        while let Some(result) = inflight.try_join_next() {
            log_task_result(&queue, result);
        }

        match gateway.receive_main(&signal).await {
            Ok(messages) => {
                for message in messages {
                    inflight.spawn(dispatch::dispatch_message(
                        Arc::clone(&gateway),
                        Arc::clone(&registry),
                        message,
                    ));
                }
            }
            Err(err) => {
                error!(queue = %queue, error = %err, "Error receiving messages");
                tokio::select! {
                    _ = signal.cancelled() => {}
                    _ = tokio::time::sleep(backoff) => {}
                }
            }
        }
    }

    while let Some(result) = inflight.join_next().await {
        log_task_result(&queue, result);
    }
    info!(queue = %queue, "Stopped consuming");
}

fn log_task_result(queue: &str, result: Result<(), tokio::task::JoinError>) {
    if let Err(err) = result {
        error!(queue, error = %err, "Message task failed");
    }
}
