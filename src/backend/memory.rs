//! In-process SQS simulator for tests and local development.
//!
//! The simulator implements the parts of SQS the gateway relies on:
//! - Visibility timeout: received messages stay hidden until deleted or until the timeout lapses
//! - Receive counts reported as `ApproximateReceiveCount`
//! - `RedrivePolicy`: messages received `maxReceiveCount` times move to the target queue
//! - FIFO queues require a message group id and drop repeated deduplication ids
//!
//! Every operation is counted, and failures can be injected per operation.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use super::{QueueBackend, QueueUrl, attributes};
use crate::errors::BackendError;
use crate::message::{OutgoingMessage, QueueMessage};

const URL_PREFIX: &str = "memory://sqs/000000000000/";
const ARN_PREFIX: &str = "arn:aws:sqs:memory:000000000000:";
const LONG_POLL_TICK: Duration = Duration::from_millis(10);

/// Backend operations, used for call counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateQueue,
    GetQueueUrl,
    GetQueueAttributes,
    SetQueueAttributes,
    ReceiveMessage,
    SendMessage,
    DeleteMessage,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RedrivePolicy {
    dead_letter_target_arn: String,
    #[serde(deserialize_with = "number_or_string")]
    max_receive_count: u32,
}

fn number_or_string<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u32),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Clone)]
struct StoredMessage {
    message_id: String,
    body: String,
    attributes: HashMap<String, String>,
    receive_count: u32,
    receipt_handle: Option<String>,
    invisible_until: Option<Instant>,
}

impl StoredMessage {
    fn is_visible(&self, now: Instant) -> bool {
        self.invisible_until.is_none_or(|until| until <= now)
    }

    fn snapshot(&self) -> QueueMessage {
        QueueMessage {
            message_id: self.message_id.clone(),
            body: self.body.clone(),
            receipt_handle: self.receipt_handle.clone().unwrap_or_default(),
            attributes: self.attributes.clone(),
            receive_count: Some(self.receive_count),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryQueue {
    attributes: HashMap<String, String>,
    messages: VecDeque<StoredMessage>,
    deduplication_ids: HashSet<String>,
    last_modified: i64,
}

impl MemoryQueue {
    fn is_fifo(&self) -> bool {
        self.attributes
            .get(attributes::FIFO_QUEUE)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    fn redrive_policy(&self) -> Option<RedrivePolicy> {
        self.attributes
            .get(attributes::REDRIVE_POLICY)
            .and_then(|raw| serde_json::from_str(raw).ok())
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    /// Keyed by queue name.
    queues: HashMap<String, MemoryQueue>,
    calls: HashMap<Operation, usize>,
    failures: HashMap<Operation, VecDeque<BackendError>>,
}

impl MemoryState {
    fn queue_mut(&mut self, queue_url: &QueueUrl) -> Result<&mut MemoryQueue, BackendError> {
        let name = name_from_url(queue_url)?;
        self.queues
            .get_mut(name)
            .ok_or(BackendError::QueueDoesNotExist)
    }
}

fn name_from_url(queue_url: &QueueUrl) -> Result<&str, BackendError> {
    queue_url
        .as_str()
        .strip_prefix(URL_PREFIX)
        .ok_or(BackendError::QueueDoesNotExist)
}

fn url_for(queue_name: &str) -> QueueUrl {
    QueueUrl::new(format!("{URL_PREFIX}{queue_name}"))
}

fn bad_request(code: &str, message: impl Into<String>) -> BackendError {
    BackendError::service(Some(400), code, message)
}

fn now_epoch_seconds() -> i64 {
    chrono::Utc::now().timestamp()
}

/// In-memory [`QueueBackend`].
#[derive(Debug)]
pub struct InMemoryBackend {
    state: Mutex<MemoryState>,
    visibility_timeout: Duration,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        InMemoryBackend::new(Duration::from_secs(30))
    }
}

impl InMemoryBackend {
    pub fn new(visibility_timeout: Duration) -> Self {
        InMemoryBackend {
            state: Mutex::new(MemoryState::default()),
            visibility_timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Counts the call and pops an injected failure, if one is queued.
    fn enter(&self, operation: Operation) -> Result<MutexGuard<'_, MemoryState>, BackendError> {
        let mut state = self.lock();
        *state.calls.entry(operation).or_default() += 1;
        if let Some(err) = state
            .failures
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
        {
            return Err(err);
        }
        Ok(state)
    }

    /// Makes the next call of `operation` fail with `error`. Failures queue up in order.
    pub fn fail_next(&self, operation: Operation, error: BackendError) {
        self.lock()
            .failures
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Number of times `operation` has been invoked.
    pub fn calls(&self, operation: Operation) -> usize {
        self.lock().calls.get(&operation).copied().unwrap_or(0)
    }

    pub fn reset_calls(&self) {
        self.lock().calls.clear();
    }

    /// All messages currently stored in the named queue, visible or not.
    pub fn messages(&self, queue_name: &str) -> Vec<QueueMessage> {
        self.lock()
            .queues
            .get(queue_name)
            .map(|queue| queue.messages.iter().map(StoredMessage::snapshot).collect())
            .unwrap_or_default()
    }

    pub fn queue_attributes(&self, queue_name: &str) -> Option<HashMap<String, String>> {
        self.lock()
            .queues
            .get(queue_name)
            .map(|queue| queue.attributes.clone())
    }

    /// Makes every in-flight message of the queue visible again, as if its timeout lapsed.
    pub fn expire_visibility(&self, queue_name: &str) {
        if let Some(queue) = self.lock().queues.get_mut(queue_name) {
            for message in queue.messages.iter_mut() {
                message.invisible_until = None;
            }
        }
    }

    /// Takes up to `max` visible messages, applying the queue's redrive policy.
    fn take_visible(
        &self,
        queue_url: &QueueUrl,
        max: usize,
    ) -> Result<Vec<QueueMessage>, BackendError> {
        let mut state = self.lock();
        let now = Instant::now();
        let queue_name = name_from_url(queue_url)?.to_string();

        let (received, dead_lettered, policy) = {
            let queue = state.queue_mut(queue_url)?;
            let policy = queue.redrive_policy();
            let mut received = Vec::new();
            let mut dead_lettered = Vec::new();
            let mut index = 0;

            while index < queue.messages.len() && received.len() < max {
                if !queue.messages[index].is_visible(now) {
                    index += 1;
                    continue;
                }

                let exhausted = policy
                    .as_ref()
                    .is_some_and(|p| queue.messages[index].receive_count >= p.max_receive_count);
                if exhausted {
                    if let Some(mut message) = queue.messages.remove(index) {
                        message.receipt_handle = None;
                        message.invisible_until = None;
                        dead_lettered.push(message);
                    }
                    continue;
                }

                let message = &mut queue.messages[index];
                message.receive_count += 1;
                message.receipt_handle = Some(Uuid::new_v4().to_string());
                message.invisible_until = Some(now + self.visibility_timeout);
                received.push(message.snapshot());
                index += 1;
            }

            (received, dead_lettered, policy)
        };

        if let Some(policy) = policy.filter(|_| !dead_lettered.is_empty()) {
            let target = policy
                .dead_letter_target_arn
                .strip_prefix(ARN_PREFIX)
                .unwrap_or(&policy.dead_letter_target_arn)
                .to_string();
            match state.queues.get_mut(&target) {
                Some(dead_letter_queue) => dead_letter_queue.messages.extend(dead_lettered),
                None => {
                    // Target missing: put the messages back rather than lose them.
                    if let Some(queue) = state.queues.get_mut(&queue_name) {
                        queue.messages.extend(dead_lettered);
                    }
                }
            }
        }

        Ok(received)
    }
}

#[async_trait]
impl QueueBackend for InMemoryBackend {
    async fn create_queue(
        &self,
        queue_name: &str,
        attributes: HashMap<String, String>,
    ) -> Result<QueueUrl, BackendError> {
        let mut state = self.enter(Operation::CreateQueue)?;
        if queue_name.is_empty() {
            return Err(bad_request("InvalidParameterValue", "queue name is required"));
        }

        let wants_fifo = attributes
            .get(attributes::FIFO_QUEUE)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));
        if wants_fifo && !queue_name.ends_with(".fifo") {
            return Err(bad_request(
                "InvalidParameterValue",
                "the name of a FIFO queue can only include alphanumeric characters, hyphens, or underscores, must end with .fifo suffix",
            ));
        }

        let queue = state.queues.entry(queue_name.to_string()).or_default();
        queue.attributes.extend(attributes);
        queue.last_modified = now_epoch_seconds();
        Ok(url_for(queue_name))
    }

    async fn get_queue_url(&self, queue_name: &str) -> Result<QueueUrl, BackendError> {
        let state = self.enter(Operation::GetQueueUrl)?;
        if state.queues.contains_key(queue_name) {
            Ok(url_for(queue_name))
        } else {
            Err(BackendError::QueueDoesNotExist)
        }
    }

    async fn get_queue_attributes(
        &self,
        queue_url: &QueueUrl,
        attribute_names: &[&str],
    ) -> Result<HashMap<String, String>, BackendError> {
        let mut state = self.enter(Operation::GetQueueAttributes)?;
        let queue_name = name_from_url(queue_url)?.to_string();
        let queue = state.queue_mut(queue_url)?;
        let now = Instant::now();

        let mut result = HashMap::new();
        for name in attribute_names {
            let value = match *name {
                attributes::QUEUE_ARN => Some(format!("{ARN_PREFIX}{queue_name}")),
                attributes::APPROXIMATE_NUMBER_OF_MESSAGES => Some(
                    queue
                        .messages
                        .iter()
                        .filter(|m| m.is_visible(now))
                        .count()
                        .to_string(),
                ),
                attributes::APPROXIMATE_NUMBER_OF_MESSAGES_NOT_VISIBLE => Some(
                    queue
                        .messages
                        .iter()
                        .filter(|m| !m.is_visible(now))
                        .count()
                        .to_string(),
                ),
                attributes::LAST_MODIFIED_TIMESTAMP => Some(queue.last_modified.to_string()),
                other => queue.attributes.get(other).cloned(),
            };
            if let Some(value) = value {
                result.insert((*name).to_string(), value);
            }
        }
        Ok(result)
    }

    async fn set_queue_attributes(
        &self,
        queue_url: &QueueUrl,
        attributes: HashMap<String, String>,
    ) -> Result<(), BackendError> {
        let mut state = self.enter(Operation::SetQueueAttributes)?;
        let queue = state.queue_mut(queue_url)?;
        queue.attributes.extend(attributes);
        queue.last_modified = now_epoch_seconds();
        Ok(())
    }

    async fn receive_messages(
        &self,
        queue_url: &QueueUrl,
        max_messages: i32,
        wait_seconds: i32,
    ) -> Result<Vec<QueueMessage>, BackendError> {
        drop(self.enter(Operation::ReceiveMessage)?);

        let max = usize::try_from(max_messages.max(1)).unwrap_or(1);
        let wait = Duration::from_secs(u64::try_from(wait_seconds.max(0)).unwrap_or(0));
        let deadline = Instant::now() + wait;

        loop {
            let received = self.take_visible(queue_url, max)?;
            if !received.is_empty() || Instant::now() >= deadline {
                return Ok(received);
            }
            tokio::time::sleep(LONG_POLL_TICK).await;
        }
    }

    async fn send_message(
        &self,
        queue_url: &QueueUrl,
        message: OutgoingMessage,
    ) -> Result<String, BackendError> {
        let mut state = self.enter(Operation::SendMessage)?;
        let queue = state.queue_mut(queue_url)?;

        if queue.is_fifo() {
            if message.group_id.is_none() {
                return Err(bad_request(
                    "MissingParameter",
                    "the request must contain the parameter MessageGroupId",
                ));
            }
            if let Some(id) = &message.deduplication_id {
                if !queue.deduplication_ids.insert(id.clone()) {
                    return Ok(Uuid::new_v4().to_string());
                }
            }
        }

        let message_id = Uuid::new_v4().to_string();
        queue.messages.push_back(StoredMessage {
            message_id: message_id.clone(),
            body: message.body,
            attributes: message.attributes,
            receive_count: 0,
            receipt_handle: None,
            invisible_until: None,
        });
        Ok(message_id)
    }

    async fn delete_message(
        &self,
        queue_url: &QueueUrl,
        receipt_handle: &str,
    ) -> Result<(), BackendError> {
        let mut state = self.enter(Operation::DeleteMessage)?;
        let queue = state.queue_mut(queue_url)?;

        let position = queue
            .messages
            .iter()
            .position(|m| m.receipt_handle.as_deref() == Some(receipt_handle));
        match position {
            Some(index) => {
                queue.messages.remove(index);
                Ok(())
            }
            None => Err(bad_request(
                "ReceiptHandleIsInvalid",
                format!("the receipt handle '{receipt_handle}' is not valid"),
            )),
        }
    }
}
