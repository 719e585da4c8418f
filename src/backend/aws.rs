use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_sqs::config::http::HttpResponse;
use aws_sdk_sqs::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_sqs::types::{MessageAttributeValue, MessageSystemAttributeName, QueueAttributeName};

use super::{QueueBackend, QueueUrl};
use crate::errors::BackendError;
use crate::message::{OutgoingMessage, QueueMessage};

const NON_EXISTENT_QUEUE_CODE: &str = "AWS.SimpleQueueService.NonExistentQueue";

/// [`QueueBackend`] backed by the AWS SDK SQS client.
#[derive(Debug, Clone)]
pub struct AwsSqsBackend {
    sqs_client: aws_sdk_sqs::Client,
}

impl AwsSqsBackend {
    pub fn new(sqs_client: aws_sdk_sqs::Client) -> Self {
        AwsSqsBackend { sqs_client }
    }
}

/// Splits SDK failures into non-success responses and faults without a response.
fn classify<E>(err: SdkError<E, HttpResponse>) -> BackendError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    match &err {
        SdkError::ServiceError(_) | SdkError::ResponseError(_) => {
            let status = err.raw_response().map(|response| response.status().as_u16());
            let code = err.code().unwrap_or("Unknown").to_string();
            let message = err
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| DisplayErrorContext(&err).to_string());
            BackendError::service(status, code, message)
        }
        _ => BackendError::Transport(DisplayErrorContext(&err).to_string()),
    }
}

fn missing_url(operation: &str) -> BackendError {
    BackendError::Transport(format!("{operation} response carried no queue URL"))
}

fn to_sdk_attributes(attributes: HashMap<String, String>) -> HashMap<QueueAttributeName, String> {
    attributes
        .into_iter()
        .map(|(name, value)| (QueueAttributeName::from(name.as_str()), value))
        .collect()
}

fn to_queue_message(message: &aws_sdk_sqs::types::Message) -> QueueMessage {
    let attributes = message
        .message_attributes()
        .map(|attributes| {
            attributes
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .string_value()
                        .map(|v| (name.clone(), v.to_string()))
                })
                .collect()
        })
        .unwrap_or_default();

    let receive_count = message
        .attributes()
        .and_then(|a| a.get(&MessageSystemAttributeName::ApproximateReceiveCount))
        .and_then(|count| count.parse().ok());

    QueueMessage {
        message_id: message.message_id().unwrap_or_default().to_string(),
        body: message.body().unwrap_or_default().to_string(),
        receipt_handle: message.receipt_handle().unwrap_or_default().to_string(),
        attributes,
        receive_count,
    }
}

#[async_trait]
impl QueueBackend for AwsSqsBackend {
    async fn create_queue(
        &self,
        queue_name: &str,
        attributes: HashMap<String, String>,
    ) -> Result<QueueUrl, BackendError> {
        let output = self
            .sqs_client
            .create_queue()
            .queue_name(queue_name)
            .set_attributes(Some(to_sdk_attributes(attributes)))
            .send()
            .await
            .map_err(classify)?;

        output
            .queue_url()
            .map(QueueUrl::from)
            .ok_or_else(|| missing_url("CreateQueue"))
    }

    async fn get_queue_url(&self, queue_name: &str) -> Result<QueueUrl, BackendError> {
        match self
            .sqs_client
            .get_queue_url()
            .queue_name(queue_name)
            .send()
            .await
        {
            Ok(output) => output
                .queue_url()
                .map(QueueUrl::from)
                .ok_or_else(|| missing_url("GetQueueUrl")),
            Err(err) => {
                let does_not_exist = err
                    .as_service_error()
                    .is_some_and(|e| e.is_queue_does_not_exist())
                    || err.code() == Some(NON_EXISTENT_QUEUE_CODE);
                if does_not_exist {
                    Err(BackendError::QueueDoesNotExist)
                } else {
                    Err(classify(err))
                }
            }
        }
    }

    async fn get_queue_attributes(
        &self,
        queue_url: &QueueUrl,
        attribute_names: &[&str],
    ) -> Result<HashMap<String, String>, BackendError> {
        let names = attribute_names
            .iter()
            .map(|name| QueueAttributeName::from(*name))
            .collect();

        let output = self
            .sqs_client
            .get_queue_attributes()
            .queue_url(queue_url.as_str())
            .set_attribute_names(Some(names))
            .send()
            .await
            .map_err(classify)?;

        Ok(output
            .attributes()
            .map(|attributes| {
                attributes
                    .iter()
                    .map(|(name, value)| (name.as_str().to_string(), value.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn set_queue_attributes(
        &self,
        queue_url: &QueueUrl,
        attributes: HashMap<String, String>,
    ) -> Result<(), BackendError> {
        self.sqs_client
            .set_queue_attributes()
            .queue_url(queue_url.as_str())
            .set_attributes(Some(to_sdk_attributes(attributes)))
            .send()
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn receive_messages(
        &self,
        queue_url: &QueueUrl,
        max_messages: i32,
        wait_seconds: i32,
    ) -> Result<Vec<QueueMessage>, BackendError> {
        let output = self
            .sqs_client
            .receive_message()
            .queue_url(queue_url.as_str())
            .max_number_of_messages(max_messages)
            .wait_time_seconds(wait_seconds)
            .message_system_attribute_names(MessageSystemAttributeName::ApproximateReceiveCount)
            .message_attribute_names("All")
            .send()
            .await
            .map_err(classify)?;

        Ok(output.messages().iter().map(to_queue_message).collect())
    }

    async fn send_message(
        &self,
        queue_url: &QueueUrl,
        message: OutgoingMessage,
    ) -> Result<String, BackendError> {
        let mut request = self
            .sqs_client
            .send_message()
            .queue_url(queue_url.as_str())
            .message_body(message.body)
            .set_message_group_id(message.group_id)
            .set_message_deduplication_id(message.deduplication_id);

        for (name, value) in message.attributes {
            let value = MessageAttributeValue::builder()
                .data_type("String")
                .string_value(value)
                .build()
                .map_err(|e| BackendError::Transport(format!("invalid message attribute '{name}': {e}")))?;
            request = request.message_attributes(name, value);
        }

        let output = request.send().await.map_err(classify)?;
        Ok(output.message_id().unwrap_or_default().to_string())
    }

    async fn delete_message(
        &self,
        queue_url: &QueueUrl,
        receipt_handle: &str,
    ) -> Result<(), BackendError> {
        self.sqs_client
            .delete_message()
            .queue_url(queue_url.as_str())
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(classify)?;
        Ok(())
    }
}
