use asset_alloc_core::alert::{AlertPublisher, PublishError};
use aws_sdk_sns::error::DisplayErrorContext;

use super::block_on;

/// SNS subjects are capped at 100 characters.
const MAX_SUBJECT_LEN: usize = 100;

#[derive(Clone)]
pub struct SnsAlertPublisher {
    topic_arn: String,
    client: aws_sdk_sns::Client,
}

impl SnsAlertPublisher {
    pub fn new(topic_arn: impl Into<String>, client: aws_sdk_sns::Client) -> Self {
        Self {
            topic_arn: topic_arn.into(),
            client,
        }
    }
}

impl AlertPublisher for SnsAlertPublisher {
    fn publish(&self, subject: &str, message: &str) -> Result<(), PublishError> {
        let subject = subject.chars().take(MAX_SUBJECT_LEN).collect::<String>();
        let request = self
            .client
            .publish()
            .topic_arn(&self.topic_arn)
            .subject(subject)
            .message(message);
        block_on(async move {
            request.send().await.map(|_| ()).map_err(|error| {
                PublishError::Request(format!("sns publish failed: {}", DisplayErrorContext(error)))
            })
        })
    }
}

/// Publisher chosen at startup: SNS when a topic is configured, otherwise
/// alerts only reach the logs.
#[derive(Clone)]
pub enum RuntimePublisher {
    Sns(SnsAlertPublisher),
    LogOnly,
}

impl AlertPublisher for RuntimePublisher {
    fn publish(&self, subject: &str, message: &str) -> Result<(), PublishError> {
        match self {
            Self::Sns(publisher) => publisher.publish(subject, message),
            Self::LogOnly => {
                tracing::warn!(subject, message, "no alert topic configured");
                Ok(())
            }
        }
    }
}
