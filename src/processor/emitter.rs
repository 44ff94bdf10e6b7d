use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use log::debug;
use thiserror::Error;

use super::deadline::{Deadline, Expired};
use crate::models::Command;

pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_millis(10_000);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("publish not acknowledged: {0}")]
    NotAcknowledged(String),

    #[error("publish not acknowledged within {0:?}")]
    Timeout(Duration),

    #[error("publish interrupted: {0}")]
    Interrupted(String),

    #[error("topic not found: {0}")]
    TopicNotFound(String),

    #[error("permission denied on topic {0}")]
    PermissionDenied(String),

    #[error("command could not be encoded: {0}")]
    Encoding(String),
}

impl PublishError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PublishError::NotAcknowledged(_) | PublishError::Timeout(_) | PublishError::Interrupted(_)
        )
    }
}

/// Egress pub/sub seam. Resolves once the broker has acknowledged `payload`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandPublisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError>;
}

pub struct Emitter {
    publisher: Arc<dyn CommandPublisher>,
    topic: String,
    timeout: Duration,
}

impl Emitter {
    pub fn new(publisher: Arc<dyn CommandPublisher>, topic: impl Into<String>, timeout: Duration) -> Self {
        Self {
            publisher,
            topic: topic.into(),
            timeout,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publishes `command` as compact JSON and waits for the acknowledgement,
    /// bounded by both the publish timeout and the invocation deadline.
    pub async fn publish(&self, command: &Command, deadline: &Deadline) -> Result<(), PublishError> {
        let payload =
            serde_json::to_vec(command).map_err(|e| PublishError::Encoding(e.to_string()))?;

        debug!(topic = self.topic.as_str(), entity_id = command.entity_id.as_str(); "Publishing command");

        let publish = tokio::time::timeout(self.timeout, self.publisher.publish(&self.topic, payload));

        match deadline.run(publish).await {
            Ok(Ok(result)) => result,
            Ok(Err(_elapsed)) => Err(PublishError::Timeout(self.timeout)),
            Err(Expired::Deadline) => Err(PublishError::Interrupted(Expired::Deadline.to_string())),
            Err(Expired::Cancelled) => Err(PublishError::Interrupted(Expired::Cancelled.to_string())),
        }
    }
}
