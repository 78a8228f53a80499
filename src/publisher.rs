//! Single-event publishing
//!
//! Encodes a JSON object against the topic's current schema and publishes
//! it as one event. The schema is resolved through the same
//! [`SchemaRegistryCache`] the consumer uses.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::pubsub::{ProducerEvent, PubSubApi, PublishRequest};
use crate::schema::SchemaRegistryCache;
use crate::topic::TopicDescriptor;

/// Outcome of a successful publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedEvent {
    /// Client-assigned event id
    pub event_id: String,
    /// Position the broker assigned to the event
    #[serde(serialize_with = "crate::subscription::serialize_base64")]
    pub replay_id: Vec<u8>,
}

/// Publishes JSON bodies as platform events.
#[derive(Debug, Clone)]
pub struct Publisher {
    api: Arc<dyn PubSubApi>,
    schemas: Arc<SchemaRegistryCache>,
    timeout: Duration,
}

impl Publisher {
    pub fn new(
        api: Arc<dyn PubSubApi>,
        schemas: Arc<SchemaRegistryCache>,
        timeout: Duration,
    ) -> Self {
        Self {
            api,
            schemas,
            timeout,
        }
    }

    /// Encodes `body` with the topic's schema and publishes it.
    ///
    /// # Errors
    ///
    /// - [`Error::Permission`] if the topic does not accept publishes.
    /// - [`Error::Decode`] if `body` does not fit the schema.
    /// - [`Error::Transport`] if the call fails or the broker rejects the
    ///   event.
    #[instrument(skip(self, body), fields(topic = %topic.name))]
    pub async fn publish_json(
        &self,
        topic: &TopicDescriptor,
        body: &JsonValue,
    ) -> Result<PublishedEvent> {
        topic.require_publish()?;

        let decoder = self.schemas.fetch(&topic.schema_id).await?;
        let payload = decoder.encode(body)?;
        let event_id = Uuid::new_v4().to_string();

        let request = PublishRequest {
            topic_name: topic.name.clone(),
            events: vec![ProducerEvent {
                id: event_id.clone(),
                schema_id: topic.schema_id.clone(),
                payload,
                headers: Vec::new(),
            }],
            auth_refresh: String::new(),
        };

        let response = self.api.publish(request, self.timeout).await?;
        let result = response.results.into_iter().next().ok_or_else(|| {
            Error::Transport(format!("no result returned when publishing to {}", topic.name))
        })?;
        if let Some(error) = result.error {
            return Err(Error::Transport(format!(
                "publish to {} rejected: {}",
                topic.name, error.msg
            )));
        }

        info!(event_id = %event_id, "Published event");
        Ok(PublishedEvent {
            event_id,
            replay_id: result.replay_id,
        })
    }
}
