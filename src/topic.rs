//! Topic negotiation
//!
//! Resolves topic metadata before a stream is opened and refuses topics the
//! session may not subscribe to.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, instrument};

use crate::error::{Error, Result};
use crate::pubsub::{PubSubApi, TopicInfo};

/// Topic metadata fetched once per connect attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicDescriptor {
    /// Fully qualified topic name (e.g. `/event/Order_Event__e`)
    pub name: String,
    /// Whether the session may subscribe
    pub can_subscribe: bool,
    /// Whether the session may publish
    pub can_publish: bool,
    /// Schema id of the topic's current event layout
    pub schema_id: String,
    /// Organization that owns the topic
    pub tenant_id: String,
}

impl From<TopicInfo> for TopicDescriptor {
    fn from(info: TopicInfo) -> Self {
        Self {
            name: info.topic_name,
            can_subscribe: info.can_subscribe,
            can_publish: info.can_publish,
            schema_id: info.schema_id,
            tenant_id: info.tenant_guid,
        }
    }
}

impl TopicDescriptor {
    /// Fails with [`Error::Permission`] unless the topic is subscribable.
    pub fn require_subscribe(&self) -> Result<()> {
        if self.can_subscribe {
            Ok(())
        } else {
            Err(Error::Permission(format!(
                "this user is not allowed to subscribe to {}",
                self.name
            )))
        }
    }

    /// Fails with [`Error::Permission`] unless the topic accepts publishes.
    pub fn require_publish(&self) -> Result<()> {
        if self.can_publish {
            Ok(())
        } else {
            Err(Error::Permission(format!(
                "this user is not allowed to publish to {}",
                self.name
            )))
        }
    }
}

/// Resolves topics through the broker.
#[derive(Debug, Clone)]
pub struct TopicNegotiator {
    api: Arc<dyn PubSubApi>,
}

impl TopicNegotiator {
    pub fn new(api: Arc<dyn PubSubApi>) -> Self {
        Self { api }
    }

    /// Looks up `topic_name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Topic`] if the topic does not exist, the call fails,
    /// or it does not complete within `timeout`.
    #[instrument(skip(self))]
    pub async fn resolve(&self, topic_name: &str, timeout: Duration) -> Result<TopicDescriptor> {
        let info = self
            .api
            .get_topic(topic_name, timeout)
            .await
            .map_err(|e| Error::Topic(format!("could not resolve {topic_name}: {e}")))?;

        let descriptor = TopicDescriptor::from(info);
        debug!(
            can_subscribe = descriptor.can_subscribe,
            can_publish = descriptor.can_publish,
            schema_id = %descriptor.schema_id,
            "Resolved topic"
        );
        Ok(descriptor)
    }
}
