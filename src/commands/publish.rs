//! Publish command
//!
//! Encodes one JSON object with the topic's schema and publishes it.

use std::sync::Arc;

use anyhow::Result;
use serde_json::Value as JsonValue;

use crate::config::Config;
use crate::consumer::BrokerSession;
use crate::error::Error;
use crate::publisher::{PublishedEvent, Publisher};
use crate::pubsub::BrokerConnector;
use crate::schema::SchemaRegistryCache;
use crate::topic::TopicNegotiator;

/// Run the publish command against the configured broker
///
/// # Arguments
///
/// * `config` - Global configuration
/// * `data` - Event body as a JSON object
pub async fn run_publish(config: &Config, data: &str) -> Result<()> {
    let connector = super::grpc_connector(config);
    let published = publish(config, &connector, data).await?;
    println!("{}", serde_json::to_string(&published)?);
    Ok(())
}

pub(crate) async fn publish(
    config: &Config,
    connector: &dyn BrokerConnector,
    data: &str,
) -> Result<PublishedEvent> {
    let topic = config.require_topic()?;
    let body: JsonValue = serde_json::from_str(data)
        .map_err(|e| Error::Config(format!("--data is not valid JSON: {}", e)))?;
    if !body.is_object() {
        return Err(Error::Config("--data must be a JSON object".to_string()).into());
    }

    let http = super::http_client(config.timeout())?;
    let session =
        BrokerSession::establish(http, &config.credentials()?, connector, config.timeout())
            .await?;
    let descriptor = TopicNegotiator::new(Arc::clone(&session.api))
        .resolve(topic, config.timeout())
        .await?;

    let schemas = Arc::new(SchemaRegistryCache::new(
        Arc::clone(&session.api),
        config.timeout(),
    ));
    let publisher = Publisher::new(session.api, schemas, config.timeout());
    Ok(publisher.publish_json(&descriptor, &body).await?)
}
