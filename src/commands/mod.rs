/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint:

- `consume` writes decoded events to STDOUT and commits after each batch
- `publish` encodes and publishes one JSON object
- `topic` shows what the session may do with a topic
- `whoami` logs in and shows the authenticated identity

Handlers build their network clients and cursor store from [`Config`] and
delegate the protocol work to the library components.
*/

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::config::{Config, CursorBackend};
use crate::cursor::{
    sled_store, MemoryCursorStore, PersistentCursorStore, ReplayCursorStore, SledStore,
    StoreRegistry,
};
use crate::error::Error;
use crate::pubsub::GrpcConnector;

pub mod consume;
pub mod publish;

/// HTTP client for the OAuth exchange.
pub(crate) fn http_client(timeout: Duration) -> Result<Arc<reqwest::Client>> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Transport(format!("failed to build HTTP client: {}", e)))?;
    Ok(Arc::new(client))
}

/// gRPC connector for the configured endpoint.
pub(crate) fn grpc_connector(config: &Config) -> GrpcConnector {
    GrpcConnector::new(config.grpc_endpoint.clone(), config.timeout())
}

/// Builds the replay cursor store selected by `cursor.backend`.
pub(crate) fn cursor_store(config: &Config) -> Result<Arc<dyn ReplayCursorStore>> {
    match config.cursor.backend {
        CursorBackend::Memory => {
            tracing::warn!("Using in-memory cursor store; progress is lost on exit");
            Ok(Arc::new(MemoryCursorStore::new()))
        }
        CursorBackend::Sled => {
            let db = sled_store::open_database(config.cursor.path.as_deref())?;
            let store = SledStore::open(&db, &config.cursor.store_name)?;

            let mut registry = StoreRegistry::new();
            registry.register(store.name().to_string(), Arc::new(store));

            let key = config.cursor_key();
            tracing::info!(
                store = %config.cursor.store_name,
                key = %key,
                "Using persistent cursor store"
            );
            Ok(Arc::new(PersistentCursorStore::new(
                Arc::new(registry),
                config.cursor.store_name.clone(),
                key,
            )))
        }
    }
}

/// Whoami command
///
/// Logs in with the configured credentials and prints the identity the
/// token belongs to.
pub mod whoami {
    use super::*;
    use crate::auth::{AuthSession, Identity};

    /// Log in and print the identity
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration
    /// * `json` - Print JSON instead of plain text
    pub async fn run_whoami(config: &Config, json: bool) -> Result<()> {
        let http = http_client(config.timeout())?;
        let session = AuthSession::establish(http, &config.credentials()?, config.timeout()).await?;

        println!("{}", render_identity(session.identity(), &session.token().instance_url, json)?);
        Ok(())
    }

    pub(crate) fn render_identity(
        identity: &Identity,
        instance_url: &str,
        json: bool,
    ) -> Result<String> {
        if json {
            return Ok(serde_json::to_string_pretty(&serde_json::json!({
                "user_id": identity.user_id,
                "organization_id": identity.organization_id,
                "instance_url": instance_url,
            }))?);
        }
        Ok(format!(
            "User:         {}\nOrganization: {}\nInstance:     {}",
            identity.user_id, identity.organization_id, instance_url
        ))
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::test_utils::{mock_auth_server, test_config_yaml};

        #[test]
        fn test_render_identity_text() {
            let identity = Identity {
                user_id: "005xx".to_string(),
                organization_id: "00Dxx".to_string(),
            };
            let text = render_identity(&identity, "https://example.my.salesforce.com", false)
                .unwrap();
            assert!(text.contains("005xx"));
            assert!(text.contains("00Dxx"));
        }

        #[test]
        fn test_render_identity_json() {
            let identity = Identity {
                user_id: "005xx".to_string(),
                organization_id: "00Dxx".to_string(),
            };
            let rendered = render_identity(&identity, "https://i", true).unwrap();
            let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
            assert_eq!(value["organization_id"], "00Dxx");
        }

        #[tokio::test]
        async fn test_whoami_against_mock_server() {
            let server = mock_auth_server().await;
            let mut config: Config = serde_yaml::from_str(&test_config_yaml()).unwrap();
            config.auth.endpoint = server.uri();
            assert!(run_whoami(&config, true).await.is_ok());
        }

        #[tokio::test]
        async fn test_whoami_requires_client_id() {
            let mut config: Config = serde_yaml::from_str(&test_config_yaml()).unwrap();
            config.auth.client_id = String::new();
            assert!(run_whoami(&config, false).await.is_err());
        }
    }
}

/// Topic command
///
/// Resolves a topic and prints its permissions and schema id without
/// opening a subscription.
pub mod topic {
    use super::*;
    use crate::consumer::BrokerSession;
    use crate::pubsub::BrokerConnector;
    use crate::topic::{TopicDescriptor, TopicNegotiator};

    /// Resolve and print the configured topic
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration
    /// * `json` - Print JSON instead of plain text
    pub async fn run_topic(config: &Config, json: bool) -> Result<()> {
        let connector = grpc_connector(config);
        let descriptor = describe_topic(config, &connector).await?;
        println!("{}", render_topic(&descriptor, json)?);
        Ok(())
    }

    pub(crate) async fn describe_topic(
        config: &Config,
        connector: &dyn BrokerConnector,
    ) -> Result<TopicDescriptor> {
        let topic = config.require_topic()?;
        let http = http_client(config.timeout())?;
        let session =
            BrokerSession::establish(http, &config.credentials()?, connector, config.timeout())
                .await?;
        let descriptor = TopicNegotiator::new(session.api)
            .resolve(topic, config.timeout())
            .await?;
        Ok(descriptor)
    }

    pub(crate) fn render_topic(descriptor: &TopicDescriptor, json: bool) -> Result<String> {
        if json {
            return Ok(serde_json::to_string_pretty(descriptor)?);
        }
        Ok(format!(
            "Topic:         {}\nSchema:        {}\nTenant:        {}\nCan subscribe: {}\nCan publish:   {}",
            descriptor.name,
            descriptor.schema_id,
            descriptor.tenant_id,
            descriptor.can_subscribe,
            descriptor.can_publish
        ))
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{temp_dir, test_config_yaml};

    #[tokio::test]
    async fn test_memory_cursor_store_starts_empty() {
        let config: Config = serde_yaml::from_str(&test_config_yaml()).unwrap();
        let store = cursor_store(&config).unwrap();
        assert!(store.get().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sled_cursor_store_persists_under_topic_key() {
        let dir = temp_dir();
        let mut config: Config = serde_yaml::from_str(&test_config_yaml()).unwrap();
        config.cursor.backend = CursorBackend::Sled;
        config.cursor.path = Some(dir.path().join("cursors"));

        {
            let store = cursor_store(&config).unwrap();
            store.set(b"r42").await.unwrap();
        }

        let store = cursor_store(&config).unwrap();
        assert_eq!(store.get().await.unwrap(), Some(b"r42".to_vec()));
    }
}
