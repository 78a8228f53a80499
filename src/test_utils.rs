//! Test utilities for platform-events
//!
//! Shared fixtures: a representative platform event schema, payload
//! encoders for it, temporary directories, and assertion helpers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use apache_avro::types::Value as AvroValue;
use apache_avro::{to_avro_datum, Schema};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::auth::{LOGIN_PATH, USER_INFO_PATH};
use crate::cursor::{MemoryCursorStore, ReplayCursorStore};
use crate::error::{Error, Result};
use crate::pubsub::fake::{consumer_event, FakeBroker};
use crate::pubsub::ConsumerEvent;
use crate::schema::SchemaRegistryCache;
use crate::subscription::{ReplayStart, Subscription, SubscriptionOptions};

/// Schema id under which [`ORDER_SCHEMA`] is registered in fixtures.
pub const ORDER_SCHEMA_ID: &str = "order-v1";

/// Topic name used by fixtures.
pub const ORDER_TOPIC: &str = "/event/Order_Event__e";

/// Avro schema shaped like a platform event.
pub const ORDER_SCHEMA: &str = r#"{
  "type": "record",
  "name": "Order_Event__e",
  "namespace": "com.sforce.eventbus",
  "fields": [
    {"name": "CreatedDate", "type": "long"},
    {"name": "CreatedById", "type": "string"},
    {"name": "OrderNumber__c", "type": "string"},
    {"name": "Quantity__c", "type": "int"},
    {"name": "Note__c", "type": ["null", "string"], "default": null}
  ]
}"#;

/// Create a temporary directory for testing
pub fn temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temporary directory")
}

/// Encodes an order event payload against [`ORDER_SCHEMA`].
pub fn encode_order(order_number: &str, quantity: i32, note: Option<&str>) -> Vec<u8> {
    let schema = Schema::parse_str(ORDER_SCHEMA).expect("fixture schema parses");
    let note = match note {
        Some(text) => AvroValue::Union(1, Box::new(AvroValue::String(text.to_string()))),
        None => AvroValue::Union(0, Box::new(AvroValue::Null)),
    };
    let record = AvroValue::Record(vec![
        ("CreatedDate".to_string(), AvroValue::Long(1_700_000_000_000)),
        ("CreatedById".to_string(), AvroValue::String("005xx".to_string())),
        (
            "OrderNumber__c".to_string(),
            AvroValue::String(order_number.to_string()),
        ),
        ("Quantity__c".to_string(), AvroValue::Int(quantity)),
        ("Note__c".to_string(), note),
    ]);
    to_avro_datum(&schema, record).expect("fixture record encodes")
}

/// A well-formed order event with the given replay id.
pub fn order_event(order_number: &str, replay_id: &[u8]) -> ConsumerEvent {
    consumer_event(
        &format!("evt-{order_number}"),
        ORDER_SCHEMA_ID,
        encode_order(order_number, 1, None),
        replay_id,
    )
}

/// A fake broker with [`ORDER_TOPIC`] and [`ORDER_SCHEMA`] registered.
pub fn order_broker() -> Arc<FakeBroker> {
    let broker = Arc::new(FakeBroker::new());
    broker.add_topic(ORDER_TOPIC, ORDER_SCHEMA_ID, true, true);
    broker.add_schema(ORDER_SCHEMA_ID, ORDER_SCHEMA);
    broker
}

/// OAuth server that accepts any login for org `00Dxx`.
pub async fn mock_auth_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(LOGIN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "00Dxx!token",
            "instance_url": "https://example.my.salesforce.com"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(USER_INFO_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "user_id": "005xx",
            "organization_id": "00Dxx"
        })))
        .mount(&server)
        .await;
    server
}

/// Subscription options for [`ORDER_TOPIC`].
pub fn order_options(batch_size: i32, start: ReplayStart) -> SubscriptionOptions {
    SubscriptionOptions {
        topic: ORDER_TOPIC.to_string(),
        batch_size,
        start,
        initial_replay_id: None,
    }
}

/// Cursor store whose backend can be switched off.
#[derive(Debug, Default)]
pub struct FlakyCursorStore {
    inner: MemoryCursorStore,
    pub unavailable: AtomicBool,
}

#[async_trait::async_trait]
impl ReplayCursorStore for FlakyCursorStore {
    async fn get(&self) -> Result<Option<Vec<u8>>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::Storage("cursor store unavailable".to_string()));
        }
        self.inner.get().await
    }

    async fn set(&self, replay_id: &[u8]) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::Storage("cursor store unavailable".to_string()));
        }
        self.inner.set(replay_id).await
    }
}

/// Opens a subscription on `broker` backed by `store`.
pub async fn open_subscription(
    broker: Arc<FakeBroker>,
    store: Arc<dyn ReplayCursorStore>,
    options: SubscriptionOptions,
) -> Subscription {
    let schemas = Arc::new(SchemaRegistryCache::new(
        broker.clone(),
        Duration::from_secs(1),
    ));
    Subscription::open(broker.as_ref(), store, schemas, options)
        .await
        .expect("subscription opens")
}

/// Assert that an error contains the expected message
///
/// # Panics
///
/// Panics if the result is Ok or if the error doesn't contain the expected message
pub fn assert_error_contains<T>(result: Result<T>, expected: &str) {
    match result {
        Ok(_) => panic!("Expected error containing '{}' but got Ok", expected),
        Err(e) => {
            let error_msg = e.to_string();
            assert!(
                error_msg.contains(expected),
                "Error message '{}' does not contain '{}'",
                error_msg,
                expected
            );
        }
    }
}

/// Create a test configuration YAML string
pub fn test_config_yaml() -> String {
    r#"
topic: /event/Order_Event__e
grpc_endpoint: localhost:7011
batch_size: 10
timeout_seconds: 3
replay_preset: earliest
auth:
  mechanism: password
  endpoint: http://localhost:8080
  client_id: test-client
  client_secret: test-secret
  username: user@example.com
  password: hunter2
cursor:
  backend: memory
logging:
  level: debug
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_temp_dir_creation() {
        let dir = temp_dir();
        assert!(dir.path().exists());
    }

    #[test]
    fn test_encode_order_is_decodable() {
        let payload = encode_order("O-1", 2, Some("gift"));
        let schema = Schema::parse_str(ORDER_SCHEMA).unwrap();
        let value = apache_avro::from_avro_datum(&schema, &mut payload.as_slice(), None).unwrap();
        assert!(matches!(value, AvroValue::Record(_)));
    }

    #[test]
    fn test_assert_error_contains_success() {
        let result: Result<()> = Err(Error::Config("test error message".to_string()));
        assert_error_contains(result, "test error");
    }

    #[test]
    #[should_panic(expected = "Expected error containing")]
    fn test_assert_error_contains_ok() {
        let result: Result<()> = Ok(());
        assert_error_contains(result, "error");
    }

    #[test]
    fn test_test_config_yaml() {
        let config: Config = serde_yaml::from_str(&test_config_yaml()).unwrap();
        assert_eq!(config.topic, ORDER_TOPIC);
        assert!(config.validate().is_ok());
    }
}
