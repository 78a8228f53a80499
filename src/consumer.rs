//! Consumer composition root
//!
//! [`Consumer::connect`] runs the full connect sequence once:
//!
//! 1. Log in and resolve the identity ([`AuthSession`]).
//! 2. Open a broker client for the session ([`BrokerConnector`]).
//! 3. Resolve the topic and fail fast without subscribe permission.
//! 4. Open the [`Subscription`] against the caller's cursor store.
//!
//! [`Consumer::read_batch`] hands out a batch together with an
//! [`AckHandle`]. Settling the handle with `Ok(())` commits the batch;
//! settling it with an error leaves the batch pending.
//!
//! The consumer never reconnects by itself. On a fatal error the caller
//! drops it and connects again with the same cursor store.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{info, instrument};

use crate::auth::{AuthSession, Credentials, Identity};
use crate::cursor::ReplayCursorStore;
use crate::error::{Error, Result};
use crate::pubsub::{BrokerConnector, PubSubApi};
use crate::schema::SchemaRegistryCache;
use crate::subscription::{DecodedMessage, ReplayStart, Subscription, SubscriptionOptions};
use crate::topic::{TopicDescriptor, TopicNegotiator};

/// Everything needed to connect a consumer.
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub credentials: Credentials,
    /// Topic to subscribe to
    pub topic: String,
    /// Events requested per fetch
    pub batch_size: i32,
    /// Bound on every network call
    pub timeout: Duration,
    /// Start position when no cursor is held
    pub start: ReplayStart,
    /// Cursor to use when the store holds none
    pub initial_replay_id: Option<Vec<u8>>,
}

/// Authenticated broker client without a subscription.
#[derive(Debug, Clone)]
pub struct BrokerSession {
    pub auth: AuthSession,
    pub api: Arc<dyn PubSubApi>,
}

impl BrokerSession {
    /// Logs in and opens a broker client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] if login fails, or the connector's error.
    pub async fn establish(
        http: Arc<reqwest::Client>,
        credentials: &Credentials,
        connector: &dyn BrokerConnector,
        timeout: Duration,
    ) -> Result<Self> {
        let auth = AuthSession::establish(http, credentials, timeout).await?;
        let api = connector.connect(&auth).await?;
        Ok(Self { auth, api })
    }
}

/// Connected, subscribed consumer.
pub struct Consumer {
    session: BrokerSession,
    topic: TopicDescriptor,
    schemas: Arc<SchemaRegistryCache>,
    subscription: Arc<Mutex<Subscription>>,
    timeout: Duration,
}

impl Consumer {
    /// Logs in, resolves the topic, and opens the subscription.
    ///
    /// # Errors
    ///
    /// - [`Error::Auth`] if login or identity lookup fails.
    /// - [`Error::Topic`] if the topic cannot be resolved.
    /// - [`Error::Permission`] if the topic is not subscribable; no stream
    ///   is opened.
    /// - Any error from [`Subscription::open`].
    #[instrument(skip_all, fields(topic = %settings.topic))]
    pub async fn connect(
        settings: &ConsumerSettings,
        http: Arc<reqwest::Client>,
        connector: &dyn BrokerConnector,
        store: Arc<dyn ReplayCursorStore>,
    ) -> Result<Self> {
        let session =
            BrokerSession::establish(http, &settings.credentials, connector, settings.timeout)
                .await?;

        let topic = TopicNegotiator::new(Arc::clone(&session.api))
            .resolve(&settings.topic, settings.timeout)
            .await?;
        topic.require_subscribe()?;

        let schemas = Arc::new(SchemaRegistryCache::new(
            Arc::clone(&session.api),
            settings.timeout,
        ));
        let options = SubscriptionOptions {
            topic: topic.name.clone(),
            batch_size: settings.batch_size,
            start: settings.start,
            initial_replay_id: settings.initial_replay_id.clone(),
        };
        let subscription =
            Subscription::open(session.api.as_ref(), store, Arc::clone(&schemas), options).await?;

        info!(
            organization_id = %session.auth.identity().organization_id,
            "Consumer connected"
        );

        Ok(Self {
            session,
            topic,
            schemas,
            subscription: Arc::new(Mutex::new(subscription)),
            timeout: settings.timeout,
        })
    }

    /// Reads the next batch.
    ///
    /// # Errors
    ///
    /// See [`Subscription::read_batch`].
    pub async fn read_batch(&self) -> Result<(Vec<DecodedMessage>, AckHandle)> {
        let batch = self
            .subscription
            .lock()
            .await
            .read_batch(self.timeout)
            .await?;
        let handle = AckHandle {
            subscription: Arc::clone(&self.subscription),
            events: batch.len(),
        };
        Ok((batch, handle))
    }

    /// Half-closes the subscription stream.
    pub async fn close(&self) -> Result<()> {
        self.subscription.lock().await.close().await
    }

    pub fn topic(&self) -> &TopicDescriptor {
        &self.topic
    }

    pub fn identity(&self) -> &Identity {
        self.session.auth.identity()
    }

    /// Broker session, for publishing on the same connection.
    pub fn session(&self) -> &BrokerSession {
        &self.session
    }

    pub fn schemas(&self) -> &Arc<SchemaRegistryCache> {
        &self.schemas
    }

    /// Last committed cursor.
    pub async fn current_replay_id(&self) -> Option<Vec<u8>> {
        self.subscription
            .lock()
            .await
            .current_replay_id()
            .map(<[u8]>::to_vec)
    }

    pub async fn is_batch_pending(&self) -> bool {
        self.subscription.lock().await.is_batch_pending()
    }

    /// Whether the broker ended the stream; the caller should reconnect.
    pub async fn is_stream_ended(&self) -> bool {
        self.subscription.lock().await.is_stream_ended()
    }
}

impl fmt::Debug for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("topic", &self.topic)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Acknowledgment for one batch. Consumed when settled.
#[must_use = "an unsettled batch stays pending and blocks further reads"]
pub struct AckHandle {
    subscription: Arc<Mutex<Subscription>>,
    events: usize,
}

impl AckHandle {
    /// Settles the batch with the pipeline's outcome.
    ///
    /// `Ok(())` commits the batch. An error leaves it pending and is
    /// returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns the pipeline's error, or the commit error converted into it.
    pub async fn ack<E>(self, outcome: std::result::Result<(), E>) -> std::result::Result<(), E>
    where
        E: From<Error>,
    {
        outcome?;
        self.subscription.lock().await.commit().await?;
        Ok(())
    }

    /// Number of events in the batch.
    pub fn len(&self) -> usize {
        self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events == 0
    }
}

impl fmt::Debug for AckHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AckHandle")
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{LoginMechanism, LOGIN_PATH};
    use crate::cursor::MemoryCursorStore;
    use crate::pubsub::fake::{fetch_response, FakeBroker, FakeConnector};
    use crate::test_utils::{
        mock_auth_server, order_broker, order_event, ORDER_SCHEMA_ID, ORDER_TOPIC,
    };
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(endpoint: &str, topic: &str) -> ConsumerSettings {
        ConsumerSettings {
            credentials: Credentials {
                mechanism: LoginMechanism::Password,
                endpoint: endpoint.to_string(),
                client_id: "cid".to_string(),
                client_secret: "secret".to_string(),
                username: "user@example.com".to_string(),
                password: "hunter2".to_string(),
            },
            topic: topic.to_string(),
            batch_size: 2,
            timeout: Duration::from_secs(1),
            start: ReplayStart::Earliest,
            initial_replay_id: None,
        }
    }

    async fn connect(
        server: &MockServer,
        broker: Arc<FakeBroker>,
        store: Arc<dyn ReplayCursorStore>,
        topic: &str,
    ) -> Result<Consumer> {
        Consumer::connect(
            &settings(&server.uri(), topic),
            Arc::new(reqwest::Client::new()),
            &FakeConnector::new(broker),
            store,
        )
        .await
    }

    #[tokio::test]
    async fn test_read_and_ack_commits() {
        let server = mock_auth_server().await;
        let broker = order_broker();
        let store = Arc::new(MemoryCursorStore::new());
        let consumer = connect(&server, broker.clone(), store.clone(), ORDER_TOPIC)
            .await
            .unwrap();

        assert_eq!(consumer.identity().organization_id, "00Dxx");
        assert_eq!(consumer.topic().schema_id, ORDER_SCHEMA_ID);

        broker.push_response(fetch_response(vec![
            order_event("O-1", b"r1"),
            order_event("O-2", b"r2"),
        ]));
        let (batch, ack) = consumer.read_batch().await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(ack.len(), 2);
        assert!(consumer.is_batch_pending().await);

        ack.ack::<Error>(Ok(())).await.unwrap();
        assert_eq!(store.get().await.unwrap(), Some(b"r2".to_vec()));
        assert_eq!(consumer.current_replay_id().await, Some(b"r2".to_vec()));
    }

    #[tokio::test]
    async fn test_nack_leaves_batch_pending() {
        let server = mock_auth_server().await;
        let broker = order_broker();
        let store = Arc::new(MemoryCursorStore::new());
        let consumer = connect(&server, broker.clone(), store.clone(), ORDER_TOPIC)
            .await
            .unwrap();

        broker.push_response(fetch_response(vec![order_event("O-1", b"r1")]));
        let (_, ack) = consumer.read_batch().await.unwrap();

        let err = ack
            .ack(Err(anyhow::anyhow!("sink unavailable")))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("sink unavailable"));
        assert_eq!(store.get().await.unwrap(), None);
        assert!(matches!(consumer.read_batch().await, Err(Error::State(_))));
    }

    #[tokio::test]
    async fn test_permission_denied_fails_fast() {
        let server = mock_auth_server().await;
        let broker = Arc::new(FakeBroker::new());
        broker.add_topic("/event/Locked__e", ORDER_SCHEMA_ID, false, true);

        let err = connect(
            &server,
            broker.clone(),
            Arc::new(MemoryCursorStore::new()),
            "/event/Locked__e",
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Permission(_)));
        assert_eq!(broker.subscribe_calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_topic_is_topic_error() {
        let server = mock_auth_server().await;
        let err = connect(
            &server,
            order_broker(),
            Arc::new(MemoryCursorStore::new()),
            "/event/Nope__e",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Topic(_)));
    }

    #[tokio::test]
    async fn test_login_failure_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOGIN_PATH))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let broker = order_broker();
        let err = connect(
            &server,
            broker.clone(),
            Arc::new(MemoryCursorStore::new()),
            ORDER_TOPIC,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Auth(_)));
        assert!(err.is_fatal());
        assert_eq!(broker.subscribe_calls(), 0);
    }

    #[tokio::test]
    async fn test_subscribe_failure_is_transport_error() {
        let server = mock_auth_server().await;
        let broker = order_broker();
        broker.fail_subscribe();

        let err = connect(&server, broker, Arc::new(MemoryCursorStore::new()), ORDER_TOPIC)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn test_reconnect_resumes_from_committed_cursor() {
        let server = mock_auth_server().await;
        let store: Arc<dyn ReplayCursorStore> = Arc::new(MemoryCursorStore::new());

        let broker = order_broker();
        let consumer = connect(&server, broker.clone(), store.clone(), ORDER_TOPIC)
            .await
            .unwrap();
        broker.push_response(fetch_response(vec![order_event("O-1", b"r1")]));
        let (_, ack) = consumer.read_batch().await.unwrap();
        ack.ack::<Error>(Ok(())).await.unwrap();
        consumer.close().await.unwrap();
        drop(consumer);

        let broker = order_broker();
        let consumer = connect(&server, broker.clone(), store, ORDER_TOPIC)
            .await
            .unwrap();
        broker.push_response(fetch_response(vec![]));
        let (batch, ack) = consumer.read_batch().await.unwrap();
        assert!(batch.is_empty());
        assert!(ack.is_empty());
        assert_eq!(broker.sent_requests()[0].replay_id, b"r1".to_vec());
    }
}
