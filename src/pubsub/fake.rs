//! In-process fake broker for unit tests
//!
//! [`FakeBroker`] implements [`PubSubApi`] from in-memory tables and a
//! scripted reply queue, so subscription and consumer tests run without a
//! network.
//!
//! # Usage
//!
//! - Register topics and schemas with [`FakeBroker::add_topic`] and
//!   [`FakeBroker::add_schema`].
//! - Script what the subscription stream yields with
//!   [`FakeBroker::push_response`], [`FakeBroker::push_end_of_stream`] and
//!   [`FakeBroker::push_error`]. Replies may be pushed before or after the
//!   stream is opened.
//! - Inspect what the client sent with [`FakeBroker::sent_requests`].
//!
//! ```text
//! stream send() -----> sent (test reads via sent_requests())
//! push_*()      -----> replies_tx -----> replies_rx (stream recv())
//! ```
//!
//! A stream with no queued reply blocks in `recv()`, which is how tests
//! exercise timeouts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tonic::Status;

use super::proto::{
    ConsumerEvent, EventHeader, FetchRequest, FetchResponse, ProducerEvent, PublishRequest,
    PublishResponse, PublishResult, SchemaInfo, TopicInfo,
};
use super::{BrokerConnector, FetchStream, PubSubApi};
use crate::auth::AuthSession;
use crate::error::{Error, Result};

/// One scripted reply on the subscription stream.
#[derive(Debug)]
pub enum FakeReply {
    /// A fetch response
    Response(FetchResponse),
    /// Server closed the stream without error
    EndOfStream,
    /// Server failed the stream
    Error(Status),
}

/// In-memory [`PubSubApi`] implementation.
#[derive(Debug)]
pub struct FakeBroker {
    topics: StdMutex<HashMap<String, TopicInfo>>,
    schemas: StdMutex<HashMap<String, String>>,
    schema_delay: StdMutex<Duration>,
    schema_calls: AtomicUsize,
    subscribe_calls: AtomicUsize,
    fail_subscribe: StdMutex<bool>,
    published: StdMutex<Vec<PublishRequest>>,
    replies_tx: mpsc::UnboundedSender<FakeReply>,
    replies_rx: Arc<Mutex<mpsc::UnboundedReceiver<FakeReply>>>,
    sent: Arc<StdMutex<Vec<FetchRequest>>>,
}

impl Default for FakeBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBroker {
    /// Creates an empty broker.
    pub fn new() -> Self {
        let (replies_tx, replies_rx) = mpsc::unbounded_channel();
        Self {
            topics: StdMutex::new(HashMap::new()),
            schemas: StdMutex::new(HashMap::new()),
            schema_delay: StdMutex::new(Duration::ZERO),
            schema_calls: AtomicUsize::new(0),
            subscribe_calls: AtomicUsize::new(0),
            fail_subscribe: StdMutex::new(false),
            published: StdMutex::new(Vec::new()),
            replies_tx,
            replies_rx: Arc::new(Mutex::new(replies_rx)),
            sent: Arc::new(StdMutex::new(Vec::new())),
        }
    }

    /// Registers a topic.
    pub fn add_topic(&self, name: &str, schema_id: &str, can_subscribe: bool, can_publish: bool) {
        self.topics.lock().unwrap().insert(
            name.to_string(),
            TopicInfo {
                topic_name: name.to_string(),
                tenant_guid: "00Dxx".to_string(),
                can_publish,
                can_subscribe,
                schema_id: schema_id.to_string(),
                rpc_id: "rpc-topic".to_string(),
            },
        );
    }

    /// Registers a schema definition.
    pub fn add_schema(&self, schema_id: &str, schema_json: &str) {
        self.schemas
            .lock()
            .unwrap()
            .insert(schema_id.to_string(), schema_json.to_string());
    }

    /// Delays every `get_schema` call.
    pub fn set_schema_delay(&self, delay: Duration) {
        *self.schema_delay.lock().unwrap() = delay;
    }

    /// Makes `subscribe` fail.
    pub fn fail_subscribe(&self) {
        *self.fail_subscribe.lock().unwrap() = true;
    }

    /// Queues a fetch response.
    pub fn push_response(&self, response: FetchResponse) {
        let _ = self.replies_tx.send(FakeReply::Response(response));
    }

    /// Queues a clean end-of-stream.
    pub fn push_end_of_stream(&self) {
        let _ = self.replies_tx.send(FakeReply::EndOfStream);
    }

    /// Queues a stream failure.
    pub fn push_error(&self, status: Status) {
        let _ = self.replies_tx.send(FakeReply::Error(status));
    }

    /// Every fetch request sent so far, oldest first.
    pub fn sent_requests(&self) -> Vec<FetchRequest> {
        self.sent.lock().unwrap().clone()
    }

    /// Number of `get_schema` calls received.
    pub fn schema_calls(&self) -> usize {
        self.schema_calls.load(Ordering::SeqCst)
    }

    /// Number of streams opened.
    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    /// Every publish request received so far.
    pub fn published(&self) -> Vec<PublishRequest> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl PubSubApi for FakeBroker {
    async fn get_topic(&self, topic_name: &str, _timeout: Duration) -> Result<TopicInfo> {
        self.topics
            .lock()
            .unwrap()
            .get(topic_name)
            .cloned()
            .ok_or_else(|| Status::not_found(format!("topic {topic_name} not found")).into())
    }

    async fn get_schema(&self, schema_id: &str, timeout: Duration) -> Result<SchemaInfo> {
        self.schema_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.schema_delay.lock().unwrap();
        if delay > timeout {
            tokio::time::sleep(timeout).await;
            return Err(Error::Timeout(timeout));
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let schema_json = self
            .schemas
            .lock()
            .unwrap()
            .get(schema_id)
            .cloned()
            .ok_or_else(|| Error::from(Status::not_found(format!("schema {schema_id}"))))?;

        Ok(SchemaInfo {
            schema_json,
            schema_id: schema_id.to_string(),
            rpc_id: "rpc-schema".to_string(),
        })
    }

    async fn publish(
        &self,
        request: PublishRequest,
        _timeout: Duration,
    ) -> Result<PublishResponse> {
        let results = request
            .events
            .iter()
            .enumerate()
            .map(|(i, event)| PublishResult {
                replay_id: format!("pub-{i}").into_bytes(),
                error: None,
                correlation_key: event.id.clone(),
            })
            .collect();
        let schema_id = request
            .events
            .first()
            .map(|e| e.schema_id.clone())
            .unwrap_or_default();
        self.published.lock().unwrap().push(request);

        Ok(PublishResponse {
            results,
            schema_id,
            rpc_id: "rpc-publish".to_string(),
        })
    }

    async fn subscribe(&self) -> Result<Box<dyn FetchStream>> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_subscribe.lock().unwrap() {
            return Err(Status::unavailable("broker unavailable").into());
        }
        Ok(Box::new(FakeFetchStream {
            replies: Arc::clone(&self.replies_rx),
            sent: Arc::clone(&self.sent),
            send_closed: false,
        }))
    }
}

/// Stream half of [`FakeBroker`].
#[derive(Debug)]
pub struct FakeFetchStream {
    replies: Arc<Mutex<mpsc::UnboundedReceiver<FakeReply>>>,
    sent: Arc<StdMutex<Vec<FetchRequest>>>,
    send_closed: bool,
}

#[async_trait::async_trait]
impl FetchStream for FakeFetchStream {
    async fn send(&mut self, request: FetchRequest) -> Result<()> {
        if self.send_closed {
            return Err(Error::Transport("request side already closed".to_string()));
        }
        self.sent.lock().unwrap().push(request);
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<FetchResponse>> {
        let mut replies = self.replies.lock().await;
        match replies.recv().await {
            Some(FakeReply::Response(response)) => Ok(Some(response)),
            Some(FakeReply::EndOfStream) | None => Ok(None),
            Some(FakeReply::Error(status)) => Err(status.into()),
        }
    }

    async fn close_send(&mut self) -> Result<()> {
        self.send_closed = true;
        Ok(())
    }
}

/// [`BrokerConnector`] that hands out the same [`FakeBroker`] on every
/// connect.
#[derive(Debug)]
pub struct FakeConnector {
    broker: Arc<FakeBroker>,
    connects: AtomicUsize,
}

impl FakeConnector {
    pub fn new(broker: Arc<FakeBroker>) -> Self {
        Self {
            broker,
            connects: AtomicUsize::new(0),
        }
    }

    /// Number of connects so far.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl BrokerConnector for FakeConnector {
    async fn connect(&self, _session: &AuthSession) -> Result<Arc<dyn PubSubApi>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.broker.clone())
    }
}

/// Builds a consumer event.
pub fn consumer_event(
    event_id: &str,
    schema_id: &str,
    payload: Vec<u8>,
    replay_id: &[u8],
) -> ConsumerEvent {
    ConsumerEvent {
        event: Some(ProducerEvent {
            id: event_id.to_string(),
            schema_id: schema_id.to_string(),
            payload,
            headers: vec![EventHeader {
                key: "source".to_string(),
                value: b"fake".to_vec(),
            }],
        }),
        replay_id: replay_id.to_vec(),
    }
}

/// Builds a fetch response whose latest replay id is that of the last
/// event (or empty).
pub fn fetch_response(events: Vec<ConsumerEvent>) -> FetchResponse {
    let latest_replay_id = events
        .last()
        .map(|e| e.replay_id.clone())
        .unwrap_or_default();
    FetchResponse {
        events,
        latest_replay_id,
        rpc_id: "rpc-fetch".to_string(),
        pending_num_requested: 0,
    }
}
