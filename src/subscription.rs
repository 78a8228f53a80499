//! Subscription and checkpoint state machine
//!
//! A [`Subscription`] owns one open fetch stream and enforces the
//! single-in-flight-batch discipline:
//!
//! ```text
//!            read_batch (>= 1 event)
//!   Idle  ---------------------------->  BatchPending { replay_id }
//!    ^                                          |
//!    +------------- commit (store ok) ----------+
//! ```
//!
//! - `read_batch` while `BatchPending` fails with [`Error::State`].
//! - `commit` while `Idle` is a no-op.
//! - A failed `commit` leaves the batch pending so it can be retried.
//! - A decode failure aborts the whole batch; nothing becomes pending. The
//!   undecoded response is kept and the next read decodes it again instead
//!   of fetching past it.
//! - End of stream yields an empty batch, not an error.
//! - Any other stream failure poisons the subscription; the caller must
//!   reconnect. The cursor store stays usable.
//!
//! Fetch requests are strictly sequential. A read that times out after its
//! request went out leaves the response owed, and the next read waits for
//! that response instead of sending another request.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use crate::cursor::ReplayCursorStore;
use crate::error::{Error, Result};
use crate::metrics::{self, FetchTimer};
use crate::pubsub::{ConsumerEvent, FetchRequest, FetchResponse, FetchStream, PubSubApi, ReplayPreset};
use crate::schema::SchemaRegistryCache;

/// Where a subscription without a stored cursor starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayStart {
    /// Oldest retained event
    #[default]
    Earliest,
    /// Only events published after the subscription opens
    Latest,
    /// An explicit cursor, which must be stored or configured
    Custom,
}

impl ReplayStart {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Earliest => "earliest",
            Self::Latest => "latest",
            Self::Custom => "custom",
        }
    }

    /// Wire preset for this start position.
    pub fn preset(&self) -> ReplayPreset {
        match self {
            Self::Earliest => ReplayPreset::Earliest,
            Self::Latest => ReplayPreset::Latest,
            Self::Custom => ReplayPreset::Custom,
        }
    }
}

impl FromStr for ReplayStart {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "earliest" => Ok(Self::Earliest),
            "latest" => Ok(Self::Latest),
            "custom" => Ok(Self::Custom),
            other => Err(Error::Config(format!("unsupported replay preset: {other}"))),
        }
    }
}

impl fmt::Display for ReplayStart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of one subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionOptions {
    /// Topic to read
    pub topic: String,
    /// Events requested per fetch
    pub batch_size: i32,
    /// Start position when no cursor is held
    pub start: ReplayStart,
    /// Cursor to use when the store holds none
    pub initial_replay_id: Option<Vec<u8>>,
}

/// Checkpoint state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointState {
    /// No unconfirmed batch
    Idle,
    /// One unconfirmed batch; `replay_id` is that of its last event
    BatchPending { replay_id: Vec<u8> },
}

/// Per-message metadata forwarded with the decoded body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageMetadata {
    /// Position of this event in the stream
    #[serde(serialize_with = "serialize_base64")]
    pub replay_id: Vec<u8>,
    /// Schema the payload was decoded with
    pub schema_id: String,
    /// Producer-assigned event id
    pub event_id: String,
    /// Forwarded headers, in broker order
    #[serde(serialize_with = "serialize_headers")]
    pub headers: Vec<(String, Vec<u8>)>,
}

impl MessageMetadata {
    /// Raw value of the first header named `key`.
    pub fn header(&self, key: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }

    /// UTF-8 view of the first header named `key`.
    pub fn header_str(&self, key: &str) -> Option<Cow<'_, str>> {
        self.header(key).map(String::from_utf8_lossy)
    }

    /// Base64 rendering of the replay id.
    pub fn replay_id_base64(&self) -> String {
        BASE64.encode(&self.replay_id)
    }
}

/// Serializes bytes as a standard base64 string.
pub(crate) fn serialize_base64<S: serde::Serializer>(
    bytes: &[u8],
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&BASE64.encode(bytes))
}

fn serialize_headers<S: serde::Serializer>(
    headers: &[(String, Vec<u8>)],
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    use serde::ser::SerializeMap;
    let mut map = s.serialize_map(Some(headers.len()))?;
    for (key, value) in headers {
        map.serialize_entry(key, &String::from_utf8_lossy(value))?;
    }
    map.end()
}

/// One decoded event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedMessage {
    /// Decoded payload, always a JSON object
    pub body: JsonValue,
    pub metadata: MessageMetadata,
}

/// One open subscription stream plus its checkpoint.
///
/// Not safe for concurrent use; callers that share it must serialize
/// access.
pub struct Subscription {
    options: SubscriptionOptions,
    stream: Box<dyn FetchStream>,
    store: Arc<dyn ReplayCursorStore>,
    schemas: Arc<SchemaRegistryCache>,
    cursor: Option<Vec<u8>>,
    state: CheckpointState,
    awaiting_response: bool,
    retained: Option<FetchResponse>,
    stream_ended: bool,
    poisoned: bool,
    closed: bool,
}

impl Subscription {
    /// Loads the cursor and opens the stream.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] for a non-positive batch size, or a `Custom`
    ///   start with no stored or configured cursor.
    /// - The store's error if the cursor cannot be loaded.
    /// - [`Error::Transport`] if the stream cannot be opened.
    pub async fn open(
        api: &dyn PubSubApi,
        store: Arc<dyn ReplayCursorStore>,
        schemas: Arc<SchemaRegistryCache>,
        options: SubscriptionOptions,
    ) -> Result<Self> {
        if options.batch_size <= 0 {
            return Err(Error::Config(format!(
                "batch size must be positive, got {}",
                options.batch_size
            )));
        }

        let cursor = match store.get().await? {
            Some(stored) => Some(stored),
            None => options.initial_replay_id.clone(),
        };
        if options.start == ReplayStart::Custom && cursor.is_none() {
            return Err(Error::Config(
                "custom replay preset requires a stored or configured replay id".to_string(),
            ));
        }

        let stream = api.subscribe().await?;
        info!(
            topic = %options.topic,
            batch_size = options.batch_size,
            start = %options.start,
            resuming = cursor.is_some(),
            "Subscription opened"
        );

        Ok(Self {
            options,
            stream,
            store,
            schemas,
            cursor,
            state: CheckpointState::Idle,
            awaiting_response: false,
            retained: None,
            stream_ended: false,
            poisoned: false,
            closed: false,
        })
    }

    /// Fetches and decodes the next batch.
    ///
    /// On success with at least one event the subscription becomes
    /// [`CheckpointState::BatchPending`] until [`Self::commit`] succeeds.
    ///
    /// # Errors
    ///
    /// - [`Error::State`] if a batch is pending.
    /// - [`Error::Timeout`] if no response arrives within `timeout`; state
    ///   stays idle.
    /// - [`Error::Transport`] if the stream failed, now or earlier.
    /// - [`Error::Decode`] if any event fails to decode or its schema lookup
    ///   times out. No event is returned and the response is retained; the
    ///   next call decodes the same response again without a new fetch.
    pub async fn read_batch(&mut self, timeout: Duration) -> Result<Vec<DecodedMessage>> {
        if matches!(self.state, CheckpointState::BatchPending { .. }) {
            return Err(Error::State("unconfirmed batch outstanding".to_string()));
        }
        if self.closed {
            return Err(Error::Transport("subscription closed".to_string()));
        }
        if self.poisoned {
            return Err(Error::Transport(
                "stream unusable, reconnect required".to_string(),
            ));
        }

        let timer = FetchTimer::start(&self.options.topic);
        let response = match self.retained.take() {
            Some(response) => {
                debug!(topic = %self.options.topic, "Decoding retained response again");
                response
            }
            None => self.receive(timeout).await?,
        };

        let batch = match self.decode_response(&response).await {
            Ok(batch) => batch,
            Err(e) => {
                self.retained = Some(response);
                return Err(e);
            }
        };
        timer.record_batch(batch.len());

        if let Some(last) = batch.last() {
            self.state = CheckpointState::BatchPending {
                replay_id: last.metadata.replay_id.clone(),
            };
            debug!(
                topic = %self.options.topic,
                events = batch.len(),
                "Batch pending acknowledgment"
            );
        }
        Ok(batch)
    }

    /// Sends a fetch request unless a response is owed, then waits for it.
    ///
    /// End of stream comes back as an empty response.
    async fn receive(&mut self, timeout: Duration) -> Result<FetchResponse> {
        if !self.awaiting_response {
            let request = self.fetch_request();
            debug!(
                topic = %request.topic_name,
                num_requested = request.num_requested,
                preset = ReplayPreset::try_from(request.replay_preset)
                    .map(|p| p.as_str_name())
                    .unwrap_or("UNKNOWN"),
                "Sending fetch request"
            );
            if let Err(e) = self.stream.send(request).await {
                self.poisoned = true;
                return Err(e);
            }
            self.awaiting_response = true;
        } else {
            debug!(topic = %self.options.topic, "Awaiting response owed from previous fetch");
        }

        let response = match tokio::time::timeout(timeout, self.stream.recv()).await {
            Err(_) => {
                debug!(topic = %self.options.topic, ?timeout, "Fetch timed out");
                return Err(Error::Timeout(timeout));
            }
            Ok(Ok(Some(response))) => response,
            Ok(Ok(None)) => {
                self.awaiting_response = false;
                self.stream_ended = true;
                debug!(topic = %self.options.topic, "Stream ended with no data");
                return Ok(FetchResponse::default());
            }
            Ok(Err(e)) => {
                self.awaiting_response = false;
                self.poisoned = true;
                warn!(topic = %self.options.topic, error = %e, "Subscription stream failed");
                return Err(e);
            }
        };
        self.awaiting_response = false;
        Ok(response)
    }

    /// Persists the pending checkpoint.
    ///
    /// No-op when idle.
    ///
    /// # Errors
    ///
    /// Returns the store's error; the batch stays pending.
    pub async fn commit(&mut self) -> Result<()> {
        let replay_id = match &self.state {
            CheckpointState::Idle => return Ok(()),
            CheckpointState::BatchPending { replay_id } => replay_id.clone(),
        };

        if let Err(e) = self.store.set(&replay_id).await {
            metrics::record_commit(&self.options.topic, "error");
            warn!(topic = %self.options.topic, error = %e, "Commit failed, batch still pending");
            return Err(e);
        }

        metrics::record_commit(&self.options.topic, "ok");
        debug!(
            topic = %self.options.topic,
            replay_id = %BASE64.encode(&replay_id),
            "Committed replay cursor"
        );
        self.cursor = Some(replay_id);
        self.state = CheckpointState::Idle;
        Ok(())
    }

    /// Drops the pending batch without advancing the cursor.
    ///
    /// The dropped events are not fetched again on this stream; they are
    /// redelivered after a reconnect.
    pub fn reset(&mut self) {
        if let CheckpointState::BatchPending { .. } = self.state {
            warn!(topic = %self.options.topic, "Discarding unconfirmed batch");
            self.state = CheckpointState::Idle;
        }
    }

    /// Half-closes the stream. Further reads fail.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        info!(topic = %self.options.topic, "Closing subscription");
        self.stream.close_send().await
    }

    /// Last committed (or initially loaded) cursor.
    pub fn current_replay_id(&self) -> Option<&[u8]> {
        self.cursor.as_deref()
    }

    pub fn is_batch_pending(&self) -> bool {
        matches!(self.state, CheckpointState::BatchPending { .. })
    }

    pub fn state(&self) -> &CheckpointState {
        &self.state
    }

    /// Whether the broker closed the stream without error.
    pub fn is_stream_ended(&self) -> bool {
        self.stream_ended
    }

    pub fn options(&self) -> &SubscriptionOptions {
        &self.options
    }

    fn fetch_request(&self) -> FetchRequest {
        let (preset, replay_id) = match &self.cursor {
            Some(cursor) => (ReplayPreset::Custom, cursor.clone()),
            None => (self.options.start.preset(), Vec::new()),
        };
        FetchRequest {
            topic_name: self.options.topic.clone(),
            replay_preset: preset as i32,
            replay_id,
            num_requested: self.options.batch_size,
            auth_refresh: String::new(),
        }
    }

    async fn decode_response(&self, response: &FetchResponse) -> Result<Vec<DecodedMessage>> {
        let mut batch = Vec::with_capacity(response.events.len());
        for ConsumerEvent { event, replay_id } in &response.events {
            let event = event.as_ref().ok_or_else(|| {
                Error::Decode(format!(
                    "event with replay id {} carries no payload",
                    BASE64.encode(replay_id)
                ))
            })?;

            let decoder = self
                .schemas
                .fetch(&event.schema_id)
                .await
                .map_err(|e| match e {
                    Error::Timeout(after) => Error::Decode(format!(
                        "schema {} lookup timed out after {:?}",
                        event.schema_id, after
                    )),
                    other => other,
                })?;
            let body = decoder.decode(&event.payload).map_err(|e| {
                metrics::record_decode_error(&event.schema_id);
                warn!(schema_id = %event.schema_id, event_id = %event.id, error = %e, "Batch not decoded");
                e
            })?;

            batch.push(DecodedMessage {
                body,
                metadata: MessageMetadata {
                    replay_id: replay_id.clone(),
                    schema_id: event.schema_id.clone(),
                    event_id: event.id.clone(),
                    headers: event
                        .headers
                        .iter()
                        .map(|h| (h.key.clone(), h.value.clone()))
                        .collect(),
                },
            });
        }
        Ok(batch)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("options", &self.options)
            .field("state", &self.state)
            .field("awaiting_response", &self.awaiting_response)
            .field("retained", &self.retained.is_some())
            .field("poisoned", &self.poisoned)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}
