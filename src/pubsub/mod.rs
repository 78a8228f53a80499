//! Broker RPC abstraction and implementations
//!
//! This module defines the two seams every consumer component talks to:
//!
//! - [`PubSubApi`] -- unary calls (`GetTopic`, `GetSchema`, `Publish`) and
//!   the factory for the bidirectional subscription stream.
//! - [`FetchStream`] -- one open subscription stream: send a
//!   [`FetchRequest`], receive a [`FetchResponse`].
//!
//! Concrete implementations live in submodules:
//!
//! - [`grpc::GrpcBroker`] -- tonic client with auth metadata attached to
//!   every call.
//! - `fake::FakeBroker` -- in-process fake used in tests (cfg(test) only).
//!
//! Wire types are re-exported from [`proto`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::AuthSession;
use crate::error::Result;

pub mod grpc;
pub mod proto;

#[cfg(test)]
pub mod fake;

pub use grpc::{AuthInterceptor, GrpcBroker, GrpcConnector};
pub use proto::{
    ConsumerEvent, EventHeader, FetchRequest, FetchResponse, ProducerEvent, PublishRequest,
    PublishResponse, ReplayPreset, SchemaInfo, TopicInfo,
};

/// Unary broker calls plus the subscription stream factory.
///
/// Every unary call is bounded by the caller-supplied timeout and can be
/// cancelled independently by dropping its future.
#[async_trait::async_trait]
pub trait PubSubApi: Send + Sync + fmt::Debug {
    /// Fetches metadata for a topic.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::Transport`] if the call fails or
    /// [`crate::error::Error::Timeout`] if it does not complete in time.
    async fn get_topic(&self, topic_name: &str, timeout: Duration) -> Result<TopicInfo>;

    /// Fetches a schema definition by id.
    ///
    /// # Errors
    ///
    /// Same as [`PubSubApi::get_topic`].
    async fn get_schema(&self, schema_id: &str, timeout: Duration) -> Result<SchemaInfo>;

    /// Publishes a batch of producer events.
    ///
    /// # Errors
    ///
    /// Same as [`PubSubApi::get_topic`]. Per-event failures are reported
    /// inside the response, not as an error.
    async fn publish(&self, request: PublishRequest, timeout: Duration)
        -> Result<PublishResponse>;

    /// Opens a new bidirectional subscription stream.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::Transport`] if the stream cannot be
    /// opened.
    async fn subscribe(&self) -> Result<Box<dyn FetchStream>>;
}

/// One open subscription stream.
///
/// Requests and responses are strictly paired by the caller; the stream
/// itself does not enforce ordering.
#[async_trait::async_trait]
pub trait FetchStream: Send + fmt::Debug {
    /// Queues a fetch request on the stream.
    ///
    /// A stream that the server already terminated accepts the request
    /// silently; the termination is reported by the next [`Self::recv`].
    async fn send(&mut self, request: FetchRequest) -> Result<()>;

    /// Waits for the next response.
    ///
    /// Returns `Ok(None)` when the server closed the stream without an
    /// error (no data currently available). Cancel-safe: dropping the
    /// future before it resolves loses no response.
    async fn recv(&mut self) -> Result<Option<FetchResponse>>;

    /// Half-closes the request side of the stream.
    async fn close_send(&mut self) -> Result<()>;
}

/// Opens a broker client for an authenticated session.
#[async_trait::async_trait]
pub trait BrokerConnector: Send + Sync + fmt::Debug {
    /// Connects with the session's credentials attached to every call.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::Transport`] if the broker is
    /// unreachable.
    async fn connect(&self, session: &AuthSession) -> Result<Arc<dyn PubSubApi>>;
}
