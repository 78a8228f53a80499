//! platform-events - Checkpointed consumer library for platform event streams
//!
//! This library authenticates against an OAuth server, subscribes to a
//! Pub/Sub API topic over gRPC, decodes Avro payloads into JSON, and
//! persists a replay cursor only after the caller confirms a batch.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `auth`: Credential exchange and identity lookup
//! - `pubsub`: Broker API seams, wire types, and the tonic transport
//! - `topic`: Topic resolution and permission checks
//! - `schema`: Schema cache and Avro decoding
//! - `cursor`: Replay cursor stores
//! - `subscription`: Fetch/commit checkpoint state machine
//! - `consumer`: Composition root and acknowledgment handle
//! - `publisher`: Single-event publishing
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use platform_events::config::Config;
//! use platform_events::consumer::Consumer;
//! use platform_events::cursor::MemoryCursorStore;
//! use platform_events::pubsub::GrpcConnector;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config: Config = serde_yaml::from_str(&std::fs::read_to_string("config.yaml")?)?;
//!     config.validate()?;
//!
//!     let connector = GrpcConnector::new(config.grpc_endpoint.clone(), config.timeout());
//!     let consumer = Consumer::connect(
//!         &config.consumer_settings()?,
//!         Arc::new(reqwest::Client::new()),
//!         &connector,
//!         Arc::new(MemoryCursorStore::new()),
//!     )
//!     .await?;
//!
//!     let (batch, ack) = consumer.read_batch().await?;
//!     for message in &batch {
//!         println!("{}", message.body);
//!     }
//!     ack.ack::<platform_events::Error>(Ok(())).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod cli;
pub mod commands;
pub mod config;
pub mod consumer;
pub mod cursor;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod publisher;
pub mod pubsub;
pub mod schema;
pub mod subscription;
pub mod topic;

// Re-export commonly used types
pub use config::Config;
pub use consumer::{AckHandle, Consumer, ConsumerSettings};
pub use error::{Error, Result};
pub use subscription::{DecodedMessage, MessageMetadata, ReplayStart};

#[cfg(test)]
pub mod test_utils;
