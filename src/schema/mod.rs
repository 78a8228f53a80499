//! Schema registry cache
//!
//! [`SchemaRegistryCache`] resolves schema ids to [`SchemaDecoder`]s through
//! the broker's `GetSchema` call and keeps every decoder it has built for
//! the lifetime of the cache. Lookups are read-through and single-flight per
//! schema id: concurrent first lookups of the same id share one remote call
//! and observe the same decoder. A failed lookup is not cached.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, instrument};

use crate::error::Result;
use crate::metrics;
use crate::pubsub::PubSubApi;

pub mod decoder;

pub use decoder::SchemaDecoder;

type Slot = Arc<OnceCell<Arc<SchemaDecoder>>>;

/// Additive, single-flight cache of schema decoders.
#[derive(Debug)]
pub struct SchemaRegistryCache {
    api: Arc<dyn PubSubApi>,
    timeout: Duration,
    slots: Mutex<HashMap<String, Slot>>,
}

impl SchemaRegistryCache {
    /// Creates an empty cache that fetches through `api`, bounding each
    /// remote lookup by `timeout`.
    pub fn new(api: Arc<dyn PubSubApi>, timeout: Duration) -> Self {
        Self {
            api,
            timeout,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the decoder for `schema_id`, fetching it on first use.
    ///
    /// # Errors
    ///
    /// Returns the broker error (usually [`crate::error::Error::Transport`]
    /// or [`crate::error::Error::Timeout`]) or [`crate::error::Error::Decode`]
    /// for an unparseable definition. The next call retries.
    #[instrument(skip(self))]
    pub async fn fetch(&self, schema_id: &str) -> Result<Arc<SchemaDecoder>> {
        let slot = {
            let mut slots = self.slots.lock().await;
            Arc::clone(slots.entry(schema_id.to_string()).or_default())
        };

        if let Some(decoder) = slot.get() {
            metrics::record_schema_fetch("cache");
            return Ok(Arc::clone(decoder));
        }

        let decoder = slot
            .get_or_try_init(|| async {
                metrics::record_schema_fetch("remote");
                let info = self.api.get_schema(schema_id, self.timeout).await?;
                debug!(schema_id = %schema_id, "Fetched schema");
                SchemaDecoder::parse(schema_id, &info.schema_json).map(Arc::new)
            })
            .await?;

        Ok(Arc::clone(decoder))
    }

    /// Number of schema ids with a resolved decoder.
    pub async fn len(&self) -> usize {
        let slots = self.slots.lock().await;
        slots.values().filter(|slot| slot.initialized()).count()
    }

    /// Whether no decoder has been resolved yet.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
