//! Consume command
//!
//! Reads batches from the configured topic, writes each event to STDOUT as
//! one JSON line, and commits the batch once every line is written. A
//! batch that cannot be written is left uncommitted and is delivered again
//! after the next connect.
//!
//! The consumer itself never reconnects. This command owns the reconnect
//! loop: on a fatal error, a failed commit, or an ended stream it drops the
//! consumer, waits with exponential backoff, and connects again with the
//! same cursor store. A batch that fails to decode is retried on the same
//! consumer with the same backoff; it is never skipped.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng as _;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{Config, ReconnectConfig};
use crate::consumer::{Consumer, ConsumerSettings};
use crate::cursor::ReplayCursorStore;
use crate::error::{Error, Result};
use crate::pubsub::BrokerConnector;
use crate::subscription::DecodedMessage;

/// Totals reported when the command stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumeStats {
    /// Committed non-empty batches
    pub batches: u64,
    /// Events written and committed
    pub events: u64,
    /// Connects after the first one
    pub reconnects: u32,
}

/// What ended a connected session.
enum SessionEnd {
    /// Stop consuming altogether
    Stop,
    /// Drop the consumer and connect again
    Reconnect(String),
}

/// Reconnecting consume loop.
pub struct ConsumeLoop<'a> {
    pub settings: ConsumerSettings,
    pub reconnect: ReconnectConfig,
    pub http: Arc<reqwest::Client>,
    pub connector: &'a dyn BrokerConnector,
    pub store: Arc<dyn ReplayCursorStore>,
    /// Stop after this many committed non-empty batches
    pub max_batches: Option<u64>,
    pub shutdown: CancellationToken,
}

impl ConsumeLoop<'_> {
    /// Runs until shutdown, `max_batches`, or an unrecoverable error.
    ///
    /// # Errors
    ///
    /// Returns configuration, permission, topic, and state errors at once.
    /// Returns the last error when `reconnect.max_attempts` is exhausted.
    pub async fn run<W: Write>(&self, out: &mut W) -> Result<ConsumeStats> {
        let mut stats = ConsumeStats::default();
        let mut failures: u32 = 0;
        let mut connected_once = false;

        loop {
            if self.shutdown.is_cancelled() || self.limit_reached(&stats) {
                return Ok(stats);
            }

            let connect = Consumer::connect(
                &self.settings,
                Arc::clone(&self.http),
                self.connector,
                Arc::clone(&self.store),
            );
            let consumer = tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(stats),
                result = connect => result,
            };

            let consumer = match consumer {
                Ok(consumer) => {
                    if connected_once {
                        stats.reconnects += 1;
                    }
                    connected_once = true;
                    failures = 0;
                    consumer
                }
                Err(e) if is_unrecoverable(&e) => return Err(e),
                Err(e) => {
                    failures += 1;
                    self.back_off(failures, e, "Reconnecting").await?;
                    continue;
                }
            };

            match self.drain(&consumer, out, &mut stats).await? {
                SessionEnd::Stop => {
                    if let Err(e) = consumer.close().await {
                        debug!(error = %e, "Closing subscription failed");
                    }
                    return Ok(stats);
                }
                SessionEnd::Reconnect(reason) => {
                    drop(consumer);
                    failures += 1;
                    self.back_off(failures, Error::Transport(reason), "Reconnecting")
                        .await?;
                }
            }
        }
    }

    /// Reads and commits batches on one connected consumer.
    async fn drain<W: Write>(
        &self,
        consumer: &Consumer,
        out: &mut W,
        stats: &mut ConsumeStats,
    ) -> Result<SessionEnd> {
        let mut decode_failures: u32 = 0;
        loop {
            if self.limit_reached(stats) {
                return Ok(SessionEnd::Stop);
            }

            let read = tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(SessionEnd::Stop),
                result = consumer.read_batch() => result,
            };

            match read {
                Ok((batch, ack)) => {
                    decode_failures = 0;
                    let events = batch.len();
                    let written = write_batch(out, &batch);
                    if let Err(e) = ack.ack(written).await {
                        if let Error::Io(_) = e {
                            return Err(e);
                        }
                        warn!(error = %e, "Commit failed, batch will be redelivered");
                        return Ok(SessionEnd::Reconnect(e.to_string()));
                    }
                    if events > 0 {
                        stats.batches += 1;
                        stats.events += events as u64;
                        debug!(events, total = stats.events, "Batch committed");
                    }
                    if consumer.is_stream_ended().await {
                        return Ok(SessionEnd::Reconnect("stream ended by broker".to_string()));
                    }
                }
                Err(Error::Timeout(after)) => {
                    debug!(?after, "No events yet, waiting");
                }
                Err(e) if e.is_retryable_in_place() => {
                    decode_failures += 1;
                    self.back_off(decode_failures, e, "Batch not decoded, retrying")
                        .await?;
                }
                Err(e) if e.is_fatal() => {
                    warn!(error = %e, "Subscription failed");
                    return Ok(SessionEnd::Reconnect(e.to_string()));
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn limit_reached(&self, stats: &ConsumeStats) -> bool {
        self.max_batches
            .is_some_and(|max| stats.batches >= max)
    }

    /// Sleeps before retry `attempt`, or gives up with `cause`.
    async fn back_off(&self, attempt: u32, cause: Error, action: &str) -> Result<()> {
        if self.reconnect.max_attempts > 0 && attempt > self.reconnect.max_attempts {
            error!(attempts = attempt - 1, error = %cause, "Giving up");
            return Err(cause);
        }
        let delay = backoff_delay(&self.reconnect, attempt);
        warn!(attempt, ?delay, error = %cause, "{}", action);
        tokio::select! {
            _ = self.shutdown.cancelled() => {}
            _ = tokio::time::sleep(delay) => {}
        }
        Ok(())
    }
}

/// Permission, topic, configuration, and state errors do not heal by
/// reconnecting.
fn is_unrecoverable(error: &Error) -> bool {
    matches!(
        error,
        Error::Permission(_) | Error::Topic(_) | Error::Config(_) | Error::State(_)
    )
}

/// Exponential backoff with up to 25% random jitter.
pub(crate) fn backoff_delay(policy: &ReconnectConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let base = policy
        .initial_backoff_ms
        .saturating_mul(1u64 << exponent)
        .min(policy.max_backoff_ms);
    let jitter = rand::rng().random_range(0..=base / 4);
    Duration::from_millis(base.saturating_add(jitter).min(policy.max_backoff_ms))
}

/// Writes one JSON line per message and flushes.
fn write_batch<W: Write>(out: &mut W, batch: &[DecodedMessage]) -> Result<()> {
    for message in batch {
        serde_json::to_writer(&mut *out, message)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

/// Run the consume command against the configured broker
///
/// # Arguments
///
/// * `config` - Global configuration
/// * `max_batches` - Stop after this many committed batches
pub async fn run_consume(config: &Config, max_batches: Option<u64>) -> anyhow::Result<()> {
    let settings = config.consumer_settings()?;
    let store = super::cursor_store(config)?;
    let connector = super::grpc_connector(config);

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received interrupt signal (Ctrl+C)");
        }
        signal.cancel();
    });

    let consume = ConsumeLoop {
        settings,
        reconnect: config.reconnect.clone(),
        http: super::http_client(config.timeout())?,
        connector: &connector,
        store,
        max_batches,
        shutdown,
    };

    info!(topic = %config.topic, batch_size = config.batch_size, "Starting consumer");
    let mut stdout = std::io::stdout();
    let stats = consume.run(&mut stdout).await?;
    info!(
        batches = stats.batches,
        events = stats.events,
        reconnects = stats.reconnects,
        "Consumer stopped"
    );
    Ok(())
}
