//! Consumer metrics
//!
//! Thin wrappers over the `metrics` facade. Nothing is exported unless the
//! host process installs a recorder.
//!
//! # Metrics
//!
//! - `platform_events_batches_total`: Counter of non-empty batches read
//! - `platform_events_events_total`: Counter of decoded events
//! - `platform_events_commits_total`: Counter of cursor commits by `result`
//! - `platform_events_schema_fetches_total`: Counter of schema lookups by
//!   `source` (`cache` or `remote`)
//! - `platform_events_decode_errors_total`: Counter of payload decode failures
//! - `platform_events_fetch_duration_seconds`: Histogram of fetch round trips
//!
//! # Examples
//!
//! ```
//! use platform_events::metrics::FetchTimer;
//!
//! let timer = FetchTimer::start("/event/Order__e");
//! timer.record_batch(3);
//! ```

use std::time::Instant;

use metrics::{counter, histogram, increment_counter};

/// Times one fetch round trip and records the batch it produced.
#[derive(Debug)]
pub struct FetchTimer {
    topic: String,
    start: Instant,
}

impl FetchTimer {
    /// Starts timing a fetch on `topic`.
    pub fn start(topic: &str) -> Self {
        Self {
            topic: topic.to_string(),
            start: Instant::now(),
        }
    }

    /// Records the round trip and, for a non-empty batch, its size.
    pub fn record_batch(self, events: usize) {
        histogram!(
            "platform_events_fetch_duration_seconds",
            self.start.elapsed().as_secs_f64(),
            "topic" => self.topic.clone()
        );

        if events > 0 {
            increment_counter!("platform_events_batches_total", "topic" => self.topic.clone());
            counter!("platform_events_events_total", events as u64, "topic" => self.topic);
        }
    }
}

/// Records a commit attempt; `result` is `ok` or `error`.
pub fn record_commit(topic: &str, result: &str) {
    increment_counter!(
        "platform_events_commits_total",
        "topic" => topic.to_string(),
        "result" => result.to_string()
    );
}

/// Records where a schema lookup was served from.
pub fn record_schema_fetch(source: &'static str) {
    increment_counter!("platform_events_schema_fetches_total", "source" => source);
}

/// Records a payload that failed to decode.
pub fn record_decode_error(schema_id: &str) {
    increment_counter!(
        "platform_events_decode_errors_total",
        "schema_id" => schema_id.to_string()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        let timer = FetchTimer::start("/event/Test__e");
        timer.record_batch(2);
        FetchTimer::start("/event/Test__e").record_batch(0);
        record_commit("/event/Test__e", "ok");
        record_schema_fetch("cache");
        record_decode_error("schema-1");
    }
}
