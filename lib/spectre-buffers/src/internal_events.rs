use std::sync::atomic::{AtomicI64, Ordering};

use metrics::{counter, gauge};
use spectre_common::InternalEvent;

/// Live queue-depth counter for one pipeline, updated on every enqueue
/// and dequeue. A plain `AtomicI64` rather than sampling the channel,
/// matching the "updated on send and receive" wording of the metrics
/// contract rather than a periodic poll.
#[derive(Debug)]
pub struct QueueDepth {
    integration: String,
    value: AtomicI64,
}

impl QueueDepth {
    pub fn new(integration: impl Into<String>) -> Self {
        Self {
            integration: integration.into(),
            value: AtomicI64::new(0),
        }
    }

    pub fn incremented(&self) {
        let v = self.value.fetch_add(1, Ordering::SeqCst) + 1;
        self.publish(v);
    }

    pub fn decremented(&self, by: usize) {
        let v = self
            .value
            .fetch_sub(by as i64, Ordering::SeqCst)
            .saturating_sub(by as i64);
        self.publish(v);
    }

    pub fn current(&self) -> i64 {
        self.value.load(Ordering::SeqCst)
    }

    fn publish(&self, value: i64) {
        gauge!("queue_depth", "integration" => self.integration.clone())
            .set(value.max(0) as f64);
    }
}

pub struct BatchFlushed {
    pub integration: String,
    pub count: usize,
}

impl InternalEvent for BatchFlushed {
    fn emit(self) {
        tracing::debug!(integration = %self.integration, count = self.count, "flushed ingest batch");
        counter!("batches_total", "integration" => self.integration).increment(self.count as u64);
    }
}

pub struct FlushFailed {
    pub integration: String,
    pub error: String,
}

impl InternalEvent for FlushFailed {
    fn emit(self) {
        tracing::warn!(
            integration = %self.integration,
            error = %self.error,
            "ingest batch flush failed, will retry on the next batch"
        );
        counter!("errors_total", "integration" => self.integration).increment(1);
    }
}
