use std::time::Duration;

/// Tuning knobs for one [`crate::pipeline::Pipeline`]. Defaults match
/// the reference values: a 1000-record buffer, 100-record batches,
/// and a 1 second flush tick.
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// Capacity of the bounded channel between producers and the flusher.
    pub buffer_size: usize,
    /// Maximum number of records accumulated before a batch is flushed
    /// early, regardless of the flush tick.
    pub batch_size: usize,
    /// Upper bound on how long a partial batch sits before being
    /// flushed anyway.
    pub flush_interval: Duration,
}

impl PipelineConfig {
    pub const DEFAULT_BUFFER_SIZE: usize = 1000;
    pub const DEFAULT_BATCH_SIZE: usize = 100;
    pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

    pub fn new(buffer_size: usize, batch_size: usize, flush_interval: Duration) -> Self {
        Self {
            buffer_size,
            batch_size,
            flush_interval,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            buffer_size: Self::DEFAULT_BUFFER_SIZE,
            batch_size: Self::DEFAULT_BATCH_SIZE,
            flush_interval: Self::DEFAULT_FLUSH_INTERVAL,
        }
    }
}
