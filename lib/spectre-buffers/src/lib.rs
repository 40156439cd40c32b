//! The per-integration backpressure-aware ingestion pipeline: a
//! bounded channel between producers and a single flusher task, batch
//! flushing by size or tick, and deadline-bounded graceful shutdown.
//! This crate has no notion of what a "record" or "integration" is
//! beyond `Send + 'static`; the binary crate supplies `LogRecord` and
//! wires a concrete [`pipeline::BatchSink`] per integration kind.

pub mod config;
pub mod internal_events;
pub mod pipeline;

pub use config::PipelineConfig;
pub use pipeline::{BatchSink, Pipeline, PipelineError};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct CountingSink {
        batches: AtomicUsize,
        items: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl BatchSink<u32> for CountingSink {
        type Error = std::convert::Infallible;

        async fn ingest_batch(&self, batch: Vec<u32>) -> Result<(), Self::Error> {
            self.batches.fetch_add(1, Ordering::SeqCst);
            self.items.fetch_add(batch.len(), Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn flushes_on_batch_size() {
        tokio::time::pause();
        let sink = Arc::new(CountingSink {
            batches: AtomicUsize::new(0),
            items: AtomicUsize::new(0),
        });
        let config = PipelineConfig::new(100, 10, Duration::from_secs(60));
        let pipeline = Pipeline::start("test", config, Arc::clone(&sink));

        for i in 0..25u32 {
            pipeline.ingest(i).await.unwrap();
        }

        // Advance virtual time to let the flusher task drain the
        // size-triggered batches it already has enough items for.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sink.items.load(Ordering::SeqCst), 20);
        assert_eq!(sink.batches.load(Ordering::SeqCst), 2);

        pipeline.stop(Duration::from_secs(1)).await.unwrap();
        assert_eq!(sink.items.load(Ordering::SeqCst), 25);
        assert_eq!(sink.batches.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn flushes_on_tick_and_on_stop() {
        tokio::time::pause();
        let sink = Arc::new(CountingSink {
            batches: AtomicUsize::new(0),
            items: AtomicUsize::new(0),
        });
        let config = PipelineConfig::new(100, 1000, Duration::from_millis(20));
        let pipeline = Pipeline::start("test", config, Arc::clone(&sink));

        pipeline.ingest(1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(sink.items.load(Ordering::SeqCst), 1);

        pipeline.stop(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn ingest_after_stop_is_rejected() {
        let sink = Arc::new(CountingSink {
            batches: AtomicUsize::new(0),
            items: AtomicUsize::new(0),
        });
        let pipeline = Pipeline::start("test", PipelineConfig::default(), sink);
        pipeline.stop(Duration::from_secs(1)).await.unwrap();

        let result = pipeline.ingest(1).await;
        assert_eq!(result, Err(PipelineError::Stopped));
    }

    struct SlowSink {
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl BatchSink<u32> for SlowSink {
        type Error = std::convert::Infallible;

        async fn ingest_batch(&self, _batch: Vec<u32>) -> Result<(), Self::Error> {
            tokio::time::sleep(self.delay).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn stop_with_zero_deadline_times_out_under_slow_backend() {
        tokio::time::pause();
        let sink = Arc::new(SlowSink {
            delay: Duration::from_millis(200),
        });
        let config = PipelineConfig::new(10, 1, Duration::from_millis(10));
        let pipeline = Pipeline::start("test", config, sink);
        pipeline.ingest(1).await.unwrap();
        // Advance virtual time just enough for the flusher to pick the
        // item up into an in-flight flush before we race stop's zero
        // deadline against it.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let result = pipeline.stop(Duration::from_millis(0)).await;
        assert_eq!(result, Err(PipelineError::Timeout));
    }

    #[tokio::test]
    async fn queue_depth_reaches_buffer_size_under_backpressure() {
        tokio::time::pause();
        let sink = Arc::new(SlowSink {
            delay: Duration::from_secs(5),
        });
        let config = PipelineConfig::new(4, 100, Duration::from_secs(60));
        let pipeline = Pipeline::start("test", config, sink);

        // One item goes straight into the flusher's in-flight batch;
        // the remaining buffer_size fill the channel.
        for i in 0..5u32 {
            pipeline.ingest(i).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(pipeline.queue_depth(), 4);

        let send = tokio::time::timeout(Duration::from_millis(50), pipeline.ingest(99)).await;
        assert!(send.is_err(), "ingest should block while the channel is full");
    }
}
