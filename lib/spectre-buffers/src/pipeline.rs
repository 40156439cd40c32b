use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use snafu::Snafu;
use spectre_common::{await_with_deadline, emit, guarded, DeadlineOutcome, ShutdownSignal};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::PipelineConfig;
use crate::internal_events::{BatchFlushed, FlushFailed, QueueDepth};

/// Backend-side sink a pipeline flushes accumulated batches into.
/// Implemented by an integration's client. An `Err` flush is reported
/// but never stops the flusher; the only retry unit is "try again on
/// the next batch" (no per-record retry). A panic out of
/// `ingest_batch` is a different matter: it is caught at the flusher's
/// own recovery boundary, which stops the flusher and marks the
/// pipeline as panicked (see [`Pipeline::has_panicked`]).
#[async_trait]
pub trait BatchSink<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    type Error: std::error::Error + Send + Sync + 'static;

    async fn ingest_batch(&self, batch: Vec<T>) -> Result<(), Self::Error>;
}

#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum PipelineError {
    #[snafu(display("pipeline has been stopped"))]
    Stopped,
    #[snafu(display("stop deadline elapsed before the flusher drained"))]
    Timeout,
}

/// The per-integration backpressure-aware batch processor: a bounded
/// channel from producers to a single flusher task, batch flushing on
/// size or tick, and deadline-bounded graceful shutdown. See the
/// ingestion pipeline design for the full contract; this type is a
/// direct, generic realization of it.
pub struct Pipeline<T>
where
    T: Send + 'static,
{
    name: String,
    sender: RwLock<Option<mpsc::Sender<T>>>,
    shutdown: ShutdownSignal,
    flusher: std::sync::Mutex<Option<JoinHandle<()>>>,
    queue_depth: Arc<QueueDepth>,
    panicked: Arc<AtomicBool>,
}

impl<T> Pipeline<T>
where
    T: Send + 'static,
{
    /// Constructs and immediately starts the flusher task for `sink`.
    /// `name` labels every metric this pipeline emits.
    pub fn start<S>(name: impl Into<String>, config: PipelineConfig, sink: Arc<S>) -> Arc<Self>
    where
        S: BatchSink<T>,
    {
        let name = name.into();
        let (tx, rx) = mpsc::channel(config.buffer_size.max(1));
        let queue_depth = Arc::new(QueueDepth::new(name.clone()));
        let panicked = Arc::new(AtomicBool::new(false));

        let flusher_name = name.clone();
        let flusher_queue_depth = Arc::clone(&queue_depth);
        let flusher_panicked = Arc::clone(&panicked);
        let handle = tokio::spawn(run_flusher(
            rx,
            sink,
            config.batch_size.max(1),
            config.flush_interval,
            flusher_name,
            flusher_queue_depth,
            flusher_panicked,
        ));

        Arc::new(Self {
            name,
            sender: RwLock::new(Some(tx)),
            shutdown: ShutdownSignal::new(),
            flusher: std::sync::Mutex::new(Some(handle)),
            queue_depth,
            panicked,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current queue depth, for health/metrics inspection in tests.
    pub fn queue_depth(&self) -> i64 {
        self.queue_depth.current()
    }

    /// Whether the flusher's recovery boundary has ever caught a panic
    /// from the backend sink. Once set, the flusher task has exited and
    /// the pipeline accepts no further batches; callers (`Instance::
    /// probe`) use this to escalate the owning instance to `failed`.
    pub fn has_panicked(&self) -> bool {
        self.panicked.load(Ordering::SeqCst)
    }

    /// Appends one record. Blocks when the buffer is full (the
    /// intended backpressure throttle) and returns `Stopped` once
    /// `stop` has been called, whichever happens first.
    pub async fn ingest(&self, record: T) -> Result<(), PipelineError> {
        let sender = {
            let guard = self.sender.read().expect("pipeline sender lock poisoned");
            guard.clone()
        };
        let Some(sender) = sender else {
            return Err(PipelineError::Stopped);
        };

        tokio::select! {
            biased;
            () = self.shutdown.signalled() => Err(PipelineError::Stopped),
            res = sender.send(record) => {
                match res {
                    Ok(()) => {
                        self.queue_depth.incremented();
                        Ok(())
                    }
                    Err(_) => Err(PipelineError::Stopped),
                }
            }
        }
    }

    /// Initiates graceful shutdown: signals the shutdown token, closes
    /// the producer channel so further `ingest` calls fail fast, then
    /// waits for the flusher to drain and exit up to `deadline`. If
    /// the deadline elapses the flusher is left running in the
    /// background (not killed) and `Timeout` is returned.
    pub async fn stop(&self, deadline: Duration) -> Result<(), PipelineError> {
        self.shutdown.signal();
        {
            let mut guard = self.sender.write().expect("pipeline sender lock poisoned");
            guard.take();
        }

        let handle = { self.flusher.lock().expect("flusher lock poisoned").take() };
        let Some(handle) = handle else {
            return Ok(());
        };

        match await_with_deadline(wait_for(handle), deadline).await {
            DeadlineOutcome::Completed => Ok(()),
            DeadlineOutcome::TimedOut => Err(PipelineError::Timeout),
        }
    }
}

/// Awaits the flusher task, resuming any panic that unwound through it
/// rather than discarding the `JoinError` - the same panic the flusher
/// loop's own `guarded()` call around `flush` normally catches, but a
/// defense in depth for anything else in the task that might panic.
/// `Pipeline::stop` runs inside the caller's own recovery boundary
/// (`Instance::stop`), so resuming here lands the panic there instead
/// of it vanishing silently.
async fn wait_for(handle: JoinHandle<()>) {
    if let Err(join_error) = handle.await {
        if join_error.is_panic() {
            std::panic::resume_unwind(join_error.into_panic());
        }
    }
}

async fn run_flusher<T, S>(
    mut receiver: mpsc::Receiver<T>,
    sink: Arc<S>,
    batch_size: usize,
    flush_interval: Duration,
    name: String,
    queue_depth: Arc<QueueDepth>,
    panicked: Arc<AtomicBool>,
) where
    T: Send + 'static,
    S: BatchSink<T>,
{
    let mut batch = Vec::with_capacity(batch_size);
    let mut ticker = tokio::time::interval(flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it so a freshly-started
    // pipeline doesn't flush an empty batch the instant it boots.
    ticker.tick().await;

    loop {
        tokio::select! {
            maybe_item = receiver.recv() => {
                match maybe_item {
                    Some(item) => {
                        queue_depth.decremented(1);
                        batch.push(item);
                        if batch.len() >= batch_size && flush(&*sink, &mut batch, &name).await {
                            panicked.store(true, Ordering::SeqCst);
                            break;
                        }
                    }
                    None => {
                        if !batch.is_empty() {
                            flush(&*sink, &mut batch, &name).await;
                        }
                        break;
                    }
                }
            }
            _ = ticker.tick() => {
                if !batch.is_empty() && flush(&*sink, &mut batch, &name).await {
                    panicked.store(true, Ordering::SeqCst);
                    break;
                }
            }
        }
    }
}

/// Flushes one batch through the recovery boundary required around
/// every sink call: a panicking backend client is caught here instead
/// of silently killing the flusher task. Returns whether the sink
/// panicked, so the caller can stop the flusher and surface it to the
/// owning instance via [`Pipeline::has_panicked`].
async fn flush<T, S>(sink: &S, batch: &mut Vec<T>, name: &str) -> bool
where
    T: Send + 'static,
    S: BatchSink<T>,
{
    let taken = std::mem::replace(batch, Vec::with_capacity(batch.capacity()));
    let count = taken.len();
    match guarded(sink.ingest_batch(taken)).await {
        Ok(Ok(())) => {
            emit(BatchFlushed {
                integration: name.to_string(),
                count,
            });
            false
        }
        Ok(Err(error)) => {
            emit(FlushFailed {
                integration: name.to_string(),
                error: error.to_string(),
            });
            false
        }
        Err(panic_message) => {
            emit(FlushFailed {
                integration: name.to_string(),
                error: format!("flush panicked: {panic_message}"),
            });
            true
        }
    }
}
