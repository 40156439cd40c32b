use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Shared shutdown primitive. Every long-running task (pipeline
/// flusher, health prober, config watcher, inbound request) holds a
/// clone and observes it at every suspension point, per the
/// concurrency model's cancellation discipline.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
        }
    }

    pub fn signal(&self) {
        self.token.cancel();
    }

    pub fn is_signalled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn signalled(&self) {
        self.token.cancelled().await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of racing a future against a deadline, the shape every
/// `Stop(deadline)`-style operation in the core returns.
#[derive(Debug, PartialEq, Eq)]
pub enum DeadlineOutcome {
    Completed,
    TimedOut,
}

/// Runs `fut` to completion, but returns `DeadlineOutcome::TimedOut`
/// if `deadline` elapses first. Unlike `tokio::time::timeout`, the
/// future is not cancelled on timeout: callers that need the work to
/// keep draining in the background (e.g. a flusher finishing its last
/// batch) can detach it before calling this, and this helper is used
/// only to decide what to report to the caller of `Stop`.
pub async fn await_with_deadline<F>(fut: F, deadline: Duration) -> DeadlineOutcome
where
    F: std::future::Future<Output = ()>,
{
    tokio::select! {
        () = fut => DeadlineOutcome::Completed,
        () = tokio::time::sleep(deadline) => DeadlineOutcome::TimedOut,
    }
}
