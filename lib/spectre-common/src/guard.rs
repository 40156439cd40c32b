use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;

/// Runs `fut` to completion, catching any panic that unwinds through it
/// instead of letting it propagate past the caller. This is the
/// recovery boundary every per-instance lifecycle operation (`Start`,
/// `Stop`, health probe, pipeline flush) is wrapped in, so one
/// integration's panicking client degrades that instance rather than
/// taking down the process.
pub async fn guarded<F, T>(fut: F) -> Result<T, String>
where
    F: Future<Output = T>,
{
    AssertUnwindSafe(fut).catch_unwind().await.map_err(|payload| {
        payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panicked".to_string())
    })
}
