use std::sync::Arc;
use std::time::Duration;

use spectre_common::{DomainError, ShutdownSignal};
use tracing::instrument;

use crate::integrations::LifecycleManager;
use crate::query::{AggregationGroup, HistogramBucket, QueryParams, QueryResult};

use super::resolve_instance;

/// The in-process facade both the REST `POST /api/v1/log-query`
/// handler and the MCP `log_query` tool call directly - the same
/// method, not two implementations, is what makes S5 (MCP/REST parity)
/// hold by construction.
pub struct LogQueryService {
    lifecycle: Arc<LifecycleManager>,
}

impl LogQueryService {
    pub fn new(lifecycle: Arc<LifecycleManager>) -> Self {
        Self { lifecycle }
    }

    #[instrument(skip(self, shutdown))]
    pub async fn query(
        &self,
        shutdown: &ShutdownSignal,
        integration: &str,
        params: QueryParams,
    ) -> Result<QueryResult, DomainError> {
        let params = params.with_default_time_range();
        let instance = resolve_instance(&self.lifecycle, integration).await?;
        run_cancellable(shutdown, instance.client().query(&params)).await
    }

    #[instrument(skip(self, shutdown))]
    pub async fn histogram(
        &self,
        shutdown: &ShutdownSignal,
        integration: &str,
        params: QueryParams,
        step: Duration,
    ) -> Result<Vec<HistogramBucket>, DomainError> {
        let params = params.with_default_time_range();
        let instance = resolve_instance(&self.lifecycle, integration).await?;
        run_cancellable(shutdown, instance.client().query_histogram(&params, step)).await
    }

    #[instrument(skip(self, shutdown))]
    pub async fn aggregate(
        &self,
        shutdown: &ShutdownSignal,
        integration: &str,
        params: QueryParams,
        group_by: &str,
    ) -> Result<Vec<AggregationGroup>, DomainError> {
        let params = params.with_default_time_range();
        let instance = resolve_instance(&self.lifecycle, integration).await?;
        run_cancellable(shutdown, instance.client().query_aggregation(&params, group_by)).await
    }
}

/// Races `fut` against the caller's cancellation signal, observing it
/// at the one suspension point every query makes (the outbound HTTP
/// call itself already carries its own per-request timeout).
async fn run_cancellable<T>(
    shutdown: &ShutdownSignal,
    fut: impl std::future::Future<Output = Result<T, DomainError>>,
) -> Result<T, DomainError> {
    tokio::select! {
        biased;
        () = shutdown.signalled() => Err(DomainError::new(spectre_common::ErrorKind::NotReady, "request cancelled by shutdown")),
        result = fut => result,
    }
}
