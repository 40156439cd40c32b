use std::sync::Arc;

use spectre_common::{DomainError, ShutdownSignal};
use tracing::instrument;

use crate::integrations::LifecycleManager;
use crate::query::{QueryParams, QueryResult};

use super::resolve_instance;

/// A unified time-range search, delegating to the same query
/// primitive `LogQuery` uses. Kept as its own service (rather than
/// folded into `LogQuery`) because it is the entry point the REST
/// `/api/v1/search` and MCP `search` tool both name explicitly in
/// §4.6, even though today it has no behavior beyond that delegation.
pub struct SearchService {
    lifecycle: Arc<LifecycleManager>,
}

impl SearchService {
    pub fn new(lifecycle: Arc<LifecycleManager>) -> Self {
        Self { lifecycle }
    }

    #[instrument(skip(self, shutdown, params))]
    pub async fn search(
        &self,
        shutdown: &ShutdownSignal,
        integration: &str,
        params: QueryParams,
    ) -> Result<QueryResult, DomainError> {
        let params = params.with_default_time_range();
        let instance = resolve_instance(&self.lifecycle, integration).await?;
        tokio::select! {
            biased;
            () = shutdown.signalled() => Err(DomainError::new(spectre_common::ErrorKind::NotReady, "request cancelled by shutdown")),
            result = instance.client().query(&params) => result,
        }
    }
}
