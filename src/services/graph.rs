use std::sync::Arc;

use serde::Serialize;
use spectre_common::{DomainError, ShutdownSignal};
use tracing::instrument;

use crate::integrations::LifecycleManager;
use crate::query::{AggregationGroup, QueryParams};

use super::resolve_instance;

/// One edge discovered by a neighbor lookup. The graph schema itself
/// (what a "relationship" means, how it's stored) is explicitly out of
/// scope; this repository exposes the two parameterized primitives
/// §4.6 names and backs them with the same query/aggregate primitives
/// every integration already implements, rather than inventing a
/// traversal algorithm.
#[derive(Debug, Clone, Serialize)]
pub struct Neighbor {
    pub key: String,
    pub count: u64,
}

pub struct GraphService {
    lifecycle: Arc<LifecycleManager>,
}

impl GraphService {
    pub fn new(lifecycle: Arc<LifecycleManager>) -> Self {
        Self { lifecycle }
    }

    /// Neighbor lookup: groups records matching `params` by `group_by`
    /// (e.g. `"pod"`), one count per distinct neighbor.
    #[instrument(skip(self, shutdown, params))]
    pub async fn neighbors(
        &self,
        shutdown: &ShutdownSignal,
        integration: &str,
        params: QueryParams,
        group_by: &str,
    ) -> Result<Vec<Neighbor>, DomainError> {
        let params = params.with_default_time_range();
        let instance = resolve_instance(&self.lifecycle, integration).await?;
        let groups: Vec<AggregationGroup> = tokio::select! {
            biased;
            () = shutdown.signalled() => return Err(DomainError::new(spectre_common::ErrorKind::NotReady, "request cancelled by shutdown")),
            result = instance.client().query_aggregation(&params, group_by) => result?,
        };
        Ok(groups.into_iter().map(|g| Neighbor { key: g.key, count: g.count }).collect())
    }

    /// Time-filtered traversal: a plain query scoped to `params`'s time
    /// range, returning the matching records as the traversal's node
    /// set. Multi-hop traversal algorithms are a Non-goal.
    #[instrument(skip(self, shutdown, params))]
    pub async fn traverse(
        &self,
        shutdown: &ShutdownSignal,
        integration: &str,
        params: QueryParams,
    ) -> Result<Vec<crate::record::LogRecord>, DomainError> {
        let params = params.with_default_time_range();
        let instance = resolve_instance(&self.lifecycle, integration).await?;
        let result = tokio::select! {
            biased;
            () = shutdown.signalled() => return Err(DomainError::new(spectre_common::ErrorKind::NotReady, "request cancelled by shutdown")),
            result = instance.client().query(&params) => result?,
        };
        Ok(result.records)
    }
}
