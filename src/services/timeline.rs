use std::sync::Arc;

use serde::Serialize;
use spectre_common::{DomainError, ShutdownSignal};
use tracing::instrument;

use crate::integrations::LifecycleManager;
use crate::query::{QueryParams, QueryResult};
use crate::record::LogRecord;

use super::resolve_instance;

/// A resource query and an event query merged into one response. The
/// distinction between "resource" and "event" records is left to the
/// backend (out of scope per the graph-query Non-goal); both legs
/// here are the same `Query` primitive run against the same
/// integration with two different filters, which is the only timeline
/// shape this repository can implement without inventing a specific
/// event-store schema.
#[derive(Debug, Clone, Serialize)]
pub struct TimelineResponse {
    pub resources: Vec<LogRecord>,
    pub events: Vec<LogRecord>,
    pub has_more: bool,
}

pub struct TimelineService {
    lifecycle: Arc<LifecycleManager>,
}

impl TimelineService {
    pub fn new(lifecycle: Arc<LifecycleManager>) -> Self {
        Self { lifecycle }
    }

    /// Concurrently issues a resource query (`resource_params`) and an
    /// event query (`event_params`) against the same integration and
    /// merges them, per §4.6's "concurrently executes a resource query
    /// and an event query" requirement.
    #[instrument(skip(self, shutdown, resource_params, event_params))]
    pub async fn timeline(
        &self,
        shutdown: &ShutdownSignal,
        integration: &str,
        resource_params: QueryParams,
        event_params: QueryParams,
    ) -> Result<TimelineResponse, DomainError> {
        let instance = resolve_instance(&self.lifecycle, integration).await?;
        let resource_params = resource_params.with_default_time_range();
        let event_params = event_params.with_default_time_range();
        let client = instance.client();

        let (resources, events) = tokio::select! {
            biased;
            () = shutdown.signalled() => {
                return Err(DomainError::new(spectre_common::ErrorKind::NotReady, "request cancelled by shutdown"));
            }
            joined = async {
                tokio::join!(client.query(&resource_params), client.query(&event_params))
            } => joined,
        };

        let resources: QueryResult = resources?;
        let events: QueryResult = events?;
        Ok(TimelineResponse {
            has_more: resources.has_more || events.has_more,
            resources: resources.records,
            events: events.records,
        })
    }
}
