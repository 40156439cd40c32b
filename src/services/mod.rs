mod graph;
mod log_query;
mod metadata;
mod search;
mod timeline;

pub use graph::{GraphService, Neighbor};
pub use log_query::LogQueryService;
pub use metadata::{MetadataService, MetadataSummary};
pub use search::SearchService;
pub use timeline::{TimelineResponse, TimelineService};

use std::sync::Arc;

use spectre_common::{DomainError, ShutdownSignal};

use crate::integrations::{Instance, LifecycleManager};

/// Resolves the named integration's running instance, shared by every
/// service so each one need not re-derive the same `NotFound` message.
/// Any running state is accepted: a `degraded` instance is still
/// queried (its own client decides whether the request itself fails).
async fn resolve_instance(lifecycle: &LifecycleManager, name: &str) -> Result<Arc<Instance>, DomainError> {
    lifecycle
        .instance(name)
        .await
        .ok_or_else(|| DomainError::not_found(format!("no integration named {name:?} is running")))
}

/// The service instances shared by the REST router and the MCP
/// dispatcher, per §4.6's "single in-process dispatcher... sharing the
/// service instances by reference" requirement.
pub struct Services {
    pub log_query: LogQueryService,
    pub timeline: TimelineService,
    pub graph: GraphService,
    pub search: SearchService,
    pub metadata: Arc<MetadataService>,
}

impl Services {
    pub fn new(lifecycle: Arc<LifecycleManager>, shutdown: ShutdownSignal) -> Arc<Self> {
        Arc::new(Self {
            log_query: LogQueryService::new(Arc::clone(&lifecycle)),
            timeline: TimelineService::new(Arc::clone(&lifecycle)),
            graph: GraphService::new(Arc::clone(&lifecycle)),
            search: SearchService::new(Arc::clone(&lifecycle)),
            metadata: MetadataService::new(lifecycle, shutdown),
        })
    }
}
