use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use spectre_common::{DomainError, ShutdownSignal};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{instrument, warn};

use crate::integrations::LifecycleManager;
use crate::query::{AggregationGroup, QueryParams, TimeRange};

use super::resolve_instance;

/// How often a discovered integration's summary is refreshed in the
/// background once a first request has warmed its cache entry.
const REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// A namespace/count/time-range summary for one integration, served
/// read-through a cache refreshed in the background rather than on
/// every request - the "background-refreshed cache" §4.6 names.
#[derive(Debug, Clone, Serialize)]
pub struct MetadataSummary {
    pub namespaces: Vec<AggregationGroup>,
    pub record_count: u64,
    pub time_range: TimeRange,
    pub refreshed_at: DateTime<Utc>,
}

pub struct MetadataService {
    lifecycle: Arc<LifecycleManager>,
    cache: RwLock<HashMap<String, MetadataSummary>>,
    /// Integrations for which a background refresh loop has already
    /// been spawned - at most one loop per integration, spawned lazily
    /// on first request rather than for every configured integration
    /// up front (most are never queried for metadata).
    loops_started: RwLock<HashSet<String>>,
    shutdown: ShutdownSignal,
}

impl MetadataService {
    pub fn new(lifecycle: Arc<LifecycleManager>, shutdown: ShutdownSignal) -> Arc<Self> {
        Arc::new(Self {
            lifecycle,
            cache: RwLock::new(HashMap::new()),
            loops_started: RwLock::new(HashSet::new()),
            shutdown,
        })
    }

    /// Returns the cached summary if one exists, else performs a
    /// synchronous first refresh - so a freshly reconciled integration
    /// still answers its first metadata request before the background
    /// loop has had a chance to run. Also ensures that integration has
    /// a standing background refresh loop from here on.
    #[instrument(skip(self, shutdown))]
    pub async fn summary(self: &Arc<Self>, shutdown: &ShutdownSignal, integration: &str) -> Result<MetadataSummary, DomainError> {
        if let Some(summary) = self.cache.read().await.get(integration) {
            self.ensure_refresh_loop(integration).await;
            return Ok(summary.clone());
        }
        let summary = self.refresh(shutdown, integration).await?;
        self.ensure_refresh_loop(integration).await;
        Ok(summary)
    }

    async fn ensure_refresh_loop(self: &Arc<Self>, integration: &str) {
        {
            let started = self.loops_started.read().await;
            if started.contains(integration) {
                return;
            }
        }
        let mut started = self.loops_started.write().await;
        if !started.insert(integration.to_string()) {
            return;
        }
        Arc::clone(self).spawn_refresh_loop(integration.to_string(), REFRESH_INTERVAL, self.shutdown.child());
    }

    async fn refresh(&self, shutdown: &ShutdownSignal, integration: &str) -> Result<MetadataSummary, DomainError> {
        let instance = resolve_instance(&self.lifecycle, integration).await?;
        let params = QueryParams::default().with_default_time_range();
        let time_range = params.time_range.expect("with_default_time_range always sets a range");

        let groups: Vec<AggregationGroup> = tokio::select! {
            biased;
            () = shutdown.signalled() => return Err(DomainError::new(spectre_common::ErrorKind::NotReady, "request cancelled by shutdown")),
            result = instance.client().query_aggregation(&params, "namespace") => result?,
        };

        let summary = MetadataSummary {
            record_count: groups.iter().map(|g| g.count).sum(),
            namespaces: groups,
            time_range,
            refreshed_at: Utc::now(),
        };
        self.cache.write().await.insert(integration.to_string(), summary.clone());
        Ok(summary)
    }

    /// Refreshes `integration`'s summary on a fixed interval until
    /// `shutdown` fires. A failed refresh is logged and leaves the
    /// previous summary in place rather than evicting it.
    pub fn spawn_refresh_loop(
        self: Arc<Self>,
        integration: String,
        interval: Duration,
        shutdown: ShutdownSignal,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = shutdown.signalled() => break,
                    _ = tokio::time::sleep(interval) => {
                        if let Err(e) = self.refresh(&shutdown, &integration).await {
                            warn!(integration = %integration, error = %e, "metadata refresh failed");
                        }
                    }
                }
            }
        })
    }
}
