use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use spectre_buffers::BatchSink;
use spectre_common::DomainError;

use crate::query::{AggregationGroup, HistogramBucket, QueryParams, QueryResult};
use crate::record::LogRecord;

/// The narrow contract every backend flavor implements: query
/// primitives, batch ingestion, and a connectivity probe. Constructed
/// by a [`crate::registry::Registry`] factory with no network I/O;
/// all of it happens in these methods, called once the instance is
/// started.
#[async_trait]
pub trait IntegrationClient: Send + Sync + 'static {
    async fn query(&self, params: &QueryParams) -> Result<QueryResult, DomainError>;

    async fn query_histogram(
        &self,
        params: &QueryParams,
        step: Duration,
    ) -> Result<Vec<HistogramBucket>, DomainError>;

    async fn query_aggregation(
        &self,
        params: &QueryParams,
        group_by: &str,
    ) -> Result<Vec<AggregationGroup>, DomainError>;

    async fn ingest_batch(&self, batch: Vec<LogRecord>) -> Result<(), DomainError>;

    /// A cheap connectivity check used at `Start` and on the periodic
    /// health probe. Must not mutate backend state.
    async fn probe(&self) -> Result<(), DomainError>;
}

/// Adapts a shared [`IntegrationClient`] into the pipeline's
/// [`BatchSink`], so `Pipeline::start` can own a flusher that calls
/// straight into the backend without the client needing to know about
/// the pipeline's batching at all.
pub struct ClientSink(pub Arc<dyn IntegrationClient>);

#[async_trait]
impl BatchSink<LogRecord> for ClientSink {
    type Error = DomainError;

    async fn ingest_batch(&self, batch: Vec<LogRecord>) -> Result<(), Self::Error> {
        self.0.ingest_batch(batch).await
    }
}
