use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use spectre_buffers::{Pipeline, PipelineConfig, PipelineError};
use spectre_common::{guarded, DomainError, ErrorKind};
use tokio::sync::RwLock;
use tracing::{error, warn};

use crate::health::{HealthReport, InstanceState};
use crate::query::{AggregationGroup, HistogramBucket, QueryParams, QueryResult};
use crate::record::LogRecord;

use super::client::{ClientSink, IntegrationClient};

/// One running integration: its backend client, its optional ingest
/// pipeline, and the health state machine of §4.4. Exactly one
/// `Instance` exists per configured name at a time; the lifecycle
/// manager re-creates it wholesale on configuration change rather
/// than mutating it in place.
pub struct Instance {
    pub name: String,
    pub kind: String,
    client: Arc<dyn IntegrationClient>,
    pipeline: RwLock<Option<Arc<Pipeline<LogRecord>>>>,
    state: RwLock<InstanceState>,
    health: RwLock<HealthReport>,
}

impl Instance {
    pub fn new(name: String, kind: String, client: Arc<dyn IntegrationClient>) -> Arc<Self> {
        Arc::new(Self {
            name,
            kind,
            client,
            pipeline: RwLock::new(None),
            state: RwLock::new(InstanceState::Stopped),
            health: RwLock::new(HealthReport::new(InstanceState::Stopped, "not started")),
        })
    }

    /// A terminal placeholder for a configuration whose factory
    /// construction itself failed - the `Start err -> failed` edge of
    /// the state machine. Holds a stub client so `Instance` need not
    /// make `client` optional for this one unreachable case.
    pub fn failed(name: String, kind: String, message: impl Into<String>) -> Arc<Self> {
        let message = message.into();
        Arc::new(Self {
            name,
            kind,
            client: Arc::new(UnavailableClient),
            pipeline: RwLock::new(None),
            state: RwLock::new(InstanceState::Failed),
            health: RwLock::new(HealthReport::new(InstanceState::Failed, message)),
        })
    }

    pub async fn state(&self) -> InstanceState {
        *self.state.read().await
    }

    pub async fn health(&self) -> HealthReport {
        self.health.read().await.clone()
    }

    pub fn client(&self) -> Arc<dyn IntegrationClient> {
        Arc::clone(&self.client)
    }

    /// `stopped -> starting -> {healthy, degraded, failed}`. A failed
    /// initial probe still leaves the instance usable in `degraded`
    /// state rather than blocking boot on a transiently unreachable
    /// backend.
    pub async fn start(&self, pipeline_config: PipelineConfig) {
        self.set_state(InstanceState::Starting).await;
        let sink = Arc::new(ClientSink(Arc::clone(&self.client)));
        let pipeline = Pipeline::start(self.name.clone(), pipeline_config, sink);
        *self.pipeline.write().await = Some(pipeline);

        match guarded(self.client.probe()).await {
            Ok(Ok(())) => self.transition_healthy("initial probe succeeded").await,
            Ok(Err(e)) => {
                warn!(integration = %self.name, error = %e, "initial connectivity probe failed; starting degraded");
                self.transition_degraded(e.to_string()).await;
            }
            Err(panic_message) => {
                error!(integration = %self.name, panic = %panic_message, "start panicked");
                self.transition_failed(panic_message).await;
            }
        }
    }

    /// The periodic probe driving `healthy <-> degraded` (period
    /// roughly 30s, per the lifecycle manager). A no-op outside those
    /// two states.
    pub async fn probe(&self) {
        if !self.state().await.is_healthy_or_degraded() {
            return;
        }
        if let Some(pipeline) = self.pipeline.read().await.clone() {
            if pipeline.has_panicked() {
                error!(integration = %self.name, "ingest pipeline flusher panicked");
                self.transition_failed("ingest pipeline flusher panicked").await;
                return;
            }
        }
        match guarded(self.client.probe()).await {
            Ok(Ok(())) => self.transition_healthy("probe succeeded").await,
            Ok(Err(e)) => self.transition_degraded(e.to_string()).await,
            Err(panic_message) => self.transition_failed(panic_message).await,
        }
    }

    /// Forwards one record into the instance's ingest pipeline. A
    /// `failed` placeholder (no pipeline was ever started) and an
    /// already-stopped pipeline both report `NotReady` rather than
    /// panicking on the absent channel.
    pub async fn ingest(&self, record: LogRecord) -> Result<(), DomainError> {
        let pipeline = self.pipeline.read().await.clone();
        let Some(pipeline) = pipeline else {
            return Err(DomainError::not_ready(format!("integration {:?} has no active ingest pipeline", self.name)));
        };
        pipeline.ingest(record).await.map_err(|e| match e {
            PipelineError::Stopped => {
                DomainError::not_ready(format!("integration {:?} pipeline has been stopped", self.name))
            }
            PipelineError::Timeout => DomainError::new(ErrorKind::TransientBackend, "pipeline ingest timed out"),
        })
    }

    /// `-> stopping -> stopped`. A deadline timeout during pipeline
    /// drain is logged, not fatal: the instance still lands in
    /// `stopped`. A panic during drain goes through the same recovery
    /// boundary as `start`/`probe` and lands the instance in `failed`
    /// instead.
    pub async fn stop(&self, deadline: Duration) {
        self.set_state(InstanceState::Stopping).await;
        if let Some(pipeline) = self.pipeline.write().await.take() {
            match guarded(pipeline.stop(deadline)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(integration = %self.name, error = %e, "pipeline did not drain before the stop deadline");
                }
                Err(panic_message) => {
                    error!(integration = %self.name, panic = %panic_message, "stop panicked");
                    self.transition_failed(panic_message).await;
                    return;
                }
            }
        }
        self.set_state(InstanceState::Stopped).await;
    }

    async fn transition_healthy(&self, message: impl Into<String>) {
        self.set_state(InstanceState::Healthy).await;
        *self.health.write().await = HealthReport::new(InstanceState::Healthy, message);
    }

    async fn transition_degraded(&self, message: impl Into<String>) {
        self.set_state(InstanceState::Degraded).await;
        *self.health.write().await = HealthReport::new(InstanceState::Degraded, message);
    }

    async fn transition_failed(&self, message: impl Into<String>) {
        self.set_state(InstanceState::Failed).await;
        *self.health.write().await = HealthReport::new(InstanceState::Failed, message);
    }

    async fn set_state(&self, state: InstanceState) {
        *self.state.write().await = state;
    }
}

/// The client held by a [`Instance::failed`] placeholder. Every
/// method reports `NotReady` rather than being called at all - the
/// lifecycle manager never calls `start`/`probe` on a failed instance
/// - but a live, type-correct value is simpler than an `Option` field
/// threaded through every method above.
struct UnavailableClient;

#[async_trait]
impl IntegrationClient for UnavailableClient {
    async fn query(&self, _params: &QueryParams) -> Result<QueryResult, DomainError> {
        Err(unavailable())
    }

    async fn query_histogram(&self, _params: &QueryParams, _step: Duration) -> Result<Vec<HistogramBucket>, DomainError> {
        Err(unavailable())
    }

    async fn query_aggregation(&self, _params: &QueryParams, _group_by: &str) -> Result<Vec<AggregationGroup>, DomainError> {
        Err(unavailable())
    }

    async fn ingest_batch(&self, _batch: Vec<LogRecord>) -> Result<(), DomainError> {
        Err(unavailable())
    }

    async fn probe(&self) -> Result<(), DomainError> {
        Err(unavailable())
    }
}

fn unavailable() -> DomainError {
    DomainError::new(ErrorKind::NotReady, "integration failed to construct and has no active client")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::mock::MockIntegration;
    use chrono::Utc;
    use spectre_common::HasKind;

    fn record() -> LogRecord {
        LogRecord {
            timestamp: Utc::now(),
            stream: "stdout".into(),
            message: "hello".into(),
            namespace: None,
            pod: None,
            container: None,
            level: None,
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig::new(16, 4, Duration::from_millis(20))
    }

    #[tokio::test]
    async fn ingest_before_start_is_not_ready() {
        let instance = Instance::new("a".into(), "logstore-mock".into(), Arc::new(MockIntegration::new()));
        let err = instance.ingest(record()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotReady);
    }

    #[tokio::test]
    async fn ingest_after_start_succeeds_and_lands_in_the_healthy_state() {
        let instance = Instance::new("a".into(), "logstore-mock".into(), Arc::new(MockIntegration::new()));
        instance.start(config()).await;
        assert_eq!(instance.state().await, InstanceState::Healthy);
        instance.ingest(record()).await.unwrap();
    }

    #[tokio::test]
    async fn ingest_after_stop_is_not_ready() {
        let instance = Instance::new("a".into(), "logstore-mock".into(), Arc::new(MockIntegration::new()));
        instance.start(config()).await;
        instance.stop(Duration::from_secs(1)).await;
        let err = instance.ingest(record()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotReady);
    }

    #[tokio::test]
    async fn a_failed_placeholder_reports_not_ready_on_every_call() {
        let instance = Instance::failed("a".into(), "logstore-mock".into(), "construction failed");
        assert_eq!(instance.state().await, InstanceState::Failed);
        let err = instance.ingest(record()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotReady);
    }
}
