use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use spectre_buffers::PipelineConfig;
use spectre_common::DomainError;
use tokio::sync::RwLock;
use tracing::error;

use crate::config::IntegrationConfig;
use crate::health::HealthReport;
use crate::registry::{ConstructArgs, Registry};
use crate::secrets::SecretResolver;

use super::instance::Instance;

const DEFAULT_STOP_DEADLINE: Duration = Duration::from_secs(10);

/// Owns the set of running integrations and brings it into agreement
/// with a desired configuration list (§4.4's `Reconcile`). The only
/// mutator of the instance table; `health`/`for_each_healthy` read a
/// snapshot so they never block a reconcile in progress.
pub struct LifecycleManager {
    registry: Arc<Registry>,
    secrets: Arc<SecretResolver>,
    pipeline_config: PipelineConfig,
    stop_deadline: Duration,
    instances: RwLock<IndexMap<String, (IntegrationConfig, Arc<Instance>)>>,
}

impl LifecycleManager {
    pub fn new(registry: Arc<Registry>, secrets: Arc<SecretResolver>, pipeline_config: PipelineConfig) -> Arc<Self> {
        Arc::new(Self {
            registry,
            secrets,
            pipeline_config,
            stop_deadline: DEFAULT_STOP_DEADLINE,
            instances: RwLock::new(IndexMap::new()),
        })
    }

    /// Brings the running set into agreement with `configs`. Disabled
    /// configs are treated as absent. Untouched entries (same config
    /// under [`IntegrationConfig::reconcile_eq`]) are never
    /// restarted; this is what makes `Reconcile(S); Reconcile(S)` a
    /// no-op.
    pub async fn reconcile(&self, configs: Vec<IntegrationConfig>) {
        let desired: IndexMap<String, IntegrationConfig> =
            configs.into_iter().filter(|c| c.enabled).map(|c| (c.name.clone(), c)).collect();

        let mut instances = self.instances.write().await;

        let stale: Vec<String> = instances
            .iter()
            .filter(|(name, (config, _))| match desired.get(name.as_str()) {
                None => true,
                Some(next) => !config.reconcile_eq(next),
            })
            .map(|(name, _)| name.clone())
            .collect();

        let to_stop: Vec<Arc<Instance>> = stale
            .iter()
            .filter_map(|name| instances.get(name).map(|(_, instance)| Arc::clone(instance)))
            .collect();
        futures::future::join_all(to_stop.iter().map(|instance| instance.stop(self.stop_deadline))).await;
        for name in &stale {
            instances.shift_remove(name);
        }

        let to_start: Vec<IntegrationConfig> = desired
            .into_values()
            .filter(|config| !instances.contains_key(&config.name))
            .collect();

        let started = futures::future::join_all(to_start.into_iter().map(|config| async move {
            let instance = self.construct_and_start(&config).await;
            (config, instance)
        }))
        .await;

        for (config, instance) in started {
            instances.insert(config.name.clone(), (config, instance));
        }
    }

    async fn construct_and_start(&self, config: &IntegrationConfig) -> Arc<Instance> {
        let args = ConstructArgs {
            name: &config.name,
            endpoint: &config.endpoint,
            options: &config.options,
            credential_ref: config.credential_ref.as_ref(),
            secrets: Arc::clone(&self.secrets),
        };
        match self.registry.construct(&config.kind, args) {
            Ok(client) => {
                let instance = Instance::new(config.name.clone(), config.kind.clone(), Arc::from(client));
                instance.start(self.pipeline_config.clone()).await;
                instance
            }
            Err(e) => {
                error!(integration = %config.name, error = %e, "failed to construct integration");
                Instance::failed(config.name.clone(), config.kind.clone(), e.to_string())
            }
        }
    }

    /// Stops every running instance with a shared deadline, draining
    /// each one's pipeline concurrently rather than one at a time.
    pub async fn shutdown(&self, deadline: Duration) {
        let instances = self.instances.read().await;
        futures::future::join_all(instances.values().map(|(_, instance)| instance.stop(deadline))).await;
    }

    pub async fn health(&self, name: &str) -> Result<HealthReport, DomainError> {
        let instances = self.instances.read().await;
        match instances.get(name) {
            Some((_, instance)) => Ok(instance.health().await),
            None => Err(DomainError::not_found(format!("no integration named {name:?} is running"))),
        }
    }

    /// Runs `probe` on every instance currently `healthy` or
    /// `degraded`, driving the `healthy <-> degraded` edges. Intended
    /// to be called on a fixed interval (≈30s) by the caller.
    pub async fn probe_all(&self) {
        let instances = self.instances.read().await;
        futures::future::join_all(instances.values().map(|(_, instance)| instance.probe())).await;
    }

    /// Snapshot of instances in `healthy` or `degraded` state, paired
    /// with a handle to their client for services to issue queries
    /// against.
    pub async fn healthy_instances(&self) -> Vec<Arc<Instance>> {
        let instances = self.instances.read().await;
        let mut healthy = Vec::new();
        for (_, instance) in instances.values() {
            if instance.state().await.is_healthy_or_degraded() {
                healthy.push(Arc::clone(instance));
            }
        }
        healthy
    }

    pub async fn instance(&self, name: &str) -> Option<Arc<Instance>> {
        self.instances.read().await.get(name).map(|(_, instance)| Arc::clone(instance))
    }

    /// `{name -> HealthReport}` for every instance currently running,
    /// the snapshot `GET /health` reduces to an overall status.
    pub async fn health_reports(&self) -> IndexMap<String, HealthReport> {
        let instances = self.instances.read().await;
        let mut reports = IndexMap::new();
        for (name, (_, instance)) in instances.iter() {
            reports.insert(name.clone(), instance.health().await);
        }
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn config(name: &str, enabled: bool) -> IntegrationConfig {
        IntegrationConfig {
            name: name.to_string(),
            kind: "logstore-mock".into(),
            enabled,
            endpoint: "https://logs.example.com".into(),
            credential_ref: None,
            options: IndexMap::new(),
            date_added: Utc::now(),
        }
    }

    fn manager() -> Arc<LifecycleManager> {
        let registry = Arc::new(Registry::load());
        let secrets = Arc::new(SecretResolver::disconnected());
        LifecycleManager::new(registry, secrets, PipelineConfig::new(16, 4, Duration::from_millis(50)))
    }

    #[tokio::test]
    async fn reconcile_starts_enabled_instances() {
        let manager = manager();
        manager.reconcile(vec![config("a", true)]).await;
        assert!(manager.instance("a").await.is_some());
        let health = manager.health("a").await.unwrap();
        assert!(health.state.is_healthy_or_degraded());
    }

    #[tokio::test]
    async fn second_identical_reconcile_does_not_restart() {
        let manager = manager();
        manager.reconcile(vec![config("a", true)]).await;
        let first = manager.instance("a").await.unwrap();
        manager.reconcile(vec![config("a", true)]).await;
        let second = manager.instance("a").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn disabling_a_config_stops_its_instance() {
        let manager = manager();
        manager.reconcile(vec![config("a", true)]).await;
        manager.reconcile(vec![config("a", false)]).await;
        assert!(manager.instance("a").await.is_none());
    }

    #[tokio::test]
    async fn changed_config_restarts_the_instance() {
        let manager = manager();
        manager.reconcile(vec![config("a", true)]).await;
        let first = manager.instance("a").await.unwrap();

        let mut changed = config("a", true);
        changed.endpoint = "https://other.example.com".into();
        manager.reconcile(vec![changed]).await;
        let second = manager.instance("a").await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }
}
