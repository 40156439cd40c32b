//! Drives the config store, lifecycle manager, and health reduction
//! together the way `App` wires them at boot, exercising the hot-reload
//! scenario end to end: editing the on-disk config file brings the
//! running integration set into agreement without a restart, and the
//! server-wide health readout reflects it.

use std::time::Duration;

use chrono::Utc;
use indexmap::IndexMap;
use spectre::config::{ConfigStore, IntegrationConfig};
use spectre::health::OverallStatus;
use spectre::integrations::LifecycleManager;
use spectre::registry::Registry;
use spectre::secrets::SecretResolver;
use spectre_buffers::PipelineConfig;
use std::sync::Arc;

fn sample(name: &str) -> IntegrationConfig {
    IntegrationConfig {
        name: name.to_string(),
        kind: "logstore-mock".into(),
        enabled: true,
        endpoint: "https://logs.example.com".into(),
        credential_ref: None,
        options: IndexMap::new(),
        date_added: Utc::now(),
    }
}

fn test_pipeline_config() -> PipelineConfig {
    PipelineConfig::new(16, 4, Duration::from_millis(50))
}

#[tokio::test]
async fn store_mutation_reconciles_into_a_running_instance() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("integrations.yaml");
    let store = ConfigStore::open(&path).await.unwrap();

    let registry = Arc::new(Registry::load());
    let secrets = Arc::new(SecretResolver::disconnected());
    let lifecycle = LifecycleManager::new(registry, secrets, test_pipeline_config());

    lifecycle.reconcile(store.list().await).await;
    assert_eq!(OverallStatus::from_reports([].iter()), OverallStatus::Healthy);

    store.create(sample("prod-logs")).await.unwrap();
    lifecycle.reconcile(store.list().await).await;

    let instance = lifecycle.instance("prod-logs").await.expect("instance started after reconcile");
    let health = lifecycle.health("prod-logs").await.unwrap();
    assert!(health.state.is_healthy_or_degraded());

    // A second reconcile against the same persisted state must not
    // restart the instance: "Reconcile(S); Reconcile(S)" is a no-op.
    lifecycle.reconcile(store.list().await).await;
    let still_same = lifecycle.instance("prod-logs").await.unwrap();
    assert!(Arc::ptr_eq(&instance, &still_same));
}

#[tokio::test]
async fn disabling_then_deleting_an_integration_tears_it_down() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("integrations.yaml");
    let store = ConfigStore::open(&path).await.unwrap();

    let registry = Arc::new(Registry::load());
    let secrets = Arc::new(SecretResolver::disconnected());
    let lifecycle = LifecycleManager::new(registry, secrets, test_pipeline_config());

    store.create(sample("prod-logs")).await.unwrap();
    lifecycle.reconcile(store.list().await).await;
    assert!(lifecycle.instance("prod-logs").await.is_some());

    let mut disabled = sample("prod-logs");
    disabled.enabled = false;
    store.update("prod-logs", disabled).await.unwrap();
    lifecycle.reconcile(store.list().await).await;
    assert!(lifecycle.instance("prod-logs").await.is_none());

    store.delete("prod-logs").await.unwrap();
    lifecycle.reconcile(store.list().await).await;
    assert!(store.get("prod-logs").await.is_none());
}

#[tokio::test]
async fn unknown_kind_is_rejected_before_it_reaches_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("integrations.yaml");
    let store = ConfigStore::open(&path).await.unwrap();

    let registry = Registry::load();
    let mut bogus = sample("prod-logs");
    bogus.kind = "logstore-carrier-pigeon".into();

    let known_kinds = registry.known_kinds();
    assert!(spectre::config::validate(&bogus, &known_kinds).is_err());
    assert!(store.list().await.is_empty());
}
