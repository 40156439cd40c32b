//! An in-memory stand-in for [`crate::watch::KubeSecretSource`], used by
//! tests elsewhere in the workspace to exercise secret resolution and
//! rotation handling without a live API server.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::secret::SecretValue;
use crate::watch::{NamedWatchHandle, SecretSource, WatchError, WatchEvent};

/// A single named watch backed by a plain map instead of a cluster
/// informer. Starts ready immediately; [`StaticSecretSource::rotate`]
/// and [`StaticSecretSource::remove`] drive further changes.
struct StaticWatch {
    data: Mutex<Option<HashMap<String, Vec<u8>>>>,
    version: AtomicU64,
    rotations: broadcast::Sender<WatchEvent>,
}

#[async_trait]
impl NamedWatchHandle for StaticWatch {
    fn get(&self, key: &str) -> Option<SecretValue> {
        let guard = self.data.lock().expect("mock secret cache lock poisoned");
        let map = guard.as_ref()?;
        let bytes = map.get(key)?.clone();
        Some(SecretValue { bytes, version: self.version.load(Ordering::SeqCst) })
    }

    async fn wait_ready(&self, _timeout: Duration) -> Result<(), WatchError> {
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.rotations.subscribe()
    }
}

/// Pre-populated, always-ready [`SecretSource`] for tests. Each call to
/// [`StaticSecretSource::rotate`] replaces a secret's contents and
/// notifies existing subscribers, mirroring the single `Changed` signal
/// a real `NamedWatch` emits on apply.
#[derive(Default)]
pub struct StaticSecretSource {
    watches: Mutex<HashMap<String, Arc<StaticWatch>>>,
}

impl StaticSecretSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn watch_for(&self, secret_name: &str) -> Arc<StaticWatch> {
        self.watches
            .lock()
            .expect("mock secret source lock poisoned")
            .entry(secret_name.to_string())
            .or_insert_with(|| {
                Arc::new(StaticWatch {
                    data: Mutex::new(None),
                    version: AtomicU64::new(0),
                    rotations: broadcast::channel(16).0,
                })
            })
            .clone()
    }

    /// Seeds or replaces the contents of `secret_name`, bumping its
    /// version and notifying anyone subscribed to rotations.
    pub fn rotate(&self, secret_name: &str, data: HashMap<String, Vec<u8>>) {
        let watch = self.watch_for(secret_name);
        *watch.data.lock().expect("mock secret cache lock poisoned") = Some(data);
        watch.version.fetch_add(1, Ordering::SeqCst);
        let _ = watch.rotations.send(WatchEvent::Changed);
    }

    /// Simulates the backing `Secret` object being deleted.
    pub fn remove(&self, secret_name: &str) {
        let watch = self.watch_for(secret_name);
        *watch.data.lock().expect("mock secret cache lock poisoned") = None;
        let _ = watch.rotations.send(WatchEvent::Removed);
    }
}

impl SecretSource for StaticSecretSource {
    fn watch(&self, secret_name: &str) -> Arc<dyn NamedWatchHandle> {
        self.watch_for(secret_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rotate_updates_value_and_bumps_version() {
        let source = StaticSecretSource::new();
        source.rotate("db-creds", HashMap::from([("password".to_string(), b"hunter2".to_vec())]));

        let watch = source.watch("db-creds");
        watch.wait_ready(Duration::from_secs(1)).await.unwrap();
        let value = watch.get("password").expect("seeded key present");
        assert_eq!(value.bytes, b"hunter2");
        assert_eq!(value.version, 1);

        source.rotate("db-creds", HashMap::from([("password".to_string(), b"hunter3".to_vec())]));
        let value = watch.get("password").expect("rotated key present");
        assert_eq!(value.bytes, b"hunter3");
        assert_eq!(value.version, 2);
    }

    #[tokio::test]
    async fn subscribers_observe_rotation_events() {
        let source = StaticSecretSource::new();
        let watch = source.watch("api-key");
        let mut rx = watch.subscribe();

        source.rotate("api-key", HashMap::from([("token".to_string(), b"abc".to_vec())]));
        let event = rx.recv().await.expect("rotation broadcast");
        assert!(matches!(event, WatchEvent::Changed));

        source.remove("api-key");
        let event = rx.recv().await.expect("removal broadcast");
        assert!(matches!(event, WatchEvent::Removed));
        assert!(watch.get("token").is_none());
    }

    #[tokio::test]
    async fn missing_secret_returns_none_without_blocking() {
        let source = StaticSecretSource::new();
        let watch = source.watch("never-seeded");
        watch.wait_ready(Duration::from_secs(1)).await.unwrap();
        assert!(watch.get("anything").is_none());
    }
}
