use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::runtime::watcher::{self, Event};
use kube::{Api, Client};
use snafu::Snafu;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;

use crate::secret::SecretValue;

#[derive(Debug, Snafu)]
pub enum WatchError {
    #[snafu(display("timed out waiting for the initial secret cache sync"))]
    NotReady,
}

/// Raised whenever the watched `Secret` object changes. Carries no
/// payload: a `Secret` holds many keys, and a `NamedWatch` is shared
/// by every resolver interested in any of them, so subscribers
/// re-resolve their specific key via [`NamedWatch::get`] after
/// observing this signal rather than being handed a value here.
#[derive(Debug, Clone, Copy)]
pub enum WatchEvent {
    Changed,
    Removed,
}

/// What the secret resolver needs from one named watch, independent
/// of whether it is backed by a live cluster informer or a test
/// double. [`NamedWatch`] is the only production implementation.
#[async_trait]
pub trait NamedWatchHandle: Send + Sync {
    fn get(&self, key: &str) -> Option<SecretValue>;
    async fn wait_ready(&self, timeout: Duration) -> Result<(), WatchError>;
    fn subscribe(&self) -> broadcast::Receiver<WatchEvent>;
}

/// Where the secret resolver gets its per-secret watches from.
/// [`KubeSecretSource`] is the in-cluster implementation; tests use
/// [`crate::mock::StaticSecretSource`] to exercise rotation handling
/// without a live API server.
pub trait SecretSource: Send + Sync {
    fn watch(&self, secret_name: &str) -> Arc<dyn NamedWatchHandle>;

    /// Reclaims any per-secret watch no longer referenced by a live
    /// caller. A no-op unless the source actually holds long-running
    /// per-key resources; [`KubeSecretSource`] is the only
    /// implementation that overrides it.
    fn sweep(&self) {}
}

/// One long-running watch over a single Kubernetes `Secret` object,
/// keyed by name within the resolver's namespace. Shared by reference
/// count across every caller resolving credentials from that secret;
/// the resolver sweeps entries whose only remaining reference is the
/// map's own once they go cold.
pub struct NamedWatch {
    data: std::sync::RwLock<Option<BTreeMap<String, Vec<u8>>>>,
    version: AtomicU64,
    synced: AtomicBool,
    ready: Notify,
    rotations: broadcast::Sender<WatchEvent>,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Drop for NamedWatch {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().expect("watch task lock poisoned").take() {
            task.abort();
        }
    }
}

impl NamedWatch {
    fn spawn(client: Client, namespace: String, secret_name: String) -> Arc<Self> {
        let watch = Arc::new(Self {
            data: std::sync::RwLock::new(None),
            version: AtomicU64::new(0),
            synced: AtomicBool::new(false),
            ready: Notify::new(),
            rotations: broadcast::channel(16).0,
            task: std::sync::Mutex::new(None),
        });

        let watch_for_task = Arc::clone(&watch);
        let handle = tokio::spawn(async move {
            run_watch(client, namespace, secret_name, watch_for_task).await;
        });
        *watch.task.lock().expect("watch task lock poisoned") = Some(handle);
        watch
    }

    fn apply(&self, secret: &Secret) {
        let map: BTreeMap<String, Vec<u8>> = secret
            .data
            .as_ref()
            .map(|d| d.iter().map(|(k, v)| (k.clone(), v.0.clone())).collect())
            .unwrap_or_default();
        *self.data.write().expect("secret cache lock poisoned") = Some(map);
        self.version.fetch_add(1, Ordering::SeqCst);
        let _ = self.rotations.send(WatchEvent::Changed);
    }

    fn remove(&self) {
        *self.data.write().expect("secret cache lock poisoned") = None;
        let _ = self.rotations.send(WatchEvent::Removed);
    }

    fn mark_synced(&self) {
        self.synced.store(true, Ordering::SeqCst);
        self.ready.notify_waiters();
    }
}

#[async_trait]
impl NamedWatchHandle for NamedWatch {
    fn get(&self, key: &str) -> Option<SecretValue> {
        let guard = self.data.read().expect("secret cache lock poisoned");
        let map = guard.as_ref()?;
        let bytes = map.get(key)?.clone();
        Some(SecretValue {
            bytes,
            version: self.version.load(Ordering::SeqCst),
        })
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<(), WatchError> {
        if self.synced.load(Ordering::SeqCst) {
            return Ok(());
        }
        let wait = self.ready.notified();
        match tokio::time::timeout(timeout, wait).await {
            Ok(()) => Ok(()),
            Err(_) => {
                if self.synced.load(Ordering::SeqCst) {
                    Ok(())
                } else {
                    Err(WatchError::NotReady)
                }
            }
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.rotations.subscribe()
    }
}

async fn run_watch(client: Client, namespace: String, secret_name: String, watch: Arc<NamedWatch>) {
    let api: Api<Secret> = Api::namespaced(client, &namespace);
    let config = watcher::Config::default().fields(&format!("metadata.name={secret_name}"));
    let mut stream = Box::pin(watcher::watcher(api, config));

    loop {
        match stream.next().await {
            Some(Ok(Event::Apply(secret) | Event::InitApply(secret))) => {
                watch.apply(&secret);
            }
            Some(Ok(Event::Delete(_secret))) => {
                watch.remove();
            }
            Some(Ok(Event::Init)) => {}
            Some(Ok(Event::InitDone)) => {
                watch.mark_synced();
            }
            Some(Err(error)) => {
                tracing::warn!(
                    secret = %secret_name,
                    namespace = %namespace,
                    %error,
                    "kubernetes secret watch error, retrying"
                );
            }
            None => break,
        }
    }
}

/// Read-through, reference-counted registry of per-secret watches for
/// one namespace. One [`NamedWatch`] task runs per distinct secret
/// name regardless of how many `(secret_name, key)` pairs are resolved
/// against it.
pub struct KubeSecretSource {
    client: Client,
    namespace: String,
    watches: DashMap<String, Arc<NamedWatch>>,
}

impl KubeSecretSource {
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            watches: DashMap::new(),
        }
    }

    /// Drops any watch whose only remaining strong reference is the
    /// one held by this map, i.e. no resolver cache entry still
    /// references it. Intended to run on a periodic timer.
    pub fn sweep(&self) {
        self.watches.retain(|_, watch| Arc::strong_count(watch) > 1);
    }
}

impl SecretSource for KubeSecretSource {
    /// Returns the shared watch for `secret_name`, spawning it on
    /// first use. The caller is expected to hold onto the returned
    /// `Arc` for as long as it needs live rotations; once external
    /// holders drop it, `sweep` reclaims the entry.
    fn watch(&self, secret_name: &str) -> Arc<dyn NamedWatchHandle> {
        let watch: Arc<NamedWatch> = self
            .watches
            .entry(secret_name.to_string())
            .or_insert_with(|| {
                NamedWatch::spawn(self.client.clone(), self.namespace.clone(), secret_name.to_string())
            })
            .clone();
        watch
    }

    fn sweep(&self) {
        KubeSecretSource::sweep(self);
    }
}
