use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use indexmap::IndexMap;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use snafu::{ResultExt, Snafu};
use spectre_common::{DomainError, ErrorKind, HasKind};
use tokio::sync::{broadcast, RwLock};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tracing::{error, warn};

use super::model::{ChangeEvent, IntegrationConfig};

const CHANGE_CHANNEL_CAPACITY: usize = 64;
const DEBOUNCE: Duration = Duration::from_millis(200);

#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("failed to read config file {path:?}: {source}"))]
    Read { path: PathBuf, source: io::Error },
    #[snafu(display("failed to decode config file {path:?}: {source}"))]
    Codec { path: PathBuf, source: serde_yaml::Error },
    #[snafu(display("failed to persist config file {path:?}: {source}"))]
    Write { path: PathBuf, source: io::Error },
    #[snafu(display("failed to install a filesystem watch on {path:?}: {source}"))]
    Watch { path: PathBuf, source: notify::Error },
    #[snafu(display("integration {name:?} already exists"))]
    AlreadyExists { name: String },
    #[snafu(display("integration {name:?} does not exist"))]
    NotFound { name: String },
}

impl HasKind for ConfigError {
    fn kind(&self) -> ErrorKind {
        match self {
            ConfigError::AlreadyExists { .. } => ErrorKind::Validation,
            ConfigError::NotFound { .. } => ErrorKind::NotFound,
            ConfigError::Read { .. } | ConfigError::Codec { .. } => ErrorKind::Fatal,
            ConfigError::Write { .. } | ConfigError::Watch { .. } => ErrorKind::TransientBackend,
        }
    }
}

impl From<ConfigError> for DomainError {
    fn from(e: ConfigError) -> Self {
        DomainError::new(e.kind(), e.to_string())
    }
}

/// The durable record of every configured integration, backed by a
/// single YAML document on disk. Holds the file's content in memory,
/// persists every mutation atomically (temp file, fsync, rename into
/// place), and watches the document's directory so edits made outside
/// the process - a projected ConfigMap update, an operator editing the
/// file directly - are picked up and diffed in. `create`/`update`/
/// `delete` reload through that same diff-and-swap path so self-edits
/// and external edits publish identically shaped change events.
pub struct ConfigStore {
    path: PathBuf,
    state: RwLock<IndexMap<String, IntegrationConfig>>,
    changes: broadcast::Sender<ChangeEvent>,
    watcher: std::sync::Mutex<Option<RecommendedWatcher>>,
}

impl ConfigStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Arc<Self>, ConfigError> {
        let path = path.into();
        let initial = load_from_disk(&path)?;
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let store = Arc::new(Self {
            path,
            state: RwLock::new(initial),
            changes,
            watcher: std::sync::Mutex::new(None),
        });
        store.spawn_watcher()?;
        Ok(store)
    }

    pub async fn list(&self) -> Vec<IntegrationConfig> {
        self.state.read().await.values().cloned().collect()
    }

    pub async fn get(&self, name: &str) -> Option<IntegrationConfig> {
        self.state.read().await.get(name).cloned()
    }

    pub async fn create(&self, config: IntegrationConfig) -> Result<(), ConfigError> {
        let state = self.state.read().await;
        if state.contains_key(&config.name) {
            return Err(ConfigError::AlreadyExists { name: config.name });
        }
        drop(state);
        self.write_and_diff(move |next| {
            next.insert(config.name.clone(), config);
        })
        .await
    }

    pub async fn update(&self, name: &str, config: IntegrationConfig) -> Result<(), ConfigError> {
        let state = self.state.read().await;
        if !state.contains_key(name) {
            return Err(ConfigError::NotFound { name: name.to_string() });
        }
        drop(state);
        let name = name.to_string();
        self.write_and_diff(move |next| {
            next.insert(name, config);
        })
        .await
    }

    pub async fn delete(&self, name: &str) -> Result<(), ConfigError> {
        let state = self.state.read().await;
        if !state.contains_key(name) {
            return Err(ConfigError::NotFound { name: name.to_string() });
        }
        drop(state);
        let name = name.to_string();
        self.write_and_diff(move |next| {
            next.shift_remove(&name);
        })
        .await
    }

    pub fn watch(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }

    /// The same subscription as [`Self::watch`], adapted to the
    /// `stream<ChangeEvent>` shape §4.1's contract is written against.
    /// A lagged subscriber silently drops the events it missed rather
    /// than erroring the stream - the lifecycle manager always
    /// re-reconciles against `list()`'s current state on the next
    /// event anyway, so a gap here costs a delayed reconcile, not a
    /// missed one.
    pub fn watch_stream(&self) -> impl Stream<Item = ChangeEvent> {
        BroadcastStream::new(self.watch()).filter_map(|item| match item {
            Ok(event) => Some(event),
            Err(BroadcastStreamRecvError::Lagged(_)) => None,
        })
    }

    /// Applies `mutate` to a clone of the current state, persists the
    /// result, diffs it against the pre-mutation state, and swaps it
    /// in - the single path every write (self-originated or, via
    /// `reload`, filesystem-originated) goes through.
    async fn write_and_diff(&self, mutate: impl FnOnce(&mut IndexMap<String, IntegrationConfig>)) -> Result<(), ConfigError> {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        mutate(&mut next);
        persist(&self.path, next.values())?;
        diff_and_emit(&self.changes, &state, &next);
        *state = next;
        Ok(())
    }

    async fn reload(&self) {
        match load_from_disk(&self.path) {
            Ok(next) => {
                let mut state = self.state.write().await;
                diff_and_emit(&self.changes, &state, &next);
                *state = next;
            }
            Err(e) => error!(error = %e, "failed to reload config after filesystem change"),
        }
    }

    fn spawn_watcher(self: &Arc<Self>) -> Result<(), ConfigError> {
        let (tx, rx) = std::sync::mpsc::channel::<notify::Result<Event>>();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })
        .context(WatchSnafu { path: self.path.clone() })?;
        let watch_dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .context(WatchSnafu { path: self.path.clone() })?;
        *self.watcher.lock().unwrap() = Some(watcher);

        let store = Arc::clone(self);
        tokio::task::spawn_blocking(move || watch_loop(store, rx));
        Ok(())
    }
}

fn diff_and_emit(
    changes: &broadcast::Sender<ChangeEvent>,
    current: &IndexMap<String, IntegrationConfig>,
    next: &IndexMap<String, IntegrationConfig>,
) {
    for name in current.keys() {
        if !next.contains_key(name) {
            let _ = changes.send(ChangeEvent::Removed(name.clone()));
        }
    }
    for (name, config) in next {
        match current.get(name) {
            None => {
                let _ = changes.send(ChangeEvent::Added(name.clone()));
            }
            Some(existing) if !existing.reconcile_eq(config) => {
                let _ = changes.send(ChangeEvent::Updated(name.clone()));
            }
            _ => {}
        }
    }
}

/// Runs on a blocking-pool thread for the store's lifetime, debouncing
/// bursts of filesystem events (an editor's write-then-rename, a
/// kubelet ConfigMap projection swap) into a single reload.
fn watch_loop(store: Arc<ConfigStore>, rx: std::sync::mpsc::Receiver<notify::Result<Event>>) {
    let mut pending = false;
    loop {
        let timeout = if pending { DEBOUNCE } else { Duration::from_secs(3600) };
        match rx.recv_timeout(timeout) {
            Ok(Ok(event)) => {
                if is_relevant(&event, &store.path) {
                    pending = true;
                }
            }
            Ok(Err(e)) => warn!(error = %e, "filesystem watch error"),
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                if pending {
                    pending = false;
                    tokio::runtime::Handle::current().block_on(store.reload());
                }
            }
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn is_relevant(event: &Event, path: &Path) -> bool {
    let canonical = path.canonicalize();
    matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
    ) && event
        .paths
        .iter()
        .any(|p| p == path || canonical.as_deref().ok() == p.canonicalize().ok().as_deref())
}

fn load_from_disk(path: &Path) -> Result<IndexMap<String, IntegrationConfig>, ConfigError> {
    if !path.exists() {
        return Ok(IndexMap::new());
    }
    let raw = std::fs::read_to_string(path).context(ReadSnafu { path: path.to_path_buf() })?;
    let list: Vec<IntegrationConfig> =
        serde_yaml::from_str(&raw).context(CodecSnafu { path: path.to_path_buf() })?;
    Ok(list.into_iter().map(|c| (c.name.clone(), c)).collect())
}

fn persist<'a>(
    path: &Path,
    configs: impl Iterator<Item = &'a IntegrationConfig>,
) -> Result<(), ConfigError> {
    let list: Vec<&IntegrationConfig> = configs.collect();
    let yaml = serde_yaml::to_string(&list).context(CodecSnafu { path: path.to_path_buf() })?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).context(WriteSnafu { path: path.to_path_buf() })?;
    let mut tmp =
        tempfile::NamedTempFile::new_in(dir).context(WriteSnafu { path: path.to_path_buf() })?;
    tmp.write_all(yaml.as_bytes())
        .context(WriteSnafu { path: path.to_path_buf() })?;
    tmp.as_file()
        .sync_all()
        .context(WriteSnafu { path: path.to_path_buf() })?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .context(WriteSnafu { path: path.to_path_buf() })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

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

    #[tokio::test]
    async fn create_persists_and_is_readable_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("integrations.yaml");

        let store = ConfigStore::open(&path).await.unwrap();
        store.create(sample("prod-logs")).await.unwrap();
        assert_eq!(store.list().await.len(), 1);

        let reopened = ConfigStore::open(&path).await.unwrap();
        assert_eq!(reopened.get("prod-logs").await.unwrap().kind, "logstore-mock");
    }

    #[tokio::test]
    async fn create_twice_is_already_exists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("integrations.yaml");
        let store = ConfigStore::open(&path).await.unwrap();
        store.create(sample("prod-logs")).await.unwrap();
        let err = store.create(sample("prod-logs")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn create_then_update_publishes_added_then_updated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("integrations.yaml");
        let store = ConfigStore::open(&path).await.unwrap();
        let mut rx = store.watch();

        store.create(sample("prod-logs")).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), ChangeEvent::Added("prod-logs".into()));

        let mut updated = sample("prod-logs");
        updated.enabled = false;
        store.update("prod-logs", updated).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), ChangeEvent::Updated("prod-logs".into()));
    }

    #[tokio::test]
    async fn identical_update_publishes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("integrations.yaml");
        let store = ConfigStore::open(&path).await.unwrap();
        let mut rx = store.watch();

        store.create(sample("prod-logs")).await.unwrap();
        rx.recv().await.unwrap();
        store.update("prod-logs", sample("prod-logs")).await.unwrap();
        assert!(matches!(
            rx.try_recv(),
            Err(tokio::sync::broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn update_unknown_name_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("integrations.yaml");
        let store = ConfigStore::open(&path).await.unwrap();
        let err = store.update("absent", sample("absent")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn delete_unknown_name_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("integrations.yaml");
        let store = ConfigStore::open(&path).await.unwrap();
        let err = store.delete("absent").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn delete_publishes_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("integrations.yaml");
        let store = ConfigStore::open(&path).await.unwrap();
        let mut rx = store.watch();
        store.create(sample("prod-logs")).await.unwrap();
        rx.recv().await.unwrap();
        store.delete("prod-logs").await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), ChangeEvent::Removed("prod-logs".into()));
        assert!(store.get("prod-logs").await.is_none());
    }
}
