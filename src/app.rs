use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;
use spectre_buffers::PipelineConfig;
use spectre_common::ShutdownSignal;
use spectre_k8s::KubeSecretSource;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::cli::ServerArgs;
use crate::config::{ConfigStore, IntegrationConfig};
use crate::integrations::LifecycleManager;
use crate::registry::Registry;
use crate::secrets::SecretResolver;
use crate::services::Services;

/// Everything that can abort the server before it reaches `0 clean
/// shutdown`, mapped onto the two non-zero exit codes the CLI
/// contract names: configuration-content problems the operator must
/// fix in `integrations.yaml` itself, versus infrastructure failures
/// (can't read the file at all, can't bind the listening socket).
#[derive(Debug)]
pub enum AppError {
    /// A loaded `integrations.yaml` entry fails validation against the
    /// running registry - unknown `kind`, bad `endpoint`, duplicate
    /// `name`. Exit code 1.
    Config(String),
    /// Everything else that prevents the server from reaching a
    /// servable state: the file can't be read/parsed, the listen
    /// address can't be bound, the registry panics on duplicate
    /// `kind`s. Exit code 2.
    Fatal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(msg) => write!(f, "configuration error: {msg}"),
            AppError::Fatal(msg) => write!(f, "fatal startup failure: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

/// A fully wired, not-yet-serving instance: every component from the
/// boot sequence (load config, consult registry, reconcile, watch,
/// bind) has already run. [`App::run`] is the only thing left to do.
pub struct App {
    listener: TcpListener,
    router: axum::Router,
    lifecycle: Arc<LifecycleManager>,
    shutdown: ShutdownSignal,
    shutdown_deadline: Duration,
    background: Vec<JoinHandle<()>>,
}

impl App {
    /// Runs the boot sequence: load config, consult the factory
    /// registry, validate every loaded entry, resolve secrets, bring
    /// up the lifecycle manager's initial reconcile, spawn the
    /// background config-watch and health-probe loops, and bind the
    /// HTTP listener. Nothing is served yet.
    pub async fn bootstrap(args: &ServerArgs) -> Result<Self, AppError> {
        let listen_addr: SocketAddr = args
            .listen
            .parse()
            .map_err(|e| AppError::Fatal(format!("invalid --listen address {:?}: {e}", args.listen)))?;

        let config_store = ConfigStore::open(args.config_path())
            .await
            .map_err(|e| AppError::Fatal(format!("failed to open config store: {e}")))?;

        let registry = Arc::new(Registry::load());
        validate_loaded_configs(&config_store.list().await, &registry)?;

        let secrets = Arc::new(resolve_secret_source(&args.secret_namespace).await);
        let lifecycle = LifecycleManager::new(Arc::clone(&registry), Arc::clone(&secrets), PipelineConfig::default());

        info!(config_dir = %args.config_dir.display(), "reconciling initial integration set");
        lifecycle.reconcile(config_store.list().await).await;

        let shutdown = ShutdownSignal::new();
        let mut background = Vec::new();
        background.push(spawn_config_watch_loop(Arc::clone(&config_store), Arc::clone(&lifecycle), shutdown.child()));
        background.push(spawn_probe_loop(Arc::clone(&lifecycle), shutdown.child()));
        background.push(spawn_secret_sweep_loop(secrets, shutdown.child()));

        let metrics_handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| AppError::Fatal(format!("failed to install metrics recorder: {e}")))?;

        let services = Services::new(Arc::clone(&lifecycle), shutdown.child());
        let state = crate::api::AppState::new(
            config_store,
            Arc::clone(&registry),
            Arc::clone(&lifecycle),
            services,
            shutdown.clone(),
            metrics_handle,
        );
        let router = crate::api::build_router(state);

        let listener = TcpListener::bind(listen_addr)
            .await
            .map_err(|e| AppError::Fatal(format!("failed to bind {listen_addr}: {e}")))?;
        info!(addr = %listen_addr, "listening");

        Ok(Self {
            listener,
            router,
            lifecycle,
            shutdown,
            shutdown_deadline: Duration::from_secs(args.shutdown_deadline_secs),
            background,
        })
    }

    /// Serves until a shutdown signal (SIGINT/SIGTERM or an explicit
    /// call to the returned [`ShutdownSignal`]) arrives, then cascades
    /// §5's shutdown sequence: signal in-flight requests, stop every
    /// integration with the configured deadline, abort the background
    /// loops, and return.
    pub async fn run(self) -> Result<(), AppError> {
        let shutdown_for_server = self.shutdown.clone();
        let serve_result = axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move {
                wait_for_shutdown_signal().await;
                shutdown_for_server.signal();
            })
            .await;

        if let Err(e) = serve_result {
            error!(error = %e, "HTTP server exited with an error");
        }

        info!(deadline_secs = self.shutdown_deadline.as_secs(), "shutting down integrations");
        self.lifecycle.shutdown(self.shutdown_deadline).await;
        for task in self.background {
            task.abort();
        }
        Ok(())
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }
}

/// Validates every config loaded at boot against the registry's known
/// kinds, independent of the per-write validation `Upsert` already
/// performs - a file edited by hand (or a kind whose factory was
/// removed between releases) is caught here as a startup configuration
/// error (exit 1) rather than surfacing later as a confusing
/// `UnknownKind` from inside `Reconcile`.
fn validate_loaded_configs(configs: &[IntegrationConfig], registry: &Registry) -> Result<(), AppError> {
    let known_kinds = registry.known_kinds();
    for config in configs {
        crate::config::validate(config, &known_kinds).map_err(|e| AppError::Config(format!("{}: {}", config.name, e.message)))?;
    }
    Ok(())
}

/// Attempts to reach the in-cluster API server and stand up a secret
/// resolver backed by it; falls back to a permanently-`NotReady`
/// resolver (§8's "Secret resolver `NotReady` at `Start`" boundary
/// behavior) when no cluster is reachable, which is the expected case
/// for local development and most test environments.
async fn resolve_secret_source(namespace: &str) -> SecretResolver {
    match kube::Client::try_default().await {
        Ok(client) => {
            info!(namespace, "connected to Kubernetes API; secret resolver is live");
            SecretResolver::new(Arc::new(KubeSecretSource::new(client, namespace.to_string())))
        }
        Err(e) => {
            warn!(error = %e, "no Kubernetes client available; secret resolver will report NotReady");
            SecretResolver::disconnected()
        }
    }
}

/// Reconciles the running instance set every time the config store
/// observes a change, whether it originated from a REST write or an
/// external edit to `integrations.yaml` - the single path §4.4
/// requires ("mutations from REST calls are serialized through the
/// config store's watch stream rather than applied directly").
fn spawn_config_watch_loop(
    config_store: Arc<ConfigStore>,
    lifecycle: Arc<LifecycleManager>,
    shutdown: ShutdownSignal,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut changes = config_store.watch();
        loop {
            tokio::select! {
                biased;
                () = shutdown.signalled() => break,
                event = changes.recv() => {
                    match event {
                        Ok(change) => {
                            info!(name = change.name(), "config change observed; reconciling");
                            lifecycle.reconcile(config_store.list().await).await;
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "config watch lagged; reconciling against current state");
                            lifecycle.reconcile(config_store.list().await).await;
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
    })
}

const PROBE_INTERVAL: Duration = Duration::from_secs(30);

/// Drives the `healthy <-> degraded` edges of §4.4's state machine on
/// a fixed interval for as long as the server runs.
fn spawn_probe_loop(lifecycle: Arc<LifecycleManager>, shutdown: ShutdownSignal) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                () = shutdown.signalled() => break,
                _ = tokio::time::sleep(PROBE_INTERVAL) => lifecycle.probe_all().await,
            }
        }
    })
}

const SECRET_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Reclaims per-secret watches no longer held by any live resolver
/// caller, on the same fixed-interval shape as the health-probe loop.
fn spawn_secret_sweep_loop(secrets: Arc<SecretResolver>, shutdown: ShutdownSignal) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                () = shutdown.signalled() => break,
                _ = tokio::time::sleep(SECRET_SWEEP_INTERVAL) => secrets.sweep(),
            }
        }
    })
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
