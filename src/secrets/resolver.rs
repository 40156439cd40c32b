use std::sync::Arc;
use std::time::Duration;

use snafu::Snafu;
use spectre_common::{DomainError, ErrorKind, HasKind};
use spectre_k8s::{SecretSource, SecretValue, WatchEvent};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;

use crate::config::CredentialRef;

const DEFAULT_WARMUP_TIMEOUT: Duration = Duration::from_secs(5);
const ROTATION_CHANNEL_CAPACITY: usize = 16;

/// A rotation of one `credentialRef`'s resolved value, as observed by
/// `SecretResolver::watch`.
#[derive(Debug, Clone)]
pub enum Rotation {
    Updated(SecretValue),
    Removed,
}

#[derive(Debug, Snafu)]
pub enum ResolveError {
    #[snafu(display("secret {secret_name:?} has not synced yet"))]
    NotReady { secret_name: String },
    #[snafu(display("key {key:?} not present in secret {secret_name:?}"))]
    NotFound { secret_name: String, key: String },
}

impl HasKind for ResolveError {
    fn kind(&self) -> ErrorKind {
        match self {
            ResolveError::NotReady { .. } => ErrorKind::NotReady,
            ResolveError::NotFound { .. } => ErrorKind::NotFound,
        }
    }
}

impl From<ResolveError> for DomainError {
    fn from(e: ResolveError) -> Self {
        DomainError::new(e.kind(), e.to_string())
    }
}

/// The read-through cache every `credentialRef` resolves through,
/// backed by one watch per distinct secret name
/// (`spectre_k8s::SecretSource`), shared across every `credentialRef`
/// naming it. Tests substitute `spectre_k8s::mock::StaticSecretSource`
/// for the live cluster informer. A resolver with no source at all is
/// a legitimate, permanently-`NotReady` configuration rather than a
/// special case - it's what a deployment with no in-cluster access
/// (or a test that never exercises a `credentialRef`) gets instead of
/// an `Option` threaded through every caller.
pub struct SecretResolver {
    source: Option<Arc<dyn SecretSource>>,
    warmup_timeout: Duration,
}

impl SecretResolver {
    pub fn new(source: Arc<dyn SecretSource>) -> Self {
        Self {
            source: Some(source),
            warmup_timeout: DEFAULT_WARMUP_TIMEOUT,
        }
    }

    pub fn disconnected() -> Self {
        Self {
            source: None,
            warmup_timeout: DEFAULT_WARMUP_TIMEOUT,
        }
    }

    pub fn with_warmup_timeout(mut self, timeout: Duration) -> Self {
        self.warmup_timeout = timeout;
        self
    }

    /// Reclaims per-secret watches no longer referenced by any live
    /// caller. Intended to run on a periodic timer alongside the
    /// health-probe loop; a no-op when disconnected.
    pub fn sweep(&self) {
        if let Some(source) = &self.source {
            source.sweep();
        }
    }

    /// Resolves a `credentialRef` to its current value. The first call
    /// for a given `secretName` waits for that secret's watch to
    /// complete its initial sync, bounded by `warmup_timeout`; a caller
    /// that sees `NotReady` may still proceed in a degraded state.
    pub async fn resolve(&self, credential_ref: &CredentialRef) -> Result<SecretValue, ResolveError> {
        let Some(source) = &self.source else {
            return Err(ResolveError::NotReady { secret_name: credential_ref.secret_name.clone() });
        };
        let watch = source.watch(&credential_ref.secret_name);
        watch.wait_ready(self.warmup_timeout).await.map_err(|_| ResolveError::NotReady {
            secret_name: credential_ref.secret_name.clone(),
        })?;
        watch.get(&credential_ref.key).ok_or_else(|| ResolveError::NotFound {
            secret_name: credential_ref.secret_name.clone(),
            key: credential_ref.key.clone(),
        })
    }

    /// Subscribes to rotations of one `credentialRef`. Yields an
    /// `Updated` entry whenever the underlying secret changes and the
    /// key still resolves, or `Removed` once it (or the whole secret)
    /// disappears. Dropping the receiver stops the forwarding task on
    /// its next event. With no source, the receiver simply never
    /// yields anything.
    pub fn watch(&self, credential_ref: &CredentialRef) -> mpsc::Receiver<Rotation> {
        let (tx, rx) = mpsc::channel(ROTATION_CHANNEL_CAPACITY);
        let Some(source) = self.source.clone() else {
            return rx;
        };
        let watch = source.watch(&credential_ref.secret_name);
        let mut rotations = watch.subscribe();
        let key = credential_ref.key.clone();
        tokio::spawn(async move {
            loop {
                let rotation = match rotations.recv().await {
                    Ok(WatchEvent::Changed) => match watch.get(&key) {
                        Some(value) => Rotation::Updated(value),
                        None => Rotation::Removed,
                    },
                    Ok(WatchEvent::Removed) => Rotation::Removed,
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                };
                if tx.send(rotation).await.is_err() {
                    break;
                }
            }
        });
        rx
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use spectre_k8s::mock::StaticSecretSource;

    use super::*;

    #[tokio::test]
    async fn disconnected_resolver_reports_not_ready() {
        let resolver = SecretResolver::disconnected();
        let credential_ref = CredentialRef { secret_name: "db".into(), key: "password".into() };
        let err = resolver.resolve(&credential_ref).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotReady);
    }

    #[tokio::test]
    async fn disconnected_resolver_watch_never_yields() {
        let resolver = SecretResolver::disconnected();
        let credential_ref = CredentialRef { secret_name: "db".into(), key: "password".into() };
        let mut rx = resolver.watch(&credential_ref);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn resolve_returns_not_found_before_first_rotation() {
        let source = Arc::new(StaticSecretSource::new());
        let resolver = SecretResolver::new(source);
        let credential_ref = CredentialRef { secret_name: "db".into(), key: "password".into() };
        let err = resolver.resolve(&credential_ref).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn resolve_succeeds_once_mock_source_is_seeded() {
        let source = Arc::new(StaticSecretSource::new());
        source.rotate("db", HashMap::from([("password".to_string(), b"hunter2".to_vec())]));
        let resolver = SecretResolver::new(source);

        let credential_ref = CredentialRef { secret_name: "db".into(), key: "password".into() };
        let value = resolver.resolve(&credential_ref).await.unwrap();
        assert_eq!(value.bytes, b"hunter2");
    }

    #[tokio::test]
    async fn watch_observes_rotation_after_initial_not_found() {
        let source = Arc::new(StaticSecretSource::new());
        let resolver = SecretResolver::new(source.clone());
        let credential_ref = CredentialRef { secret_name: "db".into(), key: "password".into() };

        // Mirrors a degraded instance whose first resolve attempt fails
        // because the secret hasn't been created yet.
        assert!(resolver.resolve(&credential_ref).await.is_err());

        let mut rx = resolver.watch(&credential_ref);
        source.rotate("db", HashMap::from([("password".to_string(), b"hunter2".to_vec())]));

        let rotation = rx.recv().await.expect("rotation delivered");
        match rotation {
            Rotation::Updated(value) => assert_eq!(value.bytes, b"hunter2"),
            Rotation::Removed => panic!("expected an update, got a removal"),
        }
    }
}
