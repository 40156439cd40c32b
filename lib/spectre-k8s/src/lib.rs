//! A Kubernetes shared-informer-style secret watch: one long-running
//! watch per distinct secret name, de-duplicated by reference
//! counting, feeding a local read-through cache the secret resolver
//! consults synchronously.

pub mod mock;
pub mod secret;
pub mod watch;

pub use mock::StaticSecretSource;
pub use secret::{SecretRef, SecretValue};
pub use watch::{KubeSecretSource, NamedWatch, NamedWatchHandle, SecretSource, WatchError, WatchEvent};
