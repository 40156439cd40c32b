use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use spectre_k8s::SecretRef;

/// An indirect credential reference: a secret name and the key within
/// it, resolved to a live value by the secret resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRef {
    pub secret_name: String,
    pub key: String,
}

impl From<&CredentialRef> for SecretRef {
    fn from(value: &CredentialRef) -> Self {
        SecretRef {
            secret_name: value.secret_name.clone(),
            key: value.key.clone(),
        }
    }
}

/// The persisted description of one external backend. `name` is
/// immutable once created and unique within the store; `kind` selects
/// a factory from the registry; `options` is flavor-specific and
/// opaque to everything but the integration it addresses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationConfig {
    pub name: String,
    pub kind: String,
    pub enabled: bool,
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_ref: Option<CredentialRef>,
    #[serde(default)]
    pub options: IndexMap<String, Value>,
    pub date_added: DateTime<Utc>,
}

impl IntegrationConfig {
    /// Compares every field except `date_added`, the comparison
    /// `Reconcile` uses to decide whether a running instance needs to
    /// be restarted for a configuration edit.
    pub fn reconcile_eq(&self, other: &IntegrationConfig) -> bool {
        self.name == other.name
            && self.kind == other.kind
            && self.enabled == other.enabled
            && self.endpoint == other.endpoint
            && self.credential_ref == other.credential_ref
            && self.options == other.options
    }
}

/// One entry in the config store's `Watch()` stream: a config was
/// added, updated, or removed, identified by `name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Added(String),
    Updated(String),
    Removed(String),
}

impl ChangeEvent {
    pub fn name(&self) -> &str {
        match self {
            ChangeEvent::Added(n) | ChangeEvent::Updated(n) | ChangeEvent::Removed(n) => n,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(name: &str, date_added: DateTime<Utc>) -> IntegrationConfig {
        IntegrationConfig {
            name: name.to_string(),
            kind: "logstore-mock".into(),
            enabled: true,
            endpoint: "https://logs.example.com".into(),
            credential_ref: None,
            options: IndexMap::new(),
            date_added,
        }
    }

    proptest::proptest! {
        /// `reconcile_eq` must ignore `date_added` entirely: re-reading
        /// the same persisted row twice (which stamps a fresh
        /// `Utc::now()` nowhere, but a reload path might) can never
        /// register as a change Reconcile needs to act on.
        #[test]
        fn reconcile_eq_ignores_date_added(
            name in "[a-z]{1,12}",
            offset_secs in 0i64..=1_000_000_000,
        ) {
            let base = Utc::now();
            let a = config(&name, base);
            let b = config(&name, base + chrono::Duration::seconds(offset_secs));
            proptest::prop_assert!(a.reconcile_eq(&b));
        }

        #[test]
        fn reconcile_eq_detects_a_changed_endpoint(name in "[a-z]{1,12}") {
            let now = Utc::now();
            let a = config(&name, now);
            let mut b = config(&name, now);
            b.endpoint = format!("{}-changed", b.endpoint);
            proptest::prop_assert!(!a.reconcile_eq(&b));
        }
    }
}
