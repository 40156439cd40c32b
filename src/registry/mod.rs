use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;
use snafu::Snafu;
use spectre_common::{DomainError, ErrorKind, HasKind};

use crate::config::CredentialRef;
use crate::integrations::IntegrationClient;
use crate::secrets::SecretResolver;

/// Everything a factory needs to build one integration instance. The
/// resolver is handed in rather than a resolved value: constructors
/// are side-effect-free, so any secret lookup happens later, inside
/// the client's own request methods.
pub struct ConstructArgs<'a> {
    pub name: &'a str,
    pub endpoint: &'a str,
    pub options: &'a IndexMap<String, Value>,
    pub credential_ref: Option<&'a CredentialRef>,
    pub secrets: Arc<SecretResolver>,
}

pub type ConstructFn = fn(ConstructArgs) -> Result<Box<dyn IntegrationClient>, DomainError>;

/// One entry in the process-wide factory table, submitted via
/// `inventory::submit!` from each integration's own module at process
/// init, mirroring an init-time package registration.
pub struct Factory {
    pub kind: &'static str,
    pub construct: ConstructFn,
}

inventory::collect!(Factory);

#[derive(Debug, Snafu)]
pub enum RegistryError {
    #[snafu(display("unknown integration kind {kind:?}"))]
    UnknownKind { kind: String },
    #[snafu(display("failed to construct integration {name:?} of kind {kind:?}: {source}"))]
    Construct {
        name: String,
        kind: String,
        source: DomainError,
    },
}

impl HasKind for RegistryError {
    fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::UnknownKind { .. } => ErrorKind::Validation,
            RegistryError::Construct { source, .. } => source.kind(),
        }
    }
}

impl From<RegistryError> for DomainError {
    fn from(e: RegistryError) -> Self {
        DomainError::new(e.kind(), e.to_string())
    }
}

/// The immutable `{kind -> constructor}` table, collected once at
/// startup from every `Factory` submitted via `inventory::submit!`.
/// Never mutated after [`Registry::load`]; the lifecycle manager only
/// reads it.
pub struct Registry {
    factories: HashMap<&'static str, &'static Factory>,
}

impl Registry {
    pub fn load() -> Self {
        let mut factories = HashMap::new();
        for factory in inventory::iter::<Factory> {
            if factories.insert(factory.kind, factory).is_some() {
                panic!("duplicate integration kind registered: {}", factory.kind);
            }
        }
        Self { factories }
    }

    pub fn known_kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<&'static str> = self.factories.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }

    pub fn construct(
        &self,
        kind: &str,
        args: ConstructArgs,
    ) -> Result<Box<dyn IntegrationClient>, RegistryError> {
        let name = args.name.to_string();
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| RegistryError::UnknownKind { kind: kind.to_string() })?;
        (factory.construct)(args).map_err(|source| RegistryError::Construct {
            name,
            kind: kind.to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_kinds_include_the_builtins() {
        let registry = Registry::load();
        let kinds = registry.known_kinds();
        assert!(kinds.contains(&"logstore-mock"));
        assert!(kinds.contains(&"logstore-http"));
    }

    #[test]
    fn unknown_kind_is_rejected_before_any_factory_runs() {
        let registry = Registry::load();
        assert!(!registry.factories.contains_key("logstore-carrier-pigeon"));
    }
}
