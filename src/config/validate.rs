use std::sync::OnceLock;

use regex::Regex;
use spectre_common::DomainError;

use super::model::IntegrationConfig;

/// A DNS-1123-label-shaped name (lowercase alphanumeric and `-`,
/// bookended by an alphanumeric), the same constraint Kubernetes
/// itself places on most resource names - `name` doubles as a label
/// on every metric and log line the integration emits, so it is worth
/// constraining beyond mere non-emptiness.
fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?$").expect("static regex is valid"))
}

/// Checks the invariants a config must hold independent of any other
/// entry in the store: non-empty, DNS-1123-shaped name, a `kind` the
/// caller recognizes, and a parseable endpoint. Uniqueness against the
/// rest of the store is the caller's responsibility, since it requires
/// the store's lock.
pub fn validate(config: &IntegrationConfig, known_kinds: &[&str]) -> Result<(), DomainError> {
    if config.name.trim().is_empty() {
        return Err(DomainError::validation("integration name must not be empty"));
    }
    if config.name.len() > 253 {
        return Err(DomainError::validation(
            "integration name must not exceed 253 characters",
        ));
    }
    if !name_pattern().is_match(&config.name) {
        return Err(DomainError::validation(format!(
            "integration name {:?} must be lowercase alphanumeric characters or '-', and must start and end with an alphanumeric character",
            config.name
        )));
    }
    if !known_kinds.contains(&config.kind.as_str()) {
        return Err(DomainError::validation(format!(
            "unknown integration kind {:?}; known kinds are {known_kinds:?}",
            config.kind
        )));
    }
    url::Url::parse(&config.endpoint)
        .map_err(|e| DomainError::validation(format!("invalid endpoint {:?}: {e}", config.endpoint)))?;
    if let Some(credential_ref) = &config.credential_ref {
        if credential_ref.secret_name.trim().is_empty() || credential_ref.key.trim().is_empty() {
            return Err(DomainError::validation(
                "credentialRef.secretName and credentialRef.key must not be empty",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use indexmap::IndexMap;

    fn base() -> IntegrationConfig {
        IntegrationConfig {
            name: "prod-logs".into(),
            kind: "logstore-mock".into(),
            enabled: true,
            endpoint: "https://logs.example.com".into(),
            credential_ref: None,
            options: IndexMap::new(),
            date_added: Utc::now(),
        }
    }

    #[test]
    fn accepts_a_well_formed_config() {
        assert!(validate(&base(), &["logstore-mock", "logstore-http"]).is_ok());
    }

    #[test]
    fn rejects_empty_name() {
        let mut c = base();
        c.name = "  ".into();
        assert!(validate(&c, &["logstore-mock"]).is_err());
    }

    #[test]
    fn rejects_uppercase_name() {
        let mut c = base();
        c.name = "Prod-Logs".into();
        assert!(validate(&c, &["logstore-mock"]).is_err());
    }

    #[test]
    fn rejects_name_starting_with_hyphen() {
        let mut c = base();
        c.name = "-prod-logs".into();
        assert!(validate(&c, &["logstore-mock"]).is_err());
    }

    #[test]
    fn accepts_single_character_name() {
        let mut c = base();
        c.name = "a".into();
        assert!(validate(&c, &["logstore-mock"]).is_ok());
    }

    #[test]
    fn rejects_unknown_kind() {
        let mut c = base();
        c.kind = "logstore-carrier-pigeon".into();
        assert!(validate(&c, &["logstore-mock"]).is_err());
    }

    #[test]
    fn rejects_unparseable_endpoint() {
        let mut c = base();
        c.endpoint = "not a url".into();
        assert!(validate(&c, &["logstore-mock"]).is_err());
    }
}
