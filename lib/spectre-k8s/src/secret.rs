/// A reference to one key within one Kubernetes `Secret`, scoped to
/// the deployment's own namespace. This is the resolved form of an
/// `IntegrationConfig.credentialRef`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SecretRef {
    pub secret_name: String,
    pub key: String,
}

/// An opaque byte string plus a version counter, bumped on every
/// observed rotation. Never logged or serialized in full; `Debug`
/// redacts the payload.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue {
    pub bytes: Vec<u8>,
    pub version: u64,
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretValue")
            .field("bytes", &format!("<{} bytes redacted>", self.bytes.len()))
            .field("version", &self.version)
            .finish()
    }
}
