use std::fmt;

/// The conceptual error taxonomy shared by every layer of the core (see
/// the error handling design): validation, not-found, not-ready,
/// transient/permanent backend failure, and fatal errors that abort the
/// process. Transport adapters (REST, MCP) map a `kind()` to their own
/// status/error conventions; this type carries no transport-specific
/// shape itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Input violates a documented invariant. Never logged as a server fault.
    Validation,
    /// A referenced entity (integration name, secret, config) is absent.
    NotFound,
    /// A dependency is not yet warm; callers may retry.
    NotReady,
    /// Network error or 5xx from a remote backend. Logged as a warning.
    TransientBackend,
    /// 4xx (other than 404) or a structured backend error response.
    PermanentBackend,
    /// Unrecoverable; the process should abort with a non-zero exit.
    Fatal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::NotReady => "not_ready",
            ErrorKind::TransientBackend => "transient_backend",
            ErrorKind::PermanentBackend => "permanent_backend",
            ErrorKind::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// Implemented by every module-level error enum so the outermost
/// transport adapter can classify an error without matching on its
/// concrete type. Each wrap along the way should preserve the
/// underlying kind rather than collapsing it.
pub trait HasKind {
    fn kind(&self) -> ErrorKind;
}

/// A boxed domain error carrying its conceptual kind, used as the
/// return type of service-layer methods that may fail for reasons
/// originating in more than one lower layer.
#[derive(Debug, snafu::Snafu)]
#[snafu(display("{kind}: {message}"))]
pub struct DomainError {
    pub kind: ErrorKind,
    pub message: String,
}

impl DomainError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn not_ready(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotReady, message)
    }
}

impl HasKind for DomainError {
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}
