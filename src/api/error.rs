use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use spectre_common::{DomainError, ErrorKind, HasKind};

/// The stable, machine-readable shape every REST error response
/// carries, per §7's "JSON body with a stable machine-readable code
/// plus human message".
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

/// §7 names exactly four REST statuses (400/404/503/500) for six
/// conceptual kinds; `PermanentBackend` and `Fatal` both collapse onto
/// 500 since neither is one of the documented four and both reach the
/// caller as an opaque server-side failure.
fn code_and_status(kind: ErrorKind) -> (StatusCode, &'static str) {
    match kind {
        ErrorKind::Validation => (StatusCode::BAD_REQUEST, "validation"),
        ErrorKind::NotFound => (StatusCode::NOT_FOUND, "not_found"),
        ErrorKind::NotReady => (StatusCode::SERVICE_UNAVAILABLE, "not_ready"),
        ErrorKind::TransientBackend => (StatusCode::SERVICE_UNAVAILABLE, "transient_backend"),
        ErrorKind::PermanentBackend => (StatusCode::INTERNAL_SERVER_ERROR, "permanent_backend"),
        ErrorKind::Fatal => (StatusCode::INTERNAL_SERVER_ERROR, "fatal"),
    }
}

/// Wraps a [`DomainError`] so it can be returned directly from an axum
/// handler; the `?` operator on a `Result<_, ApiError>` does the
/// kind-to-status mapping §7 specifies.
pub struct ApiError(pub DomainError);

impl From<DomainError> for ApiError {
    fn from(e: DomainError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = code_and_status(self.0.kind());
        if matches!(self.0.kind(), ErrorKind::TransientBackend | ErrorKind::PermanentBackend) {
            tracing::warn!(error = %self.0, "backend request failed");
        }
        (status, Json(ErrorBody { code, message: self.0.message })).into_response()
    }
}
