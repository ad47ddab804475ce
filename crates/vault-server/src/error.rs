//! Error taxonomy for the Server File Registry (spec.md §7 kinds this
//! component can raise).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// No (or malformed) session credential was presented. Distinct from
    /// `Forbidden`: the caller's identity itself could not be established.
    /// The session/credential subsystem is an external collaborator
    /// (spec.md §1); this variant only covers the HTTP layer's own check
    /// that *some* identity was presented.
    #[error("authentication required")]
    Authentication,

    /// Authenticated but lacking the required `{read_only, read_write}`
    /// permission. Per §7, leaks no information beyond "no access".
    #[error("forbidden")]
    Forbidden,

    /// An operation's precondition on `state` (or, for `complete`, on the
    /// uploaded object) was not met.
    #[error("state violation: {0}")]
    StateViolation(String),

    #[error("object storage error: {0}")]
    IoObject(String),

    /// A concurrent compare-and-set on `version` lost the race.
    #[error("conflict: {0}")]
    Conflict(String),
}

#[derive(Serialize)]
struct ApiError {
    error: String,
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            RegistryError::Validation(_) => StatusCode::BAD_REQUEST,
            RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
            RegistryError::Authentication => StatusCode::UNAUTHORIZED,
            RegistryError::Forbidden => StatusCode::FORBIDDEN,
            RegistryError::StateViolation(_) => StatusCode::CONFLICT,
            RegistryError::IoObject(_) => StatusCode::BAD_GATEWAY,
            RegistryError::Conflict(_) => StatusCode::CONFLICT,
        };
        (status, Json(ApiError { error: self.to_string() })).into_response()
    }
}
