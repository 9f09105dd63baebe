use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Error taxonomy of the gating engine. Every variant surfaces synchronously
/// to the caller; no requested transition is ever silently dropped.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The record's current status forbids the requested transition, or the
    /// caller lacks the required role.
    #[error("not allowed: {0}")]
    Unauthorized(String),
    /// The submitted answer does not satisfy the step's answer requirement,
    /// or a review is missing a required field.
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// The artifact store was unreachable. Nothing was recorded; the caller
    /// should resubmit.
    #[error("artifact store failure: {0}")]
    Storage(#[source] anyhow::Error),
    /// A precondition the engine relies on does not hold (e.g. reconciling
    /// without an enrollment). Fatal to the call.
    #[error("integrity violation: {0}")]
    Integrity(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = match &self {
            EngineError::Unauthorized(_) => StatusCode::FORBIDDEN,
            EngineError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::Conflict(_) => StatusCode::CONFLICT,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::Integrity(_) | EngineError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, self.to_string()).into_response()
    }
}
