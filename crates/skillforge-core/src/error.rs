//! Error taxonomy for the scoring engine.
//!
//! `EngineError` is the caller-facing taxonomy with stable wire codes.
//! `BackendError` represents grading-backend failures; it lives in core so
//! the orchestrator can downcast and classify errors without string matching.

use thiserror::Error;

/// Caller-facing errors with stable wire codes.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed or missing request fields; never retried by the core.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Unknown question, attempt, or mastery document.
    #[error("not found: {0}")]
    NotFound(String),

    /// Authentication failed; surfaced unchanged from the auth collaborator.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The principal lacks a required role.
    #[error("permission denied: {0}")]
    Permission(String),

    /// Rate limit exceeded.
    #[error("rate limit exceeded for {action}")]
    ResourceExhausted { action: String },

    /// Grading exceeded its wall-clock budget.
    #[error("grading exceeded its {budget_ms}ms budget")]
    Timeout { budget_ms: u64 },

    /// Grading backend failed; distinct from a timeout.
    #[error("grading backend failed: {0}")]
    UpstreamFailure(String),

    /// The response failed the safety pre-check.
    #[error("response rejected: {0}")]
    ContentRejected(String),
}

impl EngineError {
    /// Stable snake_case code for the wire.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidArgument(_) => "invalid_argument",
            EngineError::NotFound(_) => "not_found",
            EngineError::Auth(_) => "auth_error",
            EngineError::Permission(_) => "permission_error",
            EngineError::ResourceExhausted { .. } => "resource_exhausted",
            EngineError::Timeout { .. } => "timeout",
            EngineError::UpstreamFailure(_) => "upstream_failure",
            EngineError::ContentRejected(_) => "content_rejected",
        }
    }

    /// Whether a caller may reasonably retry the same request.
    ///
    /// Grading failures are shown as a retryable error state, never as an
    /// incorrect answer.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Timeout { .. }
                | EngineError::UpstreamFailure(_)
                | EngineError::ResourceExhausted { .. }
        )
    }
}

/// Errors from a grading backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The service returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The service returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),

    /// The service answered with a body the client could not use.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl BackendError {
    /// True when the backend failure was a timeout rather than an error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, BackendError::Timeout(_))
    }
}
