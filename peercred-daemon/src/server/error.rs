use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::core::connections::LookupError;
use crate::core::identity::ResolveError;
use crate::core::process::CredentialError;

/// Ways a query can fail. Each maps to exactly one HTTP status.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The caller's source port is above the privileged range.
    #[error("client port {0} is not privileged")]
    Unauthorized(u16),

    /// The body is not a valid query.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// The connection table could not be enumerated.
    #[error("connection lookup failed: {0}")]
    Lookup(#[from] LookupError),

    /// No connection has the requested address pair.
    #[error("connection not found")]
    NotFound,

    /// The matched socket has no live owner any more.
    #[error("owning process not found: {0}")]
    ProcessNotFound(String),

    /// An id has no name, or the process reported too few ids.
    #[error("identity resolution failed: {0}")]
    IdentityResolution(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl QueryError {
    /// - Unauthorized: 401
    /// - NotFound: 404
    /// - everything else: 500
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MalformedRequest(_)
            | Self::Lookup(_)
            | Self::ProcessNotFound(_)
            | Self::IdentityResolution(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<CredentialError> for QueryError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::ProcessNotFound(pid) => Self::ProcessNotFound(format!("pid {} exited", pid)),
            CredentialError::MissingIds { .. } => Self::IdentityResolution(err.to_string()),
            CredentialError::Resolve(e) => e.into(),
            CredentialError::Io { .. } | CredentialError::Malformed { .. } => Self::Internal(err.to_string()),
        }
    }
}

impl From<ResolveError> for QueryError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::UserNotFound(_) | ResolveError::GroupNotFound(_) => {
                Self::IdentityResolution(err.to_string())
            }
            ResolveError::Database(_) => Self::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        // Details stay in the log
        let body = match &self {
            Self::Unauthorized(_) => "Unauthorized",
            Self::MalformedRequest(_) => "Invalid query.",
            Self::NotFound => "Connection not found",
            Self::Lookup(_)
            | Self::ProcessNotFound(_)
            | Self::IdentityResolution(_)
            | Self::Internal(_) => "An internal server error occurred.",
        };

        (self.status_code(), body).into_response()
    }
}
