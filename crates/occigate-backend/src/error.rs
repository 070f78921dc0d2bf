//! Backend error taxonomy

use occigate_core::CoreError;
use thiserror::Error;

/// Failures reported by backend adapters
///
/// Adapters translate every provider-native failure into exactly one of
/// these variants.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("User not authorized: {0}")]
    UserNotAuthorized(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Resource not valid: {0}")]
    ResourceNotValid(String),

    #[error("Resource could not be created: {0}")]
    ResourceCreate(String),

    #[error("Resource is in the wrong state: {0}")]
    ResourceState(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Identifier not valid: {0}")]
    IdentifierNotValid(String),

    #[error("Method not implemented: {0}")]
    MethodNotImplemented(String),

    #[error("Action failed: {0}")]
    ResourceAction(String),
}

impl BackendError {
    /// Map an HTTP-like provider status code to the taxonomy
    ///
    /// Unlisted codes fall back to `ResourceAction`.
    pub fn from_provider_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            503 | 504 => Self::ServiceUnavailable(message),
            401 => Self::Authentication(message),
            403 => Self::UserNotAuthorized(message),
            404 | 410 => Self::ResourceNotFound(message),
            400 | 422 => Self::ResourceNotValid(message),
            405 | 406 | 409 => Self::ResourceState(message),
            501 => Self::MethodNotImplemented(message),
            _ => Self::ResourceAction(message),
        }
    }

    pub fn not_implemented(operation: &str) -> Self {
        Self::MethodNotImplemented(operation.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BackendError>;

/// Failures surfaced by the dispatch layer
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type DispatchResult<T> = std::result::Result<T, DispatchError>;
