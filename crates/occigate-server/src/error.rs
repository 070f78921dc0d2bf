//! HTTP error mapping

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use occigate_backend::{BackendError, DispatchError};
use occigate_core::CoreError;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("Nothing found at {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Method {method} not allowed on {path}")]
    MethodNotAllowed { method: String, path: String },
}

pub type Result<T> = std::result::Result<T, ApiError>;

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Core(e) => Self::Core(e),
            DispatchError::Backend(e) => Self::Backend(e),
        }
    }
}

pub fn core_status(err: &CoreError) -> StatusCode {
    match err {
        CoreError::CategoryNotFound(_) => StatusCode::NOT_FOUND,
        CoreError::DuplicateCategory(_)
        | CoreError::LocationInUse { .. }
        | CoreError::ProtectedCategory(_) => StatusCode::CONFLICT,
        CoreError::NotAcceptable(_) => StatusCode::NOT_ACCEPTABLE,
        CoreError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        CoreError::Render(_) | CoreError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        CoreError::CategoryMissing(_)
        | CoreError::InvalidIdentifier(_)
        | CoreError::InvalidStateMachine { .. }
        | CoreError::InvalidStateTransition { .. }
        | CoreError::AttributeNotDeclared { .. }
        | CoreError::AttributeImmutable(_)
        | CoreError::AttributeTypeMismatch { .. }
        | CoreError::MandatoryAttributeMissing(_)
        | CoreError::MixinNotApplicable { .. }
        | CoreError::MixinDependencyMissing { .. }
        | CoreError::KindMismatch { .. }
        | CoreError::Parse(_)
        | CoreError::InvalidSchema(_)
        | CoreError::KdlParse(_)
        | CoreError::Json(_) => StatusCode::BAD_REQUEST,
    }
}

pub fn backend_status(err: &BackendError) -> StatusCode {
    match err {
        BackendError::Authentication(_) => StatusCode::UNAUTHORIZED,
        BackendError::UserNotAuthorized(_) => StatusCode::FORBIDDEN,
        BackendError::ResourceNotFound(_) => StatusCode::NOT_FOUND,
        BackendError::ResourceNotValid(_)
        | BackendError::ResourceCreate(_)
        | BackendError::IdentifierNotValid(_) => StatusCode::BAD_REQUEST,
        BackendError::ResourceState(_) => StatusCode::CONFLICT,
        BackendError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        BackendError::MethodNotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
        BackendError::ResourceAction(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Core(e) => core_status(e),
            Self::Backend(e) => backend_status(e),
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        if status.is_server_error() {
            error!(status = status.as_u16(), "{}", message);
        } else {
            warn!(status = status.as_u16(), "{}", message);
        }
        (
            status,
            [(header::CONTENT_TYPE, "text/plain")],
            format!("{}\n", message),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::from(CoreError::CategoryNotFound("x".into())), 404),
            (ApiError::from(CoreError::CategoryMissing("x".into())), 400),
            (ApiError::from(CoreError::DuplicateCategory("x".into())), 409),
            (ApiError::from(CoreError::ProtectedCategory("x".into())), 409),
            (
                ApiError::from(CoreError::InvalidStateTransition {
                    state: "active".into(),
                    action: "start".into(),
                }),
                400,
            ),
            (ApiError::from(CoreError::NotAcceptable("x".into())), 406),
            (ApiError::from(CoreError::UnsupportedMediaType("x".into())), 415),
            (ApiError::from(BackendError::Authentication("x".into())), 401),
            (ApiError::from(BackendError::UserNotAuthorized("x".into())), 403),
            (ApiError::from(BackendError::ResourceNotFound("x".into())), 404),
            (ApiError::from(BackendError::ResourceCreate("x".into())), 400),
            (ApiError::from(BackendError::ResourceState("x".into())), 409),
            (ApiError::from(BackendError::ServiceUnavailable("x".into())), 503),
            (ApiError::from(BackendError::MethodNotImplemented("x".into())), 501),
            (ApiError::from(BackendError::ResourceAction("x".into())), 500),
        ];
        for (err, status) in cases {
            assert_eq!(err.status().as_u16(), status, "{err}");
        }
    }
}
