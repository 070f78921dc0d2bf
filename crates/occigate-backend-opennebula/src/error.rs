//! OpenNebula provider error types

use occigate_backend::BackendError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OpenNebulaError {
    #[error("{0} not found. Please install the OpenNebula CLI tools")]
    CliNotFound(String),

    #[error("{command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Unexpected CLI output: {0}")]
    UnexpectedOutput(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Unknown template: {0}")]
    UnknownTemplate(String),

    #[error("Invalid attribute value: {0}")]
    InvalidAttribute(String),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, OpenNebulaError>;

/// Classify CLI stderr into the backend taxonomy
///
/// Transport failures carrying an HTTP status go through the shared status
/// mapping. Otherwise matching is on the message fragments OpenNebula
/// prints; anything unrecognised becomes `ResourceAction`.
pub fn classify(stderr: &str) -> BackendError {
    let message = stderr.trim().to_string();
    let lower = message.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if let Some(status) = http_status(&lower) {
        BackendError::from_provider_status(status, message)
    } else if has(&["couldn't be authenticated", "authentication", "invalid credentials"]) {
        BackendError::Authentication(message)
    } else if has(&["not authorized", "permission denied"]) {
        BackendError::UserNotAuthorized(message)
    } else if has(&["error getting", "does not exist", "not found", "no such"]) {
        BackendError::ResourceNotFound(message)
    } else if has(&["not available for state", "wrong state", "is not in state"]) {
        BackendError::ResourceState(message)
    } else if has(&["connection refused", "could not connect", "timed out", "timeout"]) {
        BackendError::ServiceUnavailable(message)
    } else if has(&["syntax error", "parse error", "missing mandatory", "invalid"]) {
        BackendError::ResourceNotValid(message)
    } else if has(&["not supported", "not implemented"]) {
        BackendError::MethodNotImplemented(message)
    } else {
        BackendError::ResourceAction(message)
    }
}

/// Status code of an XML-RPC transport failure (`HTTP-Error: 503 ...`)
fn http_status(lower: &str) -> Option<u16> {
    let (_, rest) = lower.split_once("http-error:")?;
    let code: String = rest
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    code.parse().ok()
}

impl From<OpenNebulaError> for BackendError {
    fn from(err: OpenNebulaError) -> Self {
        match err {
            OpenNebulaError::CliNotFound(_) => BackendError::ServiceUnavailable(err.to_string()),
            OpenNebulaError::CommandFailed { stderr, .. } => classify(&stderr),
            OpenNebulaError::InvalidIdentifier(id) => BackendError::IdentifierNotValid(id),
            OpenNebulaError::UnknownTemplate(_) | OpenNebulaError::InvalidAttribute(_) => {
                BackendError::ResourceNotValid(err.to_string())
            }
            OpenNebulaError::UnexpectedOutput(_)
            | OpenNebulaError::JsonError(_)
            | OpenNebulaError::IoError(_) => BackendError::ResourceAction(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_stderr() {
        assert!(matches!(
            classify("[one.vm.info] User couldn't be authenticated, aborting call."),
            BackendError::Authentication(_)
        ));
        assert!(matches!(
            classify("[one.vm.action] User [3] : Not authorized to perform MANAGE VM [12]."),
            BackendError::UserNotAuthorized(_)
        ));
        assert!(matches!(
            classify("[one.vm.info] Error getting virtual machine [42]."),
            BackendError::ResourceNotFound(_)
        ));
        assert!(matches!(
            classify("[one.vm.action] Error performing action \"resume\": This action is not available for state RUNNING"),
            BackendError::ResourceState(_)
        ));
        assert!(matches!(
            classify("Connection refused - connect(2) for \"localhost\" port 2633"),
            BackendError::ServiceUnavailable(_)
        ));
        assert!(matches!(
            classify("[one.image.allocate] Parse error: syntax error, unexpected $end"),
            BackendError::ResourceNotValid(_)
        ));
        assert!(matches!(
            classify("something odd happened"),
            BackendError::ResourceAction(_)
        ));
    }

    #[test]
    fn test_classify_transport_status() {
        assert_eq!(http_status("http-error: 503 service unavailable"), Some(503));
        assert_eq!(http_status("http-error:"), None);
        assert!(matches!(
            classify("HTTP-Error: 503 Service Unavailable"),
            BackendError::ServiceUnavailable(_)
        ));
        assert!(matches!(
            classify("HTTP-Error: 401 Unauthorized"),
            BackendError::Authentication(_)
        ));
        assert!(matches!(
            classify("HTTP-Error: 404 Not Found"),
            BackendError::ResourceNotFound(_)
        ));
    }

    #[test]
    fn test_into_backend_error() {
        let err: BackendError = OpenNebulaError::CliNotFound("onevm".into()).into();
        assert!(matches!(err, BackendError::ServiceUnavailable(_)));
        let err: BackendError = OpenNebulaError::InvalidIdentifier("abc".into()).into();
        assert_eq!(err, BackendError::IdentifierNotValid("abc".into()));
        let err: BackendError = OpenNebulaError::CommandFailed {
            command: "onevm show 7".into(),
            stderr: "[one.vm.info] Error getting virtual machine [7].".into(),
        }
        .into();
        assert!(matches!(err, BackendError::ResourceNotFound(_)));
    }
}
