//! Best-effort batch results

use crate::error::BackendError;

/// Failure of one entity in a batch
#[derive(Debug, Clone, PartialEq)]
pub struct BatchFailure {
    pub id: String,
    pub error: BackendError,
}

/// Outcome of a batch operation
///
/// Every matched entity is attempted; successes and failures are collected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    /// Ids the operation succeeded on
    pub succeeded: Vec<String>,

    /// Ids the operation failed on, in attempt order
    pub failed: Vec<BatchFailure>,
}

impl BatchOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_success(&mut self, id: impl Into<String>) {
        self.succeeded.push(id.into());
    }

    pub fn add_failure(&mut self, id: impl Into<String>, error: BackendError) {
        self.failed.push(BatchFailure {
            id: id.into(),
            error,
        });
    }

    pub fn record(&mut self, id: impl Into<String>, result: crate::error::Result<()>) {
        match result {
            Ok(()) => self.add_success(id),
            Err(e) => self.add_failure(id, e),
        }
    }

    /// True when no entity matched
    pub fn is_empty(&self) -> bool {
        self.succeeded.is_empty() && self.failed.is_empty()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn first_failure(&self) -> Option<&BatchFailure> {
        self.failed.first()
    }

    pub fn merge(&mut self, other: BatchOutcome) {
        self.succeeded.extend(other.succeeded);
        self.failed.extend(other.failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome() {
        let mut outcome = BatchOutcome::new();
        assert!(outcome.is_empty());
        outcome.record("1", Ok(()));
        outcome.record("2", Err(BackendError::ResourceState("busy".into())));
        outcome.record("3", Err(BackendError::ResourceNotFound("3".into())));
        assert!(!outcome.is_empty());
        assert!(!outcome.is_success());
        assert_eq!(outcome.succeeded, vec!["1"]);
        assert_eq!(outcome.first_failure().unwrap().id, "2");
    }
}
