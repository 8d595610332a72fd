//! Outcome of bulk operations that can succeed for some items and fail for
//! others.
//!
//! The service decides the partition. This module only decodes it: entries
//! are kept in wire order and never dropped without a warning. When the
//! error descriptor is missing, `failed` is treated as empty, since the
//! service only reports failures alongside an error.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::{DeleteResultsPartialSuccess, ServiceError};

/// Items that were processed (`R`, response-shaped), items that were not
/// (`F`, request-shaped, since they were never persisted), and the error
/// summarizing why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialSuccess<R, F> {
    pub results: Vec<R>,
    // Missing `Option` fields decode as `None`; `default` would add an
    // `F: Default` bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<Vec<F>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ServiceError>,
}

impl<R, F> PartialSuccess<R, F> {
    pub fn complete(results: Vec<R>) -> Self {
        Self {
            results,
            failed: None,
            error: None,
        }
    }

    /// Apply the decoding policy: `failed` without `error` is discarded,
    /// `error` without failures is kept. Both mismatches are logged.
    pub fn normalize(mut self) -> Self {
        let failed_count = self.failed_count();
        match (&self.error, failed_count) {
            (None, n) if n > 0 => {
                warn!(
                    failed = n,
                    "partial-success response lists failed items without an error; ignoring them"
                );
                self.failed = None;
            }
            (Some(error), 0) => {
                warn!(
                    error = ?error.message,
                    "partial-success response carries an error but no failed items"
                );
            }
            _ => {}
        }
        self
    }

    /// Check that every submitted item is accounted for. Returns `false`
    /// (and logs) when `results + failed` does not add up to `submitted`.
    #[must_use]
    pub fn reconcile(&self, submitted: usize) -> bool {
        let accounted = self.results.len() + self.failed_count();
        if accounted != submitted {
            warn!(
                submitted,
                succeeded = self.results.len(),
                failed = self.failed_count(),
                "bulk response does not account for every submitted item"
            );
            return false;
        }
        true
    }

    pub fn is_complete(&self) -> bool {
        self.failed_count() == 0 && self.error.is_none()
    }

    pub fn failed(&self) -> &[F] {
        self.failed.as_deref().unwrap_or(&[])
    }

    pub fn failed_count(&self) -> usize {
        self.failed.as_ref().map_or(0, Vec::len)
    }

    pub fn into_parts(self) -> (Vec<R>, Vec<F>, Option<ServiceError>) {
        (self.results, self.failed.unwrap_or_default(), self.error)
    }
}

impl From<DeleteResultsPartialSuccess> for PartialSuccess<String, String> {
    fn from(value: DeleteResultsPartialSuccess) -> Self {
        Self {
            results: value.ids,
            failed: value.failed,
            error: value.error,
        }
    }
}

/// Result of a bulk delete.
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteOutcome {
    /// Every id was deleted (the service answered with no body).
    AllDeleted,
    /// Some ids could not be deleted. `results` holds the deleted ids,
    /// `failed` the rest.
    Partial(PartialSuccess<String, String>),
}

impl DeleteOutcome {
    pub fn is_complete(&self) -> bool {
        match self {
            DeleteOutcome::AllDeleted => true,
            DeleteOutcome::Partial(partial) => partial.is_complete(),
        }
    }

    pub fn failed_ids(&self) -> &[String] {
        match self {
            DeleteOutcome::AllDeleted => &[],
            DeleteOutcome::Partial(partial) => partial.failed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error(message: &str) -> ServiceError {
        ServiceError {
            message: Some(message.to_string()),
            ..ServiceError::default()
        }
    }

    #[test]
    fn complete_response_has_no_failures() {
        let outcome: PartialSuccess<u32, u32> = PartialSuccess::complete(vec![1, 2]);
        assert!(outcome.is_complete());
        assert!(outcome.failed().is_empty());
        assert!(outcome.reconcile(2));
    }

    #[test]
    fn failed_without_error_is_dropped() {
        let outcome: PartialSuccess<u32, u32> = PartialSuccess {
            results: vec![1],
            failed: Some(vec![2]),
            error: None,
        }
        .normalize();
        assert!(outcome.failed.is_none());
        assert_eq!(outcome.results, vec![1]);
    }

    #[test]
    fn error_without_failed_is_kept() {
        let outcome: PartialSuccess<u32, u32> = PartialSuccess {
            results: vec![1],
            failed: Some(Vec::new()),
            error: Some(error("odd")),
        }
        .normalize();
        assert!(outcome.error.is_some());
        assert!(!outcome.is_complete());
    }

    #[test]
    fn consistent_partial_failure_is_untouched() {
        let original: PartialSuccess<u32, &str> = PartialSuccess {
            results: vec![1, 3],
            failed: Some(vec!["b"]),
            error: Some(error("one failed")),
        };
        let outcome = original.clone().normalize();
        assert_eq!(outcome, original);
        assert!(outcome.reconcile(3));
        assert!(!outcome.reconcile(4));
    }

    #[test]
    fn failed_order_is_preserved() {
        let outcome: PartialSuccess<u32, &str> = PartialSuccess {
            results: Vec::new(),
            failed: Some(vec!["c", "a", "b"]),
            error: Some(error("all failed")),
        }
        .normalize();
        assert_eq!(outcome.failed(), &["c", "a", "b"]);
    }

    #[test]
    fn into_parts_defaults_missing_failed() {
        let (results, failed, error) = PartialSuccess::<u32, u32>::complete(vec![7]).into_parts();
        assert_eq!(results, vec![7]);
        assert!(failed.is_empty());
        assert!(error.is_none());
    }

    #[test]
    fn deserializes_wire_shape() {
        let outcome: PartialSuccess<String, String> = serde_json::from_str(
            r#"{"results":["a"],"failed":["b"],"error":{"name":"Skyline.OneOrMoreErrorsOccurred"}}"#,
        )
        .unwrap();
        assert_eq!(outcome.failed_count(), 1);
        assert_eq!(
            outcome.error.unwrap().name.as_deref(),
            Some("Skyline.OneOrMoreErrorsOccurred")
        );
    }

    #[test]
    fn deserializes_with_request_shaped_failures() {
        use crate::types::{StatusType, TestResultRequest, TestResultResponse};

        let outcome: PartialSuccess<TestResultResponse, TestResultRequest> = serde_json::from_str(
            r#"{
                "results": [{"id": "r1", "programName": "ok"}],
                "failed": [{"programName": "bad", "status": {"statusType": "FAILED"}, "workspace": "nope"}],
                "error": {"name": "Skyline.OneOrMoreErrorsOccurred"}
            }"#,
        )
        .unwrap();
        assert_eq!(outcome.results[0].id.as_deref(), Some("r1"));
        assert_eq!(outcome.failed()[0].status.status_type, StatusType::Failed);
        assert_eq!(outcome.failed()[0].workspace.as_deref(), Some("nope"));

        let complete: PartialSuccess<TestResultResponse, TestResultRequest> =
            serde_json::from_str(r#"{"results": []}"#).unwrap();
        assert!(complete.failed.is_none());
        assert!(complete.error.is_none());
    }

    #[test]
    fn delete_partial_converts() {
        let partial: PartialSuccess<String, String> = DeleteResultsPartialSuccess {
            ids: vec!["a".to_string()],
            failed: Some(vec!["b".to_string()]),
            error: Some(error("not found")),
        }
        .into();
        let outcome = DeleteOutcome::Partial(partial);
        assert!(!outcome.is_complete());
        assert_eq!(outcome.failed_ids(), &["b".to_string()]);
        assert!(DeleteOutcome::AllDeleted.failed_ids().is_empty());
    }
}
