use brook_mapping::MappingError;
use thiserror::Error;

use crate::journal::LogPosition;

#[derive(Debug, Error)]
pub enum KernelError {
    #[error("store error: {0}")]
    Store(#[from] brook_store::StoreError),
    #[error("journal error: {0}")]
    Journal(String),
    #[error("failed to encode {what}: {message}")]
    Encode { what: &'static str, message: String },
    #[error("failed to decode {what} at position {position}: {message}")]
    Decode {
        what: &'static str,
        position: LogPosition,
        message: String,
    },
    #[error(transparent)]
    Mapping(MappingError),
    #[error(
        "task of activity '{activity_id}' completed without payload but output mapping expects data from {query}"
    )]
    MissingPayload { activity_id: String, query: String },
    #[error("activity '{activity_id}' is a {kind}; only service tasks are supported")]
    UnsupportedActivity { activity_id: String, kind: String },
    #[error("workflow '{bpmn_process_id}' version {version} is not deployed")]
    WorkflowNotFound {
        bpmn_process_id: String,
        version: i32,
    },
    #[error("illegal state: {0}")]
    IllegalState(String),
    #[error("snapshot unavailable: {0}")]
    SnapshotUnavailable(String),
    #[error("snapshot decode error: {0}")]
    SnapshotDecode(String),
}

impl KernelError {
    /// Only I/O-class failures may succeed when the same event is retried.
    /// Everything else is decided by the log and the deployed definitions.
    pub fn is_retryable(&self) -> bool {
        matches!(self, KernelError::Store(_) | KernelError::Journal(_))
    }
}

impl From<crate::journal::JournalError> for KernelError {
    fn from(err: crate::journal::JournalError) -> Self {
        KernelError::Journal(err.to_string())
    }
}

impl From<MappingError> for KernelError {
    fn from(err: MappingError) -> Self {
        if err.is_ambiguous() {
            KernelError::IllegalState(err.to_string())
        } else {
            KernelError::Mapping(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ambiguous_mapping_is_an_illegal_state() {
        let err = KernelError::from(MappingError::AmbiguousMatch {
            query: "$.items[*]".into(),
            matches: 2,
        });
        assert!(matches!(err, KernelError::IllegalState(_)));

        let err = KernelError::from(MappingError::NoDataFound {
            query: "$.foo".into(),
        });
        assert_eq!(err.to_string(), "No data found for query $.foo.");
        assert!(!err.is_retryable());
    }
}
