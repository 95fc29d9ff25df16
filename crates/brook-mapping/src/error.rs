use brook_cbor::CborError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    #[error("No data found for query {query}.")]
    NoDataFound { query: String },
    #[error("ambiguous mapping: query {query} matched {matches} values, expected exactly one")]
    AmbiguousMatch { query: String, matches: usize },
    #[error("Processing failed, since mapping will result in a non map object (json object).")]
    NonMapResult,
    #[error("invalid json path query '{expression}': {reason}")]
    InvalidQuery { expression: String, reason: String },
    #[error("invalid mapping target '{expression}': {reason}")]
    InvalidTarget { expression: String, reason: String },
    #[error("mapping target '{target}' addresses index {index} of an array with {len} elements")]
    IndexOutOfRange {
        target: String,
        index: usize,
        len: usize,
    },
    #[error("map key at offset {offset} is not a text string")]
    NonTextKey { offset: usize },
    #[error("mapped payload of {size} bytes exceeds the maximum of {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },
    #[error("malformed payload: {0}")]
    Malformed(#[from] CborError),
}

impl MappingError {
    /// More than one match is a contract violation of the definition, not a
    /// data problem; callers treat it as an illegal state.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, MappingError::AmbiguousMatch { .. })
    }
}
