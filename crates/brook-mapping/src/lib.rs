//! Payload mapping engine.
//!
//! Payloads are CBOR documents with a map at the root. A [`Mapping`] copies
//! the single value matched by a JSON-path query to a target path.
//! [`PayloadMappingProcessor`] extracts task inputs from an instance payload
//! and merges task outputs back into it, working on byte ranges of the input
//! buffers instead of decoded values.

mod error;
mod mapping;
mod processor;
pub mod query;
pub mod target;
mod tree;

pub use error::MappingError;
pub use mapping::{Mapping, MappingSpec};
pub use processor::PayloadMappingProcessor;
pub use query::JsonPathQuery;
pub use target::TargetPath;
