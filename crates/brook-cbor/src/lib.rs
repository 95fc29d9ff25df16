//! CBOR helpers shared by the brook crates.
//!
//! Two layers live here. The serde layer produces canonical encodings and
//! stable SHA-256 content hashes for journal frames and snapshot blobs. The
//! raw layer ([`token`], [`writer`]) reads and writes CBOR item headers
//! directly on byte buffers so payload documents can be navigated and
//! re-emitted without building an object graph.

mod hash;
pub mod token;
pub mod writer;

use serde::Serialize;

pub use hash::{HASH_PREFIX, Hash, HashParseError};
pub use token::{CborError, Header, Major, ValueSpan};

/// Encoding of the empty map, the normalized form of an absent payload.
pub const EMPTY_MAP: &[u8] = &[0xa0];

/// Encoding of CBOR `null`.
pub const NULL: u8 = 0xf6;

/// Encodes `value` with map keys in canonical order, behind the self-describe tag.
///
/// Going through `serde_cbor::Value` sorts every map, so two values that
/// differ only in insertion order encode to the same bytes.
pub fn to_canonical_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_cbor::Error> {
    let sorted = serde_cbor::value::to_value(value)?;
    let mut out = Vec::with_capacity(128);
    let mut serializer = serde_cbor::ser::Serializer::new(&mut out);
    serializer.self_describe()?;
    sorted.serialize(&mut serializer)?;
    Ok(out)
}

/// True when `bytes` carries no payload: empty, or a single CBOR `null`.
pub fn is_absent(bytes: &[u8]) -> bool {
    bytes.is_empty() || bytes == [NULL]
}

/// Checks that `bytes` holds exactly one well-formed item whose root is a map.
pub fn validate_document(bytes: &[u8]) -> Result<(), CborError> {
    let end = token::value_end(bytes, 0)?;
    if end != bytes.len() {
        return Err(CborError::TrailingBytes(end));
    }
    let root = token::skip_tags(bytes, 0)?;
    let header = token::read_header(bytes, root)?;
    if header.major != Major::Map {
        return Err(CborError::NotAMap(root));
    }
    Ok(())
}

/// Returns the document itself, or the empty map when the payload is absent.
pub fn normalize_document(bytes: &[u8]) -> Result<Vec<u8>, CborError> {
    if is_absent(bytes) {
        return Ok(EMPTY_MAP.to_vec());
    }
    validate_document(bytes)?;
    Ok(bytes.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn canonical_encoding_ignores_insertion_order() {
        let mut first = serde_json::Map::new();
        first.insert("b".into(), json!(2));
        first.insert("a".into(), json!({"nested": [1, 2, 3]}));
        let mut second = BTreeMap::new();
        second.insert("a", json!({"nested": [1, 2, 3]}));
        second.insert("b", json!(2));

        let left = to_canonical_cbor(&first).expect("encode");
        let right = to_canonical_cbor(&second).expect("encode");
        assert_eq!(left, right);
        assert_eq!(Hash::of_bytes(&left), Hash::of_bytes(&right));
    }

    #[test]
    fn absent_payloads_normalize_to_empty_map() {
        assert!(is_absent(&[]));
        assert!(is_absent(&[NULL]));
        assert_eq!(normalize_document(&[]).unwrap(), EMPTY_MAP);
        assert_eq!(normalize_document(&[NULL]).unwrap(), EMPTY_MAP);
    }

    #[test]
    fn validate_document_requires_single_root_map() {
        let doc = serde_cbor::to_vec(&json!({"a": 1})).unwrap();
        validate_document(&doc).expect("map document");

        let array = serde_cbor::to_vec(&json!([1, 2])).unwrap();
        assert!(matches!(validate_document(&array), Err(CborError::NotAMap(0))));

        let mut trailing = doc.clone();
        trailing.push(0x01);
        assert!(matches!(
            validate_document(&trailing),
            Err(CborError::TrailingBytes(_))
        ));

        let tagged = to_canonical_cbor(&json!({"a": 1})).unwrap();
        validate_document(&tagged).expect("self-describe tag is transparent");
    }
}
