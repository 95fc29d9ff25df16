use brook_cbor::{CborError, ValueSpan, is_absent, normalize_document, validate_document};

use crate::tree::{Buffer, Buffers, Leaf, MappingTree};
use crate::{Mapping, MappingError};

/// Applies mappings to CBOR payload documents.
///
/// Each call resolves every mapping to a byte range first and then writes the
/// result in one pass, copying ranges verbatim. The arena is cleared before
/// and after each call, so one processor can serve any number of sequential
/// calls.
#[derive(Debug, Default)]
pub struct PayloadMappingProcessor {
    tree: MappingTree,
    max_payload_size: Option<usize>,
}

impl PayloadMappingProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_payload_size(max_payload_size: usize) -> Self {
        Self {
            tree: MappingTree::default(),
            max_payload_size: Some(max_payload_size),
        }
    }

    /// Builds a document holding only the mapping targets. Without mappings
    /// the source is returned as is (an absent source becomes `{}`).
    pub fn extract(&mut self, source: &[u8], mappings: &[Mapping]) -> Result<Vec<u8>, MappingError> {
        if mappings.is_empty() {
            return self.limit(normalize_document(source)?);
        }
        self.tree.reset_empty();
        let buffers = Buffers { source, base: &[] };
        let result = self.apply_and_write(mappings, &buffers);
        self.tree.clear();
        self.limit(result?)
    }

    /// Writes the mapped values of `task_payload` into `instance_payload`,
    /// keeping every instance value no mapping overwrites.
    ///
    /// Without mappings the task payload replaces the instance payload, unless
    /// it is absent, in which case the instance payload is returned unchanged.
    pub fn merge(
        &mut self,
        task_payload: &[u8],
        instance_payload: &[u8],
        mappings: &[Mapping],
    ) -> Result<Vec<u8>, MappingError> {
        if mappings.is_empty() {
            if is_absent(task_payload) {
                return self.limit(instance_payload.to_vec());
            }
            validate_document(task_payload).map_err(non_map)?;
            return self.limit(task_payload.to_vec());
        }

        if is_absent(instance_payload) {
            self.tree.reset_empty();
        } else {
            validate_document(instance_payload)?;
            self.tree.reset_with(Leaf {
                buffer: Buffer::Base,
                span: ValueSpan::new(0, instance_payload.len())?,
            });
        }
        let buffers = Buffers {
            source: task_payload,
            base: instance_payload,
        };
        let result = self.apply_and_write(mappings, &buffers);
        self.tree.clear();
        self.limit(result?)
    }

    fn apply_and_write(
        &mut self,
        mappings: &[Mapping],
        buffers: &Buffers<'_>,
    ) -> Result<Vec<u8>, MappingError> {
        for mapping in mappings {
            let spans = mapping.source().evaluate(buffers.source)?;
            let span = match spans.as_slice() {
                [single] => *single,
                [] => {
                    return Err(MappingError::NoDataFound {
                        query: mapping.source().expression().to_string(),
                    });
                }
                many => {
                    return Err(MappingError::AmbiguousMatch {
                        query: mapping.source().expression().to_string(),
                        matches: many.len(),
                    });
                }
            };
            let leaf = Leaf {
                buffer: Buffer::Source,
                span,
            };
            self.tree.set_leaf(mapping.target(), leaf, buffers)?;
        }
        let mut out = Vec::with_capacity(buffers.source.len() + buffers.base.len());
        self.tree.write(buffers, &mut out)?;
        Ok(out)
    }

    fn limit(&self, payload: Vec<u8>) -> Result<Vec<u8>, MappingError> {
        match self.max_payload_size {
            Some(max) if payload.len() > max => Err(MappingError::PayloadTooLarge {
                size: payload.len(),
                max,
            }),
            _ => Ok(payload),
        }
    }
}

fn non_map(err: CborError) -> MappingError {
    match err {
        CborError::NotAMap(_) => MappingError::NonMapResult,
        other => MappingError::Malformed(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brook_cbor::token;
    use serde_json::{Value, json};

    fn cbor(value: Value) -> Vec<u8> {
        serde_cbor::to_vec(&value).unwrap()
    }

    fn decode(bytes: &[u8]) -> Value {
        serde_cbor::from_slice(bytes).unwrap()
    }

    fn mapping(source: &str, target: &str) -> Mapping {
        Mapping::new(source, target).unwrap()
    }

    fn root_keys(doc: &[u8]) -> Vec<String> {
        token::map_entries(doc, 0)
            .unwrap()
            .into_iter()
            .map(|entry| token::read_text(doc, entry.key).unwrap().unwrap().0.to_string())
            .collect()
    }

    #[test]
    fn extract_is_deterministic() {
        let mut processor = PayloadMappingProcessor::new();
        let source = cbor(json!({"a": {"b": 1}}));
        let mappings = [mapping("$.a.b", "x.y")];
        let first = processor.extract(&source, &mappings).unwrap();
        for _ in 0..3 {
            assert_eq!(processor.extract(&source, &mappings).unwrap(), first);
        }
        assert_eq!(decode(&first), json!({"x": {"y": 1}}));
    }

    #[test]
    fn extract_without_mappings_passes_through() {
        let mut processor = PayloadMappingProcessor::new();
        let source = cbor(json!({"foo": "bar", "n": [1, 2]}));
        assert_eq!(processor.extract(&source, &[]).unwrap(), source);
        assert_eq!(processor.extract(&[], &[]).unwrap(), vec![0xa0]);
    }

    #[test]
    fn extract_reproduces_queried_subset() {
        let mut processor = PayloadMappingProcessor::new();
        let source = cbor(json!({"keep": {"a": [1, {"b": true}]}, "drop": 5}));
        let result = processor
            .extract(&source, &[mapping("$.keep", "$.keep")])
            .unwrap();
        assert_eq!(decode(&result), json!({"keep": {"a": [1, {"b": true}]}}));
    }

    #[test]
    fn missing_source_reports_query() {
        let mut processor = PayloadMappingProcessor::new();
        let source = cbor(json!({"bar": 1}));
        let err = processor
            .extract(&source, &[mapping("$.foo", "$.foo")])
            .unwrap_err();
        assert_eq!(err.to_string(), "No data found for query $.foo.");

        let err = processor.extract(&[], &[mapping("$.foo", "foo")]).unwrap_err();
        assert!(matches!(err, MappingError::NoDataFound { .. }));
    }

    #[test]
    fn multiple_matches_fail_fast() {
        let mut processor = PayloadMappingProcessor::new();
        let source = cbor(json!({"list": [1, 2, 3]}));
        let err = processor
            .extract(&source, &[mapping("$.list[*]", "item")])
            .unwrap_err();
        assert_eq!(
            err,
            MappingError::AmbiguousMatch {
                query: "$.list[*]".into(),
                matches: 3
            }
        );
        assert!(err.is_ambiguous());
    }

    #[test]
    fn root_target_must_be_a_map() {
        let mut processor = PayloadMappingProcessor::new();
        let source = cbor(json!({"obj": {"x": 1}, "num": 7}));
        let whole = processor.extract(&source, &[mapping("$.obj", "$")]).unwrap();
        assert_eq!(decode(&whole), json!({"x": 1}));

        let err = processor
            .extract(&source, &[mapping("$.num", "$")])
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Processing failed, since mapping will result in a non map object (json object)."
        );
    }

    #[test]
    fn later_mapping_wins() {
        let mut processor = PayloadMappingProcessor::new();
        let source = cbor(json!({"first": 1, "second": 2}));
        let result = processor
            .extract(
                &source,
                &[mapping("$.first", "value"), mapping("$.second", "value")],
            )
            .unwrap();
        assert_eq!(decode(&result), json!({"value": 2}));
    }

    #[test]
    fn merge_without_mappings() {
        let mut processor = PayloadMappingProcessor::new();
        let instance = cbor(json!({"a": 1}));
        let task = cbor(json!({"b": 2}));
        assert_eq!(processor.merge(&[], &instance, &[]).unwrap(), instance);
        assert_eq!(processor.merge(&task, &instance, &[]).unwrap(), task);

        let scalar = cbor(json!(3));
        assert_eq!(
            processor.merge(&scalar, &instance, &[]).unwrap_err(),
            MappingError::NonMapResult
        );
    }

    #[test]
    fn merge_keeps_untouched_instance_values_in_order() {
        let mut processor = PayloadMappingProcessor::new();
        let instance = cbor(json!({"a": 1, "b": {"c": 2, "d": 3}, "e": [4]}));
        let task = cbor(json!({"x": 9}));
        let result = processor
            .merge(&task, &instance, &[mapping("$.x", "b.c")])
            .unwrap();
        assert_eq!(decode(&result), json!({"a": 1, "b": {"c": 9, "d": 3}, "e": [4]}));
        assert_eq!(root_keys(&result), vec!["a", "b", "e"]);
    }

    #[test]
    fn merge_adds_new_paths_after_existing_keys() {
        let mut processor = PayloadMappingProcessor::new();
        let instance = cbor(json!({"z": true}));
        let task = cbor(json!({"result": {"ok": 1}}));
        let result = processor
            .merge(&task, &instance, &[mapping("$.result", "$.out.nested")])
            .unwrap();
        assert_eq!(decode(&result), json!({"z": true, "out": {"nested": {"ok": 1}}}));
        assert_eq!(root_keys(&result), vec!["z", "out"]);
    }

    #[test]
    fn merge_into_array_elements() {
        let mut processor = PayloadMappingProcessor::new();
        let instance = cbor(json!({"array": [1, 2, 3]}));
        let task = cbor(json!({"v": "x"}));

        let replaced = processor
            .merge(&task, &instance, &[mapping("$.v", "$.array[1]")])
            .unwrap();
        assert_eq!(decode(&replaced), json!({"array": [1, "x", 3]}));

        let appended = processor
            .merge(&task, &instance, &[mapping("$.v", "array[3]")])
            .unwrap();
        assert_eq!(decode(&appended), json!({"array": [1, 2, 3, "x"]}));

        let err = processor
            .merge(&task, &instance, &[mapping("$.v", "array[5]")])
            .unwrap_err();
        assert!(matches!(
            err,
            MappingError::IndexOutOfRange { index: 5, len: 3, .. }
        ));
    }

    #[test]
    fn merge_replaces_scalar_with_container() {
        let mut processor = PayloadMappingProcessor::new();
        let instance = cbor(json!({"a": 1, "b": 2}));
        let task = cbor(json!({"v": 5}));
        let result = processor
            .merge(&task, &instance, &[mapping("$.v", "a.inner")])
            .unwrap();
        assert_eq!(decode(&result), json!({"a": {"inner": 5}, "b": 2}));
    }

    #[test]
    fn merge_with_root_target_replaces_instance() {
        let mut processor = PayloadMappingProcessor::new();
        let instance = cbor(json!({"old": 1}));
        let task = cbor(json!({"new": {"k": "v"}}));
        let result = processor
            .merge(&task, &instance, &[mapping("$.new", "$")])
            .unwrap();
        assert_eq!(decode(&result), json!({"k": "v"}));
    }

    #[test]
    fn merge_into_absent_instance_payload() {
        let mut processor = PayloadMappingProcessor::new();
        let task = cbor(json!({"v": 5}));
        let result = processor.merge(&task, &[], &[mapping("$.v", "v")]).unwrap();
        assert_eq!(decode(&result), json!({"v": 5}));
    }

    #[test]
    fn processor_is_reusable_after_failure() {
        let mut processor = PayloadMappingProcessor::new();
        let source = cbor(json!({"a": 1}));
        assert!(processor.extract(&source, &[mapping("$.b", "b")]).is_err());
        let result = processor.extract(&source, &[mapping("$.a", "b")]).unwrap();
        assert_eq!(decode(&result), json!({"b": 1}));
    }

    #[test]
    fn payload_size_limit() {
        let mut processor = PayloadMappingProcessor::with_max_payload_size(8);
        let source = cbor(json!({"text": "a fairly long string"}));
        let err = processor
            .extract(&source, &[mapping("$.text", "t")])
            .unwrap_err();
        assert!(matches!(err, MappingError::PayloadTooLarge { max: 8, .. }));
    }

    #[test]
    fn malformed_instance_payload_is_rejected() {
        let mut processor = PayloadMappingProcessor::new();
        let task = cbor(json!({"v": 1}));
        let err = processor
            .merge(&task, &[0x9f, 0x01, 0xff], &[mapping("$.v", "v")])
            .unwrap_err();
        assert!(matches!(err, MappingError::Malformed(_)));
    }
}
