//! JSON-path subset evaluated directly over CBOR bytes.
//!
//! Supported: `$`, `.name`, `['name']`, `["name"]`, `[index]`, `.*` and `[*]`.

use std::fmt;

use brook_cbor::token::{self, Major};
use brook_cbor::ValueSpan;

use crate::MappingError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuerySegment {
    Field(String),
    Index(usize),
    Wildcard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPathQuery {
    expression: String,
    segments: Vec<QuerySegment>,
}

impl JsonPathQuery {
    pub fn parse(expression: &str) -> Result<Self, MappingError> {
        let invalid = |reason: &str| MappingError::InvalidQuery {
            expression: expression.to_string(),
            reason: reason.to_string(),
        };
        let trimmed = expression.trim();
        let rest = trimmed
            .strip_prefix('$')
            .ok_or_else(|| invalid("query must start with '$'"))?;
        let bytes = rest.as_bytes();
        let mut segments = Vec::new();
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'.' => {
                    i += 1;
                    if bytes.get(i) == Some(&b'*') {
                        segments.push(QuerySegment::Wildcard);
                        i += 1;
                        continue;
                    }
                    let start = i;
                    while i < bytes.len() && bytes[i] != b'.' && bytes[i] != b'[' {
                        i += 1;
                    }
                    if start == i {
                        return Err(invalid("empty field name"));
                    }
                    segments.push(QuerySegment::Field(rest[start..i].to_string()));
                }
                b'[' => {
                    let (segment, next) = parse_bracket(rest, i).map_err(invalid)?;
                    segments.push(segment);
                    i = next;
                }
                _ => return Err(invalid("expected '.' or '['")),
            }
        }
        Ok(Self {
            expression: trimmed.to_string(),
            segments,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn segments(&self) -> &[QuerySegment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn has_wildcard(&self) -> bool {
        self.segments.contains(&QuerySegment::Wildcard)
    }

    /// Spans of every value matched by the query. An empty document matches
    /// nothing; navigating into a value of the wrong type is not a match.
    pub fn evaluate(&self, doc: &[u8]) -> Result<Vec<ValueSpan>, MappingError> {
        if doc.is_empty() {
            return Ok(Vec::new());
        }
        let mut current = vec![0usize];
        for segment in &self.segments {
            let mut next = Vec::new();
            for offset in current {
                let offset = token::skip_tags(doc, offset)?;
                let header = token::read_header(doc, offset)?;
                match (segment, header.major) {
                    (QuerySegment::Field(name), Major::Map) => {
                        for entry in token::map_entries(doc, offset)? {
                            if let Some((key, _)) = token::read_text(doc, entry.key)? {
                                if key == name {
                                    next.push(entry.value);
                                }
                            }
                        }
                    }
                    (QuerySegment::Wildcard, Major::Map) => {
                        next.extend(token::map_entries(doc, offset)?.iter().map(|e| e.value));
                    }
                    (QuerySegment::Index(index), Major::Array) => {
                        if let Some(item) = token::array_items(doc, offset)?.get(*index) {
                            next.push(*item);
                        }
                    }
                    (QuerySegment::Wildcard, Major::Array) => {
                        next.extend(token::array_items(doc, offset)?);
                    }
                    _ => {}
                }
            }
            current = next;
        }
        current
            .into_iter()
            .map(|offset| token::value_span(doc, offset).map_err(MappingError::from))
            .collect()
    }
}

fn parse_bracket(rest: &str, open: usize) -> Result<(QuerySegment, usize), &'static str> {
    let bytes = rest.as_bytes();
    let start = open + 1;
    match bytes.get(start) {
        Some(&(quote @ (b'\'' | b'"'))) => {
            let name_start = start + 1;
            let name_len = rest[name_start..]
                .bytes()
                .position(|b| b == quote)
                .ok_or("unterminated quoted name")?;
            let name_end = name_start + name_len;
            if bytes.get(name_end + 1) != Some(&b']') {
                return Err("quoted name must be followed by ']'");
            }
            if name_len == 0 {
                return Err("empty field name");
            }
            Ok((
                QuerySegment::Field(rest[name_start..name_end].to_string()),
                name_end + 2,
            ))
        }
        _ => {
            let close = rest[start..].find(']').ok_or("unterminated '['")? + start;
            let inner = rest[start..close].trim();
            let segment = if inner == "*" {
                QuerySegment::Wildcard
            } else {
                QuerySegment::Index(
                    inner
                        .parse()
                        .map_err(|_| "bracket must hold an index, '*' or a quoted name")?,
                )
            };
            Ok((segment, close + 1))
        }
    }
}

impl fmt::Display for JsonPathQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn cbor(value: Value) -> Vec<u8> {
        serde_cbor::to_vec(&value).unwrap()
    }

    fn matches(query: &str, doc: &[u8]) -> Vec<Value> {
        JsonPathQuery::parse(query)
            .unwrap()
            .evaluate(doc)
            .unwrap()
            .into_iter()
            .map(|span| serde_cbor::from_slice(span.slice(doc).unwrap()).unwrap())
            .collect()
    }

    #[test]
    fn parses_all_segment_forms() {
        let query = JsonPathQuery::parse("$.orders[2]['first name'][*].*").unwrap();
        assert_eq!(
            query.segments(),
            &[
                QuerySegment::Field("orders".into()),
                QuerySegment::Index(2),
                QuerySegment::Field("first name".into()),
                QuerySegment::Wildcard,
                QuerySegment::Wildcard,
            ]
        );
        assert!(query.has_wildcard());
        assert!(JsonPathQuery::parse("$").unwrap().is_root());
    }

    #[test]
    fn rejects_malformed_queries() {
        for bad in ["foo", "$.", "$..a", "$[abc]", "$['x'", "$[1", "$x"] {
            assert!(
                matches!(
                    JsonPathQuery::parse(bad),
                    Err(MappingError::InvalidQuery { .. })
                ),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn evaluates_fields_and_indexes() {
        let doc = cbor(json!({"a": {"b": 1}, "list": [10, 20, {"c": "x"}]}));
        assert_eq!(matches("$.a.b", &doc), vec![json!(1)]);
        assert_eq!(matches("$.list[1]", &doc), vec![json!(20)]);
        assert_eq!(matches("$.list[2].c", &doc), vec![json!("x")]);
        assert_eq!(matches("$['a']", &doc), vec![json!({"b": 1})]);
        assert_eq!(matches("$", &doc).len(), 1);
    }

    #[test]
    fn type_mismatch_and_missing_paths_match_nothing() {
        let doc = cbor(json!({"a": {"b": 1}, "list": [1]}));
        assert!(matches("$.foo", &doc).is_empty());
        assert!(matches("$.a[0]", &doc).is_empty());
        assert!(matches("$.list.x", &doc).is_empty());
        assert!(matches("$.a.b.c", &doc).is_empty());
        assert!(matches("$.list[5]", &doc).is_empty());
        assert!(matches("$.a", &[]).is_empty());
    }

    #[test]
    fn wildcard_yields_every_child() {
        let doc = cbor(json!({"x": [1, 2, 3]}));
        assert_eq!(matches("$.x[*]", &doc).len(), 3);
        assert_eq!(matches("$.*", &doc).len(), 1);
    }
}
