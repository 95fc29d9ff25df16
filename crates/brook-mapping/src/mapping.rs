use serde::{Deserialize, Serialize};

use crate::{JsonPathQuery, MappingError, TargetPath};

/// Copies the single value matched by `source` to `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "MappingSpec", into = "MappingSpec")]
pub struct Mapping {
    source: JsonPathQuery,
    target: TargetPath,
}

/// Textual form of a mapping, as found in definitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingSpec {
    pub source: String,
    pub target: String,
}

impl Mapping {
    pub fn new(source: &str, target: &str) -> Result<Self, MappingError> {
        Ok(Self {
            source: JsonPathQuery::parse(source)?,
            target: TargetPath::parse(target)?,
        })
    }

    pub fn source(&self) -> &JsonPathQuery {
        &self.source
    }

    pub fn target(&self) -> &TargetPath {
        &self.target
    }
}

impl TryFrom<MappingSpec> for Mapping {
    type Error = MappingError;

    fn try_from(spec: MappingSpec) -> Result<Self, Self::Error> {
        Mapping::new(&spec.source, &spec.target)
    }
}

impl From<Mapping> for MappingSpec {
    fn from(mapping: Mapping) -> Self {
        MappingSpec {
            source: mapping.source.expression().to_string(),
            target: mapping.target.expression().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_from_strings() {
        let mapping: Mapping =
            serde_json::from_str(r#"{"source": "$.a.b", "target": "x.y"}"#).unwrap();
        assert_eq!(mapping.source().expression(), "$.a.b");
        assert_eq!(mapping.target().segments().len(), 2);

        let err = serde_json::from_str::<Mapping>(r#"{"source": "a", "target": "x"}"#)
            .unwrap_err()
            .to_string();
        assert!(err.contains("must start with '$'"), "{err}");
    }
}
