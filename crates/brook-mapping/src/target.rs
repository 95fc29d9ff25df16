use std::fmt;

use crate::MappingError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

/// Where a mapped value is written: `$` (root), `a.b`, `$.a.b`, `orders[0].id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetPath {
    expression: String,
    segments: Vec<PathSegment>,
}

impl TargetPath {
    pub fn parse(expression: &str) -> Result<Self, MappingError> {
        let invalid = |reason: &str| MappingError::InvalidTarget {
            expression: expression.to_string(),
            reason: reason.to_string(),
        };
        let trimmed = expression.trim();
        let body = match trimmed.strip_prefix('$') {
            Some("") => "",
            Some(rest) => rest
                .strip_prefix('.')
                .ok_or_else(|| invalid("expected '.' after '$'"))?,
            None => trimmed,
        };

        let mut segments = Vec::new();
        if !body.is_empty() {
            for part in body.split('.') {
                let (name, mut markers) = match part.find('[') {
                    Some(at) => (&part[..at], &part[at..]),
                    None => (part, ""),
                };
                if name.is_empty() {
                    return Err(invalid("empty path segment"));
                }
                if name.contains(']') {
                    return Err(invalid("unbalanced ']'"));
                }
                segments.push(PathSegment::Field(name.to_string()));
                while !markers.is_empty() {
                    let close = markers
                        .find(']')
                        .filter(|_| markers.starts_with('['))
                        .ok_or_else(|| invalid("malformed array marker"))?;
                    let index = markers[1..close]
                        .trim()
                        .parse()
                        .map_err(|_| invalid("array marker must hold an index"))?;
                    segments.push(PathSegment::Index(index));
                    markers = &markers[close + 1..];
                }
            }
        }
        Ok(Self {
            expression: trimmed.to_string(),
            segments,
        })
    }

    pub fn root() -> Self {
        Self {
            expression: "$".into(),
            segments: Vec::new(),
        }
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for TargetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotted_and_prefixed_forms_agree() {
        let plain = TargetPath::parse("x.y").unwrap();
        let prefixed = TargetPath::parse("$.x.y").unwrap();
        assert_eq!(plain.segments(), prefixed.segments());
        assert_eq!(
            plain.segments(),
            &[PathSegment::Field("x".into()), PathSegment::Field("y".into())]
        );
    }

    #[test]
    fn array_markers() {
        let path = TargetPath::parse("orders[0].id").unwrap();
        assert_eq!(
            path.segments(),
            &[
                PathSegment::Field("orders".into()),
                PathSegment::Index(0),
                PathSegment::Field("id".into()),
            ]
        );
        let nested = TargetPath::parse("$.grid[1][2]").unwrap();
        assert_eq!(nested.segments().len(), 3);
    }

    #[test]
    fn root_sentinel() {
        assert!(TargetPath::parse("$").unwrap().is_root());
        assert!(TargetPath::root().is_root());
    }

    #[test]
    fn rejects_malformed_targets() {
        for bad in ["$x", "a..b", "[0]", "a[", "a[x]", "a]b", "a[0]b"] {
            assert!(
                matches!(TargetPath::parse(bad), Err(MappingError::InvalidTarget { .. })),
                "{bad} should be rejected"
            );
        }
    }
}
