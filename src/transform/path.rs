// src/transform/path.rs
//! Path expressions into shape-unknown JSON documents.
//!
//! Supported forms: `a.b.c`, `a[0].b`, `a.0.b`, `a[*].b`, `a.*.b` and the
//! empty path (the whole document). A key applied to an array fans out over
//! every element, so `items.v` on `{"items":[{"v":1},{"v":2}]}` yields both
//! values.

use serde_json::Value;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
    Wildcard,
}

/// A parsed path. Build it once (config load) and resolve it on every tick.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Path {
    raw: String,
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("empty segment in path `{0}`")]
    EmptySegment(String),
    #[error("unclosed `[` in path `{0}`")]
    UnclosedBracket(String),
    #[error("invalid index `{index}` in path `{path}`")]
    InvalidIndex { path: String, index: String },
}

/// Outcome of resolving a path. `Absent` means the path did not reach
/// anything; a present `null` is `Single(&Value::Null)`.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved<'a> {
    Absent,
    Single(&'a Value),
    Multiple(Vec<&'a Value>),
}

impl<'a> Resolved<'a> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Resolved::Absent)
    }

    /// First match, the way the binding engine reads tags and fields.
    pub fn first(&self) -> Option<&'a Value> {
        match self {
            Resolved::Absent => None,
            Resolved::Single(v) => Some(v),
            Resolved::Multiple(vs) => vs.first().copied(),
        }
    }

    /// Every match in document order.
    pub fn into_vec(self) -> Vec<&'a Value> {
        match self {
            Resolved::Absent => Vec::new(),
            Resolved::Single(v) => vec![v],
            Resolved::Multiple(vs) => vs,
        }
    }
}

impl Path {
    /// The empty path; resolves to the document itself.
    pub fn root() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Resolve against `doc`. Never fails; unreachable paths are `Absent`.
    pub fn resolve<'a>(&self, doc: &'a Value) -> Resolved<'a> {
        let mut current: Vec<&'a Value> = vec![doc];
        let mut fanned_out = false;

        for seg in &self.segments {
            let mut next = Vec::with_capacity(current.len());
            for v in current {
                match (seg, v) {
                    (Segment::Key(k), Value::Object(map)) => {
                        if let Some(child) = map.get(k) {
                            next.push(child);
                        }
                    }
                    (Segment::Key(k), Value::Array(items)) => {
                        fanned_out = true;
                        next.extend(items.iter().filter_map(|it| match it {
                            Value::Object(map) => map.get(k),
                            _ => None,
                        }));
                    }
                    (Segment::Index(i), Value::Array(items)) => {
                        if let Some(child) = items.get(*i) {
                            next.push(child);
                        }
                    }
                    // a numeric segment may also name an object key
                    (Segment::Index(i), Value::Object(map)) => {
                        if let Some(child) = map.get(&i.to_string()) {
                            next.push(child);
                        }
                    }
                    (Segment::Wildcard, Value::Array(items)) => {
                        fanned_out = true;
                        next.extend(items.iter());
                    }
                    (Segment::Wildcard, Value::Object(map)) => {
                        fanned_out = true;
                        next.extend(map.values());
                    }
                    _ => {}
                }
            }
            if next.is_empty() {
                return Resolved::Absent;
            }
            current = next;
        }

        match (fanned_out, current.len()) {
            (_, 0) => Resolved::Absent,
            (false, 1) => Resolved::Single(current[0]),
            _ => Resolved::Multiple(current),
        }
    }
}

impl FromStr for Path {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let mut segments = Vec::new();
        if raw.is_empty() {
            return Ok(Self::root());
        }

        for part in raw.split('.') {
            if part.is_empty() {
                return Err(PathError::EmptySegment(raw.to_string()));
            }
            let (head, mut rest) = match part.find('[') {
                Some(pos) => (&part[..pos], &part[pos..]),
                None => (part, ""),
            };
            if !head.is_empty() {
                segments.push(plain_segment(head));
            }
            while !rest.is_empty() {
                let Some(body) = rest.strip_prefix('[') else {
                    return Err(PathError::UnclosedBracket(raw.to_string()));
                };
                let Some(end) = body.find(']') else {
                    return Err(PathError::UnclosedBracket(raw.to_string()));
                };
                let inner = body[..end].trim();
                let seg = if inner == "*" {
                    Segment::Wildcard
                } else {
                    inner
                        .parse::<usize>()
                        .map(Segment::Index)
                        .map_err(|_| PathError::InvalidIndex {
                            path: raw.to_string(),
                            index: inner.to_string(),
                        })?
                };
                segments.push(seg);
                rest = &body[end + 1..];
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }
}

fn plain_segment(s: &str) -> Segment {
    if s == "*" {
        Segment::Wildcard
    } else if let Ok(i) = s.parse::<usize>() {
        Segment::Index(i)
    } else {
        Segment::Key(s.to_string())
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn p(s: &str) -> Path {
        s.parse().unwrap()
    }

    #[test]
    fn nested_keys_and_indices() {
        let doc = json!({"a": {"b": [{"c": 1}, {"c": 2}]}});
        assert_eq!(p("a.b[1].c").resolve(&doc), Resolved::Single(&json!(2)));
        assert_eq!(p("a.b.0.c").resolve(&doc), Resolved::Single(&json!(1)));
        assert!(p("a.b[5].c").resolve(&doc).is_absent());
        assert!(p("a.x").resolve(&doc).is_absent());
    }

    #[test]
    fn falsy_values_are_present() {
        let doc = json!({"n": null, "f": false, "z": 0});
        assert_eq!(p("n").resolve(&doc), Resolved::Single(&Value::Null));
        assert_eq!(p("f").resolve(&doc).first(), Some(&json!(false)));
        assert_eq!(p("z").resolve(&doc).first(), Some(&json!(0)));
    }

    #[test]
    fn key_on_array_fans_out() {
        let doc = json!({"items": [{"v": 1}, {"w": 2}, {"v": 3}]});
        let r = p("items.v").resolve(&doc);
        assert_eq!(r.first(), Some(&json!(1)));
        assert_eq!(r.into_vec(), vec![&json!(1), &json!(3)]);
        assert_eq!(p("items[*].v").resolve(&doc).into_vec().len(), 2);
    }

    #[test]
    fn empty_path_is_whole_document() {
        let doc = json!([1, 2]);
        assert_eq!(p("").resolve(&doc), Resolved::Single(&doc));
    }

    #[test]
    fn scalar_in_the_middle_is_absent() {
        let doc = json!({"a": 5});
        assert!(p("a.b").resolve(&doc).is_absent());
    }

    #[test]
    fn malformed_paths_are_rejected() {
        assert!(matches!(
            "a..b".parse::<Path>(),
            Err(PathError::EmptySegment(_))
        ));
        assert!(matches!(
            "a[1".parse::<Path>(),
            Err(PathError::UnclosedBracket(_))
        ));
        assert!(matches!(
            "a[x]".parse::<Path>(),
            Err(PathError::InvalidIndex { .. })
        ));
    }
}
