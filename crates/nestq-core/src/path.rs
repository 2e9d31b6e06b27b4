//! Dotted field references (`"customer.region"`).
//!
//! Construction never fails; whether a path names a declared field is decided
//! when a descriptor is compiled against a schema.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    pub fn new(segments: Vec<String>) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// False for the empty path and for paths with empty segments (`"a..b"`).
    pub fn is_well_formed(&self) -> bool {
        !self.segments.is_empty() && self.segments.iter().all(|s| !s.is_empty())
    }

    pub fn first(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// `self` followed by `other`.
    pub fn join(&self, other: &FieldPath) -> FieldPath {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        FieldPath { segments }
    }

    pub fn child(&self, name: &str) -> FieldPath {
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        FieldPath { segments }
    }
}

impl From<&str> for FieldPath {
    fn from(s: &str) -> Self {
        if s.is_empty() {
            return Self { segments: vec![] };
        }
        Self {
            segments: s.split('.').map(str::to_string).collect(),
        }
    }
}

impl From<String> for FieldPath {
    fn from(s: String) -> Self {
        FieldPath::from(s.as_str())
    }
}

impl From<FieldPath> for String {
    fn from(p: FieldPath) -> Self {
        p.to_string()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::FieldPath;

    #[test]
    fn parses_dotted_paths() {
        let p = FieldPath::from("a.b.c");
        assert_eq!(p.len(), 3);
        assert_eq!(p.first(), Some("a"));
        assert_eq!(p.last(), Some("c"));
        assert_eq!(p.to_string(), "a.b.c");
        assert!(p.is_well_formed());
    }

    #[test]
    fn empty_segments_are_not_well_formed() {
        assert!(!FieldPath::from("").is_well_formed());
        assert!(!FieldPath::from("a..b").is_well_formed());
    }

    #[test]
    fn serde_uses_the_dotted_form() {
        let p: FieldPath = serde_json::from_str("\"x.y\"").unwrap();
        assert_eq!(p, FieldPath::from("x.y"));
        assert_eq!(serde_json::to_string(&p).unwrap(), "\"x.y\"");
    }
}
