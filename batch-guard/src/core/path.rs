//! Attribute paths.
//!
//! Rule keys such as `*.items.*.email` are parsed once into an ordered list of
//! [`Segment`]s. A literal dot inside a field name is written `\.` in the rule
//! key and becomes part of a single [`Segment::Key`], so it can never be
//! mistaken for a nesting separator. [`Display`](std::fmt::Display) renders
//! the unescaped form, which is what appears in failure keys.

use serde::{Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::fmt;

/// One step of an attribute path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    /// A named field.
    Key(String),
    /// A numeric position (array index, or a numeric object key).
    Index(usize),
    /// `*`, matching every key at this nesting level.
    Wildcard,
}

impl Segment {
    /// Builds a segment from raw key text. Canonical decimal integers become
    /// [`Segment::Index`] so `items.0` and an expanded `items.*` compare equal.
    pub fn from_key(raw: &str) -> Self {
        if raw == "*" {
            return Segment::Wildcard;
        }
        let canonical_number = !raw.is_empty()
            && raw.bytes().all(|b| b.is_ascii_digit())
            && (raw == "0" || !raw.starts_with('0'));
        if canonical_number {
            if let Ok(index) = raw.parse::<usize>() {
                return Segment::Index(index);
            }
        }
        Segment::Key(raw.to_string())
    }

    /// The text this segment contributes to a rendered path.
    pub fn text(&self) -> String {
        match self {
            Segment::Key(key) => key.clone(),
            Segment::Index(index) => index.to_string(),
            Segment::Wildcard => "*".to_string(),
        }
    }

    fn step<'a>(&self, node: &'a JsonValue) -> Option<&'a JsonValue> {
        match (self, node) {
            (Segment::Key(key), JsonValue::Object(map)) => map.get(key),
            (Segment::Index(index), JsonValue::Array(items)) => items.get(*index),
            (Segment::Index(index), JsonValue::Object(map)) => map.get(&index.to_string()),
            _ => None,
        }
    }
}

/// A concrete path produced by expanding a wildcard pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expansion {
    /// The pattern with every wildcard replaced.
    pub path: AttributePath,
    /// The keys substituted for the wildcards, in order.
    pub keys: Vec<String>,
}

/// An attribute path, concrete or containing wildcards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttributePath {
    segments: Vec<Segment>,
}

impl AttributePath {
    /// Parses a rule key. `\.` is a literal dot, every other `.` separates segments.
    ///
    /// ```rust
    /// use batch_guard::core::AttributePath;
    ///
    /// let path = AttributePath::parse(r"*.contact\.email");
    /// assert_eq!(path.segments().len(), 2);
    /// assert_eq!(path.to_string(), "*.contact.email");
    /// assert_eq!(path.escaped(), r"*.contact\.email");
    /// ```
    pub fn parse(pattern: &str) -> Self {
        if pattern.is_empty() {
            return Self::default();
        }

        let mut segments = Vec::new();
        let mut current = String::new();
        let mut chars = pattern.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '\\' if chars.peek() == Some(&'.') => {
                    current.push('.');
                    chars.next();
                }
                '.' => segments.push(Segment::from_key(&std::mem::take(&mut current))),
                other => current.push(other),
            }
        }
        segments.push(Segment::from_key(&current));

        Self { segments }
    }

    /// Creates a path from already-parsed segments.
    pub fn from_segments(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    /// Returns the segments of this path.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Returns true when the path has no segments.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns true if any segment is a wildcard.
    pub fn has_wildcard(&self) -> bool {
        self.segments.contains(&Segment::Wildcard)
    }

    /// Returns the final segment's text when it names a field.
    pub fn last_key(&self) -> Option<&str> {
        match self.segments.last() {
            Some(Segment::Key(key)) => Some(key),
            _ => None,
        }
    }

    /// Returns the record index addressed by the leading segment, if any.
    pub fn record_index(&self) -> Option<usize> {
        match self.segments.first() {
            Some(Segment::Index(index)) => Some(*index),
            _ => None,
        }
    }

    /// Anchors the path at the record level. A path that starts with a field
    /// name (`email`) is read from every record, so it becomes `*.email`.
    /// Paths starting with an index or a wildcard are returned unchanged.
    pub fn record_relative(&self) -> AttributePath {
        match self.segments.first() {
            Some(Segment::Key(_)) => {
                let mut segments = Vec::with_capacity(self.segments.len() + 1);
                segments.push(Segment::Wildcard);
                segments.extend(self.segments.iter().cloned());
                Self { segments }
            }
            _ => self.clone(),
        }
    }

    /// Returns the path below the leading segment.
    pub fn tail(&self) -> AttributePath {
        Self {
            segments: self.segments.iter().skip(1).cloned().collect(),
        }
    }

    /// Returns the path with `*.` segments dropped, the way the attribute is
    /// named when reading per-record values (`*.email` becomes `email`).
    pub fn without_wildcards(&self) -> AttributePath {
        Self {
            segments: self
                .segments
                .iter()
                .filter(|s| **s != Segment::Wildcard)
                .cloned()
                .collect(),
        }
    }

    /// Renders the path with literal dots escaped, so that
    /// `AttributePath::parse(&p.escaped()) == p`.
    pub fn escaped(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text().replace('.', "\\."))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Returns true if this pattern matches the concrete path segment-for-segment.
    pub fn matches(&self, concrete: &AttributePath) -> bool {
        self.segments.len() == concrete.segments.len()
            && self
                .segments
                .iter()
                .zip(&concrete.segments)
                .all(|(p, c)| *p == Segment::Wildcard || p == c)
    }

    /// Resolves the path against a JSON document.
    pub fn resolve<'a>(&self, root: &'a JsonValue) -> Option<&'a JsonValue> {
        self.segments
            .iter()
            .try_fold(root, |node, segment| segment.step(node))
    }

    /// Expands every wildcard against the shape of `root`.
    ///
    /// A wildcard enumerates the indices of an array or the keys of an object
    /// at its level; a wildcard over a missing or scalar node yields nothing.
    /// Explicit segments after the last wildcard are kept even if the leaf is
    /// absent in the data. A path without wildcards expands to itself.
    pub fn expand(&self, root: &JsonValue) -> Vec<Expansion> {
        let mut out = Vec::new();
        let mut current = Vec::with_capacity(self.segments.len());
        let mut keys = Vec::new();
        self.walk(0, Some(root), &mut current, &mut keys, &mut out);
        out
    }

    fn walk(
        &self,
        depth: usize,
        node: Option<&JsonValue>,
        current: &mut Vec<Segment>,
        keys: &mut Vec<String>,
        out: &mut Vec<Expansion>,
    ) {
        let Some(segment) = self.segments.get(depth) else {
            out.push(Expansion {
                path: AttributePath::from_segments(current.clone()),
                keys: keys.clone(),
            });
            return;
        };

        match segment {
            Segment::Wildcard => {
                let children: Vec<(Segment, &JsonValue)> = match node {
                    Some(JsonValue::Array(items)) => items
                        .iter()
                        .enumerate()
                        .map(|(i, v)| (Segment::Index(i), v))
                        .collect(),
                    Some(JsonValue::Object(map)) => map
                        .iter()
                        .map(|(k, v)| (Segment::from_key(k), v))
                        .collect(),
                    _ => return,
                };
                for (child_segment, child) in children {
                    keys.push(child_segment.text());
                    current.push(child_segment);
                    self.walk(depth + 1, Some(child), current, keys, out);
                    current.pop();
                    keys.pop();
                }
            }
            explicit => {
                let child = node.and_then(|n| explicit.step(n));
                current.push(explicit.clone());
                self.walk(depth + 1, child, current, keys, out);
                current.pop();
            }
        }
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            f.write_str(&segment.text())?;
        }
        Ok(())
    }
}

impl From<&str> for AttributePath {
    fn from(pattern: &str) -> Self {
        Self::parse(pattern)
    }
}

impl Serialize for AttributePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}
