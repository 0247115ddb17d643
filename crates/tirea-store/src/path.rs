//! Scope paths addressing a location inside a state value.
//!
//! A scope path is written as a dotted string (`"parents.1.name"`) and parsed
//! into segments. Each segment is either a key (for objects) or an index (for
//! arrays). Parsing is purely syntactic: whether a segment hits an object or
//! an array is decided when the path is resolved against a concrete value.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single segment in a scope path.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Seg {
    /// Property access: `{"key": value}`
    Key(String),
    /// Element access: `[index]`
    Index(usize),
}

impl Seg {
    /// Parse a single dotted-path segment.
    ///
    /// Canonical decimal integers (`"0"`, `"12"`, but not `"01"` or `"+1"`)
    /// become index segments, anything else is a key.
    pub fn parse(segment: &str) -> Self {
        match parse_index(segment) {
            Some(i) => Seg::Index(i),
            None => Seg::Key(segment.to_owned()),
        }
    }

    /// The property name this segment uses when applied to an object.
    pub fn to_key_string(&self) -> String {
        match self {
            Seg::Key(k) => k.clone(),
            Seg::Index(i) => i.to_string(),
        }
    }

    /// The element index this segment uses when applied to an array.
    #[inline]
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Seg::Key(k) => parse_index(k),
            Seg::Index(i) => Some(*i),
        }
    }
}

/// Parse a canonical array index.
pub(crate) fn parse_index(s: &str) -> Option<usize> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if s.len() > 1 && s.starts_with('0') {
        return None;
    }
    s.parse().ok()
}

impl fmt::Display for Seg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Seg::Key(k) => write!(f, ".{}", k),
            Seg::Index(i) => write!(f, "[{}]", i),
        }
    }
}

impl From<String> for Seg {
    fn from(s: String) -> Self {
        Seg::Key(s)
    }
}

impl From<&str> for Seg {
    fn from(s: &str) -> Self {
        Seg::Key(s.to_owned())
    }
}

impl From<usize> for Seg {
    fn from(i: usize) -> Self {
        Seg::Index(i)
    }
}

/// A complete path from a store's root value to a nested value.
///
/// # Examples
///
/// ```
/// use tirea_store::{Path, Seg};
///
/// let path = Path::parse("parents.1.name");
/// assert_eq!(path.len(), 3);
/// assert_eq!(path[1], Seg::Index(1));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Path(Vec<Seg>);

impl Path {
    /// Create an empty path (root).
    #[inline]
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Parse a dotted path.
    ///
    /// The string is split on every `.`; empty segments are kept as empty
    /// keys, so `""` addresses the property `""` rather than the root.
    pub fn parse(dotted: &str) -> Self {
        Self(dotted.split('.').map(Seg::parse).collect())
    }

    /// Append a key segment and return self (builder pattern).
    #[inline]
    pub fn key(mut self, k: impl Into<String>) -> Self {
        self.0.push(Seg::Key(k.into()));
        self
    }

    /// Append an index segment and return self (builder pattern).
    #[inline]
    pub fn index(mut self, i: usize) -> Self {
        self.0.push(Seg::Index(i));
        self
    }

    /// Push a segment onto the path (mutating).
    #[inline]
    pub fn push(&mut self, seg: Seg) {
        self.0.push(seg);
    }

    /// Pop the last segment from the path.
    #[inline]
    pub fn pop(&mut self) -> Option<Seg> {
        self.0.pop()
    }

    /// Get the segments of this path.
    #[inline]
    pub fn segments(&self) -> &[Seg] {
        &self.0
    }

    /// Check if this path is empty (root).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get the number of segments in this path.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Get the last segment.
    #[inline]
    pub fn last(&self) -> Option<&Seg> {
        self.0.last()
    }

    /// Append a segment and return a new path (non-mutating builder).
    #[inline]
    pub fn with_segment(&self, seg: Seg) -> Path {
        let mut result = self.clone();
        result.0.push(seg);
        result
    }

    /// Split off the last segment, returning the owning path and the segment.
    pub fn split_last(&self) -> Option<(Path, &Seg)> {
        let (last, rest) = self.0.split_last()?;
        Some((Path(rest.to_vec()), last))
    }

    /// Render the path back into its dotted form.
    pub fn to_dotted(&self) -> String {
        self.0
            .iter()
            .map(Seg::to_key_string)
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Iterate over the segments.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Seg> {
        self.0.iter()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$")?;
        for seg in &self.0 {
            write!(f, "{}", seg)?;
        }
        Ok(())
    }
}

impl FromIterator<Seg> for Path {
    fn from_iter<I: IntoIterator<Item = Seg>>(iter: I) -> Self {
        Path(iter.into_iter().collect())
    }
}

impl IntoIterator for Path {
    type Item = Seg;
    type IntoIter = std::vec::IntoIter<Seg>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Path {
    type Item = &'a Seg;
    type IntoIter = std::slice::Iter<'a, Seg>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl std::ops::Index<usize> for Path {
    type Output = Seg;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl From<&str> for Path {
    fn from(dotted: &str) -> Self {
        Path::parse(dotted)
    }
}

/// Construct a `Path` from a sequence of segments.
///
/// # Examples
///
/// ```
/// use tirea_store::path;
///
/// // String literals become Key segments
/// let p = path!("mum", "name");
///
/// // Numbers become Index segments
/// let p = path!("parents", 1usize, "name");
/// assert_eq!(p.to_dotted(), "parents.1.name");
/// ```
#[macro_export]
macro_rules! path {
    () => {
        $crate::Path::root()
    };
    ($($seg:expr),+ $(,)?) => {{
        let mut p = $crate::Path::root();
        $(
            p.push($crate::Seg::from($seg));
        )+
        p
    }};
}
