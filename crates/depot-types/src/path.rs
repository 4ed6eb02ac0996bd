//! Hierarchical tag names.
//!
//! A [`TagPath`] is an ordered sequence of segments. `webapps/foo` has the
//! segments `["webapps", "foo"]`; the empty sequence is the root path and is
//! written as `""`. Change notifications bubble from a path through each of
//! its [`ancestors`](TagPath::ancestors) up to the root.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// Segment separator in the textual form.
pub const SEPARATOR: char = '/';

/// A validated, hierarchical tag name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagPath {
    segments: Vec<String>,
}

impl TagPath {
    /// The root path `""`.
    pub const fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// Parse a `/`-separated name.
    ///
    /// The empty string parses to the root. Segments must be non-empty, must
    /// not be `.` or `..`, and must not contain control characters (the tag
    /// index is line oriented).
    pub fn parse(name: &str) -> Result<Self, TypeError> {
        if name.is_empty() {
            return Ok(Self::root());
        }
        let segments = name
            .split(SEPARATOR)
            .map(|segment| validate_segment(name, segment).map(|()| segment.to_string()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { segments })
    }

    /// Build a path from pre-split segments, validating each.
    pub fn from_segments<I, S>(segments: I) -> Result<Self, TypeError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        for segment in &segments {
            if segment.contains(SEPARATOR) {
                return Err(invalid(&segments.join("/"), "segment contains '/'"));
            }
            validate_segment(&segments.join("/"), segment)?;
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Last segment, `None` for the root.
    pub fn leaf(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// The enclosing path, `None` for the root.
    pub fn parent(&self) -> Option<TagPath> {
        if self.is_root() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Append one segment.
    pub fn join(&self, segment: &str) -> Result<TagPath, TypeError> {
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Self::from_segments(segments)
    }

    /// `true` if `self` equals `other` or lies beneath it.
    pub fn starts_with(&self, other: &TagPath) -> bool {
        self.segments.starts_with(&other.segments)
    }

    /// This path, then each enclosing path, ending with the root.
    ///
    /// `webapps/foo` yields `webapps/foo`, `webapps`, `""`.
    pub fn ancestors(&self) -> Ancestors<'_> {
        Ancestors {
            path: self,
            next_len: Some(self.segments.len()),
        }
    }

    /// The textual form, segments joined by `/`.
    pub fn as_string(&self) -> String {
        self.segments.join("/")
    }
}

/// Iterator returned by [`TagPath::ancestors`].
pub struct Ancestors<'a> {
    path: &'a TagPath,
    next_len: Option<usize>,
}

impl Iterator for Ancestors<'_> {
    type Item = TagPath;

    fn next(&mut self) -> Option<TagPath> {
        let len = self.next_len?;
        self.next_len = len.checked_sub(1);
        Some(TagPath {
            segments: self.path.segments[..len].to_vec(),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.next_len.map_or(0, |len| len + 1);
        (n, Some(n))
    }
}

impl ExactSizeIterator for Ancestors<'_> {}

fn validate_segment(name: &str, segment: &str) -> Result<(), TypeError> {
    if segment.is_empty() {
        return Err(invalid(name, "empty path segment"));
    }
    if segment == "." || segment == ".." {
        return Err(invalid(name, "'.' and '..' are not valid segments"));
    }
    if let Some(ch) = segment.chars().find(|c| c.is_control()) {
        return Err(invalid(name, &format!("contains control character {ch:?}")));
    }
    Ok(())
}

fn invalid(name: &str, reason: &str) -> TypeError {
    TypeError::InvalidTagName {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

impl fmt::Display for TagPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            f.write_str(segment)?;
        }
        Ok(())
    }
}

impl FromStr for TagPath {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for TagPath {
    type Error = TypeError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl Serialize for TagPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_string())
    }
}

impl<'de> Deserialize<'de> for TagPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
