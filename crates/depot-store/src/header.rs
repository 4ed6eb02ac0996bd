//! Line-oriented `key: value` header codec.
//!
//! Used for commit objects and tag entry blobs:
//!
//! ```text
//! tag: webapps/foo
//! root: 5e1f...
//! note: first line\
//! second line
//!
//! optional free-form body
//! ```
//!
//! Values escape `\` as `\\` and a newline as `\` followed by a newline
//! (backslash-newline continuation). A blank line ends the header block; any
//! remaining text is the body.

use thiserror::Error;

/// Errors from header encoding or parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeaderError {
    #[error("invalid header key {0:?}")]
    InvalidKey(String),

    #[error("header line {line} has no ': ' separator")]
    MissingSeparator { line: usize },
}

/// Ordered header fields plus an optional body.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Headers {
    fields: Vec<(String, String)>,
    body: Option<String>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field. Keys must be non-empty and free of `:`, whitespace
    /// and control characters.
    pub fn push(&mut self, key: &str, value: &str) -> Result<&mut Self, HeaderError> {
        validate_key(key)?;
        self.fields.push((key.to_string(), value.to_string()));
        Ok(self)
    }

    pub fn set_body(&mut self, body: impl Into<String>) -> &mut Self {
        self.body = Some(body.into());
        self
    }

    /// First value recorded under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    pub fn encode(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.fields {
            out.push_str(key);
            out.push_str(": ");
            escape_into(&mut out, value);
            out.push('\n');
        }
        if let Some(body) = &self.body {
            out.push('\n');
            out.push_str(body);
        }
        out
    }

    pub fn parse(text: &str) -> Result<Self, HeaderError> {
        let mut headers = Headers::new();
        let mut rest = text;
        let mut line = 1;

        while !rest.is_empty() {
            if let Some(body) = rest.strip_prefix('\n') {
                headers.body = Some(body.to_string());
                return Ok(headers);
            }
            let sep = rest
                .find(": ")
                .filter(|&i| !rest[..i].contains('\n'))
                .ok_or(HeaderError::MissingSeparator { line })?;
            let key = &rest[..sep];
            validate_key(key)?;

            let (value, consumed, lines) = unescape_value(&rest[sep + 2..]);
            headers.fields.push((key.to_string(), value));
            rest = &rest[sep + 2 + consumed..];
            line += lines;
        }
        Ok(headers)
    }
}

fn validate_key(key: &str) -> Result<(), HeaderError> {
    if key.is_empty()
        || key
            .chars()
            .any(|c| c == ':' || c.is_whitespace() || c.is_control())
    {
        return Err(HeaderError::InvalidKey(key.to_string()));
    }
    Ok(())
}

fn escape_into(out: &mut String, value: &str) {
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\\n"),
            _ => out.push(ch),
        }
    }
}

/// Decode one value up to its terminating newline.
///
/// Returns the value, the number of bytes consumed (including the
/// terminator, if any) and the number of physical lines spanned.
fn unescape_value(input: &str) -> (String, usize, usize) {
    let mut value = String::new();
    let mut lines = 1;
    let mut chars = input.char_indices();

    while let Some((i, ch)) = chars.next() {
        match ch {
            '\n' => return (value, i + 1, lines),
            '\\' => match chars.clone().next() {
                Some((_, '\\')) => {
                    chars.next();
                    value.push('\\');
                }
                Some((_, '\n')) => {
                    chars.next();
                    value.push('\n');
                    lines += 1;
                }
                _ => value.push('\\'),
            },
            _ => value.push(ch),
        }
    }
    (value, input.len(), lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn encodes_simple_fields() {
        let mut h = Headers::new();
        h.push("tag", "webapps/foo").unwrap();
        h.push("root", "abc").unwrap();
        assert_eq!(h.encode(), "tag: webapps/foo\nroot: abc\n");
    }

    #[test]
    fn multiline_values_use_continuation() {
        let mut h = Headers::new();
        h.push("note", "first\nsecond").unwrap();
        assert_eq!(h.encode(), "note: first\\\nsecond\n");

        let parsed = Headers::parse(&h.encode()).unwrap();
        assert_eq!(parsed.get("note"), Some("first\nsecond"));
    }

    #[test]
    fn backslashes_are_escaped() {
        let mut h = Headers::new();
        h.push("path", "C:\\deploy\\").unwrap();
        let text = h.encode();
        assert_eq!(text, "path: C:\\\\deploy\\\\\n");
        assert_eq!(Headers::parse(&text).unwrap().get("path"), Some("C:\\deploy\\"));
    }

    #[test]
    fn body_follows_blank_line() {
        let mut h = Headers::new();
        h.push("tree", "t").unwrap();
        h.set_body("deploy v2\n");
        let text = h.encode();
        assert_eq!(text, "tree: t\n\ndeploy v2\n");

        let parsed = Headers::parse(&text).unwrap();
        assert_eq!(parsed.get("tree"), Some("t"));
        assert_eq!(parsed.body(), Some("deploy v2\n"));
    }

    #[test]
    fn missing_trailing_newline_is_accepted() {
        let parsed = Headers::parse("tag: a").unwrap();
        assert_eq!(parsed.get("tag"), Some("a"));
        assert_eq!(parsed.body(), None);
    }

    #[test]
    fn rejects_bad_keys() {
        let mut h = Headers::new();
        assert!(h.push("", "x").is_err());
        assert!(h.push("a b", "x").is_err());
        assert!(h.push("a:b", "x").is_err());
        assert!(h.push("a\nb", "x").is_err());
    }

    #[test]
    fn reports_line_without_separator() {
        let err = Headers::parse("tag: a\ngarbage\n").unwrap_err();
        assert_eq!(err, HeaderError::MissingSeparator { line: 2 });
    }

    #[test]
    fn first_value_wins_on_lookup() {
        let parsed = Headers::parse("k: 1\nk: 2\n").unwrap();
        assert_eq!(parsed.get("k"), Some("1"));
        assert_eq!(parsed.fields().count(), 2);
    }

    proptest! {
        #[test]
        fn arbitrary_values_roundtrip(value in "\\PC*|[a-z\\\\\n]{0,16}") {
            let mut h = Headers::new();
            h.push("key", &value).unwrap();
            h.push("after", "sentinel").unwrap();
            let parsed = Headers::parse(&h.encode()).unwrap();
            prop_assert_eq!(parsed.get("key"), Some(value.as_str()));
            prop_assert_eq!(parsed.get("after"), Some("sentinel"));
        }
    }
}
