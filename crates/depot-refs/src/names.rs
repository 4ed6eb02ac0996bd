//! Ref name validation following git-style conventions.
//!
//! Valid ref names:
//! - Must live under `refs/`
//! - Must not contain whitespace, control characters, `~`, `^`, `:`, `?`,
//!   `*`, `[`, `\`
//! - Must not contain `..` or `@{`
//! - Must not start or end with `/`, must not end with `.lock`
//! - Components between slashes must be non-empty and not start with `.`

use crate::error::{RefError, Result};

/// Characters that are forbidden anywhere in a ref name.
const FORBIDDEN_CHARS: &[char] = &['~', '^', ':', '?', '*', '[', '\\'];

/// Namespace every ref lives in.
pub const REFS_PREFIX: &str = "refs/";

/// Validate a ref name, returning `Ok(())` if valid.
///
/// # Examples
///
/// ```
/// use depot_refs::names::validate_ref_name;
///
/// assert!(validate_ref_name("refs/depot/root").is_ok());
/// assert!(validate_ref_name("").is_err());
/// assert!(validate_ref_name("refs/../escape").is_err());
/// ```
pub fn validate_ref_name(name: &str) -> Result<()> {
    let reject = |reason: String| {
        Err(RefError::InvalidName {
            name: name.to_string(),
            reason,
        })
    };

    if name.is_empty() {
        return reject("ref name must not be empty".into());
    }
    if !name.starts_with(REFS_PREFIX) {
        return reject(format!("must start with {REFS_PREFIX:?}"));
    }
    if let Some(ch) = name
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || FORBIDDEN_CHARS.contains(c))
    {
        return reject(format!("contains forbidden character: {ch:?}"));
    }
    if name.contains("..") {
        return reject("must not contain '..'".into());
    }
    if name.contains("@{") {
        return reject("must not contain '@{'".into());
    }
    if name.starts_with('/') || name.ends_with('/') {
        return reject("must not start or end with '/'".into());
    }
    if name.ends_with(".lock") {
        return reject("must not end with '.lock'".into());
    }
    for component in name.split('/') {
        if component.is_empty() {
            return reject("path components must not be empty".into());
        }
        if component.starts_with('.') {
            return reject(format!("component must not start with '.': {component:?}"));
        }
    }
    Ok(())
}
