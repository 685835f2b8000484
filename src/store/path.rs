use crate::error::{Error, Result};

const MAX_NAME_LEN: usize = 255;

/// Top-level entries of a space directory that a space name must never
/// shadow.
pub const RESERVED_NAMES: &[&str] = &[
    "page",
    "keep",
    "file",
    "meta",
    "index",
    "changes.log",
    "config",
    "config.toml",
];

/// Validate a page or file name as it appears percent-decoded in URLs.
///
/// Names become single filesystem components and single fields in the
/// line-framed change log, so separators, control characters, and leading
/// dots are rejected. Anything else that round-trips UTF-8 is allowed.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidName("empty name".to_string()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(Error::InvalidName(format!(
            "name exceeds {MAX_NAME_LEN} bytes"
        )));
    }
    if name.starts_with('.') {
        return Err(Error::InvalidName(name.to_string()));
    }
    if name.contains('/') || name.chars().any(char::is_control) {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Validate a space name. Spaces share a directory level with the store's
/// own entries, so the reserved set is rejected on top of the name rules.
pub fn validate_space_name(name: &str) -> Result<()> {
    validate_name(name)?;
    if RESERVED_NAMES.contains(&name) {
        return Err(Error::InvalidName(format!("reserved name: {name}")));
    }
    Ok(())
}
