//! Filename validation
//!
//! A stored file is addressed by a bare name. Anything that could resolve
//! outside the store root is rejected before touching the filesystem.

use std::path::{Component, Path};

use crate::error::{FileportError, Result};

/// Prefix of temp files created while an upload is being written
pub(crate) const TEMP_PREFIX: &str = ".upload-";

/// Suffix of temp files created while an upload is being written
pub(crate) const TEMP_SUFFIX: &str = ".part";

/// Check that `name` is a single, plain path component
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(FileportError::InvalidName("filename is empty".to_string()));
    }

    if name.contains(['/', '\\', '\0']) {
        return Err(FileportError::InvalidName(name.to_string()));
    }

    // Commands are whitespace-delimited; such a name could not be addressed
    if name.chars().any(char::is_whitespace) {
        return Err(FileportError::InvalidName(name.to_string()));
    }

    // Catches ".", "..", and platform prefixes such as "C:"
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => {}
        _ => return Err(FileportError::InvalidName(name.to_string())),
    }

    if is_temp_name(name) {
        return Err(FileportError::InvalidName(name.to_string()));
    }

    Ok(())
}

/// Names reserved for in-flight uploads
pub(crate) fn is_temp_name(name: &str) -> bool {
    name.starts_with(TEMP_PREFIX) && name.ends_with(TEMP_SUFFIX)
}
