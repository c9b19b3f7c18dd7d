//! Object path validation.
//!
//! Object paths are `/`-separated relative keys such as
//! `inventory/users/20240101T000000000000_1_op`. The same key must be valid on
//! every backend, so the rules are the intersection of what a filesystem and a
//! bucket accept:
//!
//! - Must be non-empty (except for the root listing, see [`validate_prefix`])
//! - Must not start or end with `/`, or contain `//`
//! - Must not contain `\` or NUL
//! - Components must not be `.` or `..`

use crate::error::{StoreError, StoreResult};

/// Characters that are forbidden anywhere in an object path.
const FORBIDDEN_CHARS: &[char] = &['\\', '\0'];

/// Validate an object path.
pub fn validate_path(path: &str) -> StoreResult<()> {
    if path.is_empty() {
        return Err(StoreError::invalid_path(path, "path must not be empty"));
    }
    validate_prefix(path)
}

/// Validate a listing prefix. Same rules as [`validate_path`], but the empty
/// string (the store root) is accepted.
pub fn validate_prefix(path: &str) -> StoreResult<()> {
    if path.is_empty() {
        return Ok(());
    }

    for ch in FORBIDDEN_CHARS {
        if path.contains(*ch) {
            return Err(StoreError::invalid_path(
                path,
                format!("contains forbidden character: {ch:?}"),
            ));
        }
    }

    if path.starts_with('/') || path.ends_with('/') {
        return Err(StoreError::invalid_path(
            path,
            "must not start or end with '/'",
        ));
    }

    for component in path.split('/') {
        match component {
            "" => {
                return Err(StoreError::invalid_path(
                    path,
                    "path components must not be empty",
                ))
            }
            "." | ".." => {
                return Err(StoreError::invalid_path(
                    path,
                    format!("relative component not allowed: {component:?}"),
                ))
            }
            _ => {}
        }
    }

    Ok(())
}

/// Join a parent path and a child name with `/`.
pub fn join(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        child.to_string()
    } else {
        format!("{parent}/{child}")
    }
}
