//! Database and namespace name validation.
//!
//! Both kinds of name become a single path component in object storage, so
//! they share one rule set:
//! - Must be non-empty and not only whitespace
//! - Must not contain `/`, `\`, control characters, or `:*?"<>|`
//! - Must not start with `.` (reserved for staging files)
//! - Must not start with `__` (reserved for `__METADATA__`, `__LEASES__`)

use crate::error::{RegistryError, RegistryResult};

/// Characters that are forbidden anywhere in a name.
const FORBIDDEN_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

fn invalid(name: &str, reason: impl Into<String>) -> RegistryError {
    RegistryError::InvalidName {
        name: name.to_string(),
        reason: reason.into(),
    }
}

fn validate_component(name: &str, what: &str) -> RegistryResult<()> {
    if name.trim().is_empty() {
        return Err(invalid(name, format!("{what} name must not be empty")));
    }

    if let Some(ch) = name.chars().find(|c| c.is_control()) {
        return Err(invalid(name, format!("contains control character: {ch:?}")));
    }

    for ch in FORBIDDEN_CHARS {
        if name.contains(*ch) {
            return Err(invalid(name, format!("contains forbidden character: {ch:?}")));
        }
    }

    if name.starts_with('.') {
        return Err(invalid(name, "must not start with '.'"));
    }

    if name.starts_with("__") {
        return Err(invalid(name, "names starting with '__' are reserved"));
    }

    Ok(())
}

/// Validate a database name.
///
/// # Examples
///
/// ```
/// use fakedb_registry::names::validate_database_name;
///
/// assert!(validate_database_name("inventory").is_ok());
/// assert!(validate_database_name(" ").is_err());
/// assert!(validate_database_name("a/b").is_err());
/// ```
pub fn validate_database_name(name: &str) -> RegistryResult<()> {
    validate_component(name, "database")
}

/// Validate a collection or table name.
pub fn validate_namespace_name(name: &str) -> RegistryResult<()> {
    validate_component(name, "namespace")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn valid_names() {
        for name in ["db", "plain_mongo", "users-2024", "v1.0", "Ünïcode"] {
            assert!(validate_namespace_name(name).is_ok(), "{name:?}");
        }
    }

    #[test]
    fn reject_blank() {
        assert!(validate_database_name("").is_err());
        assert!(validate_database_name(" ").is_err());
        assert!(validate_database_name("\t").is_err());
    }

    #[test]
    fn reject_separators() {
        assert!(validate_namespace_name("a/b").is_err());
        assert!(validate_namespace_name("a\\b").is_err());
    }

    #[test]
    fn reject_reserved() {
        assert!(validate_namespace_name("__METADATA__").is_err());
        assert!(validate_database_name("__LEASES__").is_err());
        assert!(validate_namespace_name(".hidden").is_err());
    }

    #[test]
    fn reject_control_chars() {
        assert!(validate_namespace_name("bad\nname").is_err());
    }

    proptest! {
        #[test]
        fn any_slash_is_rejected(prefix in "[a-z]{1,8}", suffix in "[a-z]{0,8}") {
            let name = format!("{prefix}/{suffix}");
            prop_assert!(validate_namespace_name(&name).is_err());
        }

        #[test]
        fn simple_identifiers_are_accepted(name in "[a-zA-Z][a-zA-Z0-9_-]{0,30}") {
            prop_assert!(validate_namespace_name(&name).is_ok());
        }
    }
}
