//! Name sanitisation for generated documents.
//!
//! Template and step names use kebab-case; parameter names keep their
//! snake_case spelling.

/// Sanitise a function or workflow name into kebab-case
#[must_use]
pub fn sanitize_name(name: &str) -> String {
    name.replace('_', "-")
}

/// Sanitise a parameter name, keeping snake_case
#[must_use]
pub fn sanitize_param(name: &str) -> String {
    name.replace('-', "_")
}

/// Whether `name` looks like a reserved special identifier (`__name__`)
#[must_use]
pub fn is_reserved_attribute(name: &str) -> bool {
    name.len() > 4 && name.starts_with("__") && name.ends_with("__")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("say_hello"), "say-hello");
        assert_eq!(sanitize_name("already-kebab"), "already-kebab");
    }

    #[test]
    fn test_sanitize_param() {
        assert_eq!(sanitize_param("partition_size"), "partition_size");
        assert_eq!(sanitize_param("partition-size"), "partition_size");
    }

    #[test]
    fn test_reserved_attribute() {
        assert!(is_reserved_attribute("__class__"));
        assert!(!is_reserved_attribute("__"));
        assert!(!is_reserved_attribute("_private"));
        assert!(!is_reserved_attribute("message"));
    }

    proptest! {
        #[test]
        fn prop_sanitized_name_has_no_underscore(name: String) {
            prop_assert!(!sanitize_name(&name).contains('_'));
        }
    }
}
