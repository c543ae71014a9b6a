//! Identifiers for traced workflow nodes.
//!
//! A node id is the sanitised function name followed by a short random
//! suffix, so ids are unique per call while staying readable in the
//! generated document.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::name::sanitize_name;

/// Alphabet used for node id suffixes
const SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz1234567890";

/// Length of the random node id suffix
pub const SUFFIX_LEN: usize = 5;

/// Node identifier - identifies one traced invocation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create a fresh id for a call to the function `name`
    #[must_use]
    pub fn generate(name: &str) -> Self {
        Self(format!("{}-{}", sanitize_name(name), random_suffix()))
    }

    /// Wrap an existing id string
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Get as string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Short random suffix drawn from a v4 UUID
fn random_suffix() -> String {
    Uuid::new_v4()
        .as_bytes()
        .iter()
        .take(SUFFIX_LEN)
        .map(|b| SUFFIX_ALPHABET[*b as usize % SUFFIX_ALPHABET.len()] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_prefix() {
        let id = NodeId::generate("say_hello");
        assert!(id.as_str().starts_with("say-hello-"));
        assert_eq!(id.as_str().len(), "say-hello-".len() + SUFFIX_LEN);
    }

    #[test]
    fn test_node_id_unique() {
        let id1 = NodeId::generate("task");
        let id2 = NodeId::generate("task");
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_node_id_suffix_alphabet() {
        let id = NodeId::generate("t");
        let suffix = &id.as_str()[2..];
        assert!(suffix.bytes().all(|b| SUFFIX_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_node_id_display() {
        let id = NodeId::from_raw("print-data-abcde");
        assert_eq!(format!("{}", id), "print-data-abcde");
    }

    #[test]
    fn test_node_id_serializes_as_string() {
        let id = NodeId::from_raw("a-12345");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"a-12345\"");
    }
}
