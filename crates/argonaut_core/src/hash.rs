//! Identity digests for template naming.
//!
//! Template names combine a readable prefix with a short BLAKE3 digest of
//! the function's qualified identity (module path, definition site, name).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::name::sanitize_name;

/// Number of hex characters kept in a template name suffix
pub const NAME_HASH_LEN: usize = 8;

/// BLAKE3 digest of a function identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityHash([u8; 32]);

impl IdentityHash {
    /// Digest of `identity`
    #[must_use]
    pub fn of(identity: &str) -> Self {
        Self(*blake3::hash(identity.as_bytes()).as_bytes())
    }

    /// First `len` hex characters, at most 64
    #[must_use]
    pub fn prefix(&self, len: usize) -> String {
        let mut hex = hex::encode(self.0);
        hex.truncate(len);
        hex
    }
}

impl fmt::Display for IdentityHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Derive a template name from a display name and a qualified identity.
///
/// The same identity always yields the same name; two identities sharing a
/// display name yield different names.
#[must_use]
pub fn content_name(display: &str, identity: &str) -> String {
    let digest = IdentityHash::of(identity);
    format!("{}-{}", sanitize_name(display), digest.prefix(NAME_HASH_LEN))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_digest_display() {
        let digest = IdentityHash::of("demo::say_hello");
        let shown = digest.to_string();
        assert_eq!(shown.len(), 64);
        assert!(shown.starts_with(&digest.prefix(NAME_HASH_LEN)));
        assert_eq!(digest.prefix(100), shown);
    }

    #[test]
    fn test_content_name_shape() {
        let name = content_name("say_hello", "demo::greetings::say_hello");
        assert!(name.starts_with("say-hello-"));
        assert_eq!(name.len(), "say-hello-".len() + NAME_HASH_LEN);
    }

    #[test]
    fn test_content_name_collision_free_for_shared_display_name() {
        let a = content_name("say_hello", "demo::first::say_hello");
        let b = content_name("say_hello", "demo::second::say_hello");
        assert_ne!(a, b);
    }

    proptest! {
        #[test]
        fn prop_content_name_deterministic(display in "[a-z_]{1,12}", identity: String) {
            prop_assert_eq!(content_name(&display, &identity), content_name(&display, &identity));
        }
    }
}
