//! ARGONAUT Core Types
//!
//! This crate contains pure types and logic with no I/O: the error taxonomy
//! shared by the compiler and the wrappers, node ids, content hashes used to
//! name templates, and name sanitisation.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod hash;
pub mod id;
pub mod name;

// Re-exports
pub use error::{CoreError, CoreResult};
pub use hash::{IdentityHash, NAME_HASH_LEN, content_name};
pub use id::NodeId;
pub use name::{is_reserved_attribute, sanitize_name, sanitize_param};
