//! Shared domain types for the proxgate door controller.
//!
//! Every other crate in the workspace speaks in terms of the types defined
//! here: the identity decoded from a proximity card, the directory entry that
//! authorizes it for a door, and the immutable decision record handed to
//! observers after each read.

pub mod constants;
pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
