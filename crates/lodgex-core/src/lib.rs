//! Shared primitives for the lodgex reservation sync engine.
//!
//! This crate holds the pieces every other lodgex crate leans on: the
//! error taxonomy, the canonical instant type for upstream timestamp
//! shapes, money rounding and three-state field patches, and the
//! content-hash/diff utility used for idempotent writes and audit
//! trails.

pub mod error;
pub mod hash;
pub mod instant;
pub mod money;

pub use error::{CoreError, Result};
pub use hash::{content_hash, diff_documents, FieldDiff};
pub use instant::Instant;
pub use money::{round2, FieldPatch};
