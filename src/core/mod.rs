//! Shared error types and environment context.
//!
//! These are the load-bearing primitives every other component depends on:
//! [`ApmError`]/[`ErrorContext`] for failure reporting, and [`Environment`]
//! for the one place process environment and working directory are read
//! from. Warnings (malformed frontmatter, unknown manifest keys, a version
//! coercion, a detected cycle) are not threaded through a dedicated result
//! type; they're logged via `tracing::warn!` at the point of detection,
//! which is what actually reaches the user, since nothing downstream ever
//! read a separate warnings list.

pub mod environment;
pub mod error;

pub use environment::Environment;
pub use error::{ApmError, ErrorContext, contextualize};
