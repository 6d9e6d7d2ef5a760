//! repodeck core - pure domain logic with no external dependencies
//!
//! This crate contains the repository lifecycle types, the failure taxonomy,
//! the progress reporter, ref resolution and the ports (interfaces) that the
//! application layer implements. It has no dependencies on Git libraries,
//! async runtimes or filesystem access - those are handled by adapters.

pub mod domain;
pub mod ports;
pub mod app;
pub mod error;

// Re-exports for ergonomics
pub use domain::*;
pub use error::*;
