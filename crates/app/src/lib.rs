//! repodeck application library
//!
//! Adapters (git2, record/config stores), the operation dispatcher and the
//! repository service, exposed for the binary and for integration tests.

pub mod adapters;
pub mod services;
pub mod cli;
