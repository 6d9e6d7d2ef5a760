pub mod git;
pub mod persistence;

// Re-exports
pub use git::*;
pub use persistence::*;
