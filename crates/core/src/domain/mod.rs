pub mod record;
pub mod commit;
pub mod events;
pub mod progress;
pub mod refs;
pub mod trace;

// Re-exports for convenience
pub use record::*;
pub use commit::*;
pub use events::*;
pub use progress::*;
pub use refs::*;
pub use trace::*;
