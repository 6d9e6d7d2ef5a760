pub mod commands;
pub mod queries;
pub mod requests;

pub use commands::*;
pub use queries::*;
pub use requests::*;
