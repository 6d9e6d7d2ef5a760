pub mod dispatcher;
pub mod operations;
pub mod repo_service;

pub use dispatcher::{Dispatcher, PendingOperation};
pub use operations::{OperationContext, Workspace};
pub use repo_service::RepoService;
