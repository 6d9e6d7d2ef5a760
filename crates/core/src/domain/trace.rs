use super::commit::Timestamp;
use crate::error::{GitError, GitFailure};
use serde::{Deserialize, Serialize};

/// The most recent git failure, kept so it can be inspected after the fact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorTrace {
    pub folder: String,
    /// clone, pull or checkout
    pub operation: String,
    pub kind: GitFailure,
    /// What git reported, including its error class and code
    pub detail: String,
    pub recorded_at: Timestamp,
}

impl ErrorTrace {
    pub fn new(folder: impl Into<String>, operation: impl Into<String>, error: &GitError, recorded_at: i64) -> Self {
        Self {
            folder: folder.into(),
            operation: operation.into(),
            kind: error.kind,
            detail: error.detail.clone(),
            recorded_at: Timestamp::new(recorded_at, 0),
        }
    }
}

impl std::fmt::Display for ErrorTrace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{} of {} failed on {}", self.operation, self.folder, self.recorded_at)?;
        writeln!(f, "{}", self.kind.user_message())?;
        write!(f, "{}", self.detail)
    }
}
