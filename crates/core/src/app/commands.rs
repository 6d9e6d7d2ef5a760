use crate::domain::{Credentials, RepoRecord, RepoState};
use crate::error::GitFailure;

/// Operations executed by the dispatcher, one at a time
#[derive(Debug, Clone)]
pub enum Command {
    /// Clone a record that is in `New`
    Clone {
        record: RepoRecord,
        credentials: Option<Credentials>,
    },

    /// Pull a record the caller already moved to `Busy`
    Pull {
        record: RepoRecord,
        credentials: Option<Credentials>,
    },

    /// Check out `reference` on a record the caller already moved to `Busy`
    Checkout { record: RepoRecord, reference: String },

    /// Remove the local copy; the caller removes the record itself
    Delete { record: RepoRecord },
}

impl Command {
    pub fn kind(&self) -> OperationKind {
        match self {
            Command::Clone { .. } => OperationKind::Clone,
            Command::Pull { .. } => OperationKind::Pull,
            Command::Checkout { .. } => OperationKind::Checkout,
            Command::Delete { .. } => OperationKind::Delete,
        }
    }

    pub fn record(&self) -> &RepoRecord {
        match self {
            Command::Clone { record, .. }
            | Command::Pull { record, .. }
            | Command::Checkout { record, .. }
            | Command::Delete { record } => record,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Clone,
    Pull,
    Checkout,
    Delete,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            OperationKind::Clone => "clone",
            OperationKind::Pull => "pull",
            OperationKind::Checkout => "checkout",
            OperationKind::Delete => "delete",
        };
        f.write_str(label)
    }
}

/// What a finished operation did to its record
#[derive(Debug, Clone, PartialEq)]
pub struct OperationReport {
    pub folder: String,
    pub kind: OperationKind,
    /// Record state after the operation
    pub state: RepoState,
    /// Set when the git call failed
    pub failure: Option<GitFailure>,
    /// Message shown to the user, if any
    pub message: Option<String>,
}

impl OperationReport {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}
