use crate::domain::RepoState;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// User facing messages for each failure category
pub mod messages {
    pub const CONNECT: &str = "Could not connect to the server.";
    pub const AUTH: &str = "Authentication failed.";
    pub const NOT_GIT: &str = "Not a git repository.";
    pub const NOT_GIT_GUESS: &str = "Not a git repository. Did you forget .git at the end of the address?";
    pub const NO_HEAD: &str = "No branch is checked out. Switch to a branch first.";
    pub const GENERIC: &str = "Git operation failed.";

    pub const PULL_DONE: &str = "Pull done.";
    pub const PULL_FAILED: &str = "Pull failed.";
    pub const CHECKOUT_DONE: &str = "Checkout done.";
    pub const CHECKOUT_FAILED: &str = "Checkout failed.";
}

/// Classified failure of a clone, pull or checkout
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GitFailure {
    /// Transport problem, including an unsupported protocol
    #[error("could not connect to the remote")]
    ConnectionFailure,

    /// Credentials missing or rejected
    #[error("authentication failed")]
    AuthFailure,

    /// The address does not point at a git repository
    #[error("not a git repository")]
    NotARepository,

    /// Pull attempted without a checked out branch
    #[error("no branch is checked out")]
    NoHead,

    #[error("git operation failed")]
    GenericFailure,
}

impl GitFailure {
    /// Message shown to the user for this failure
    pub fn user_message(self) -> &'static str {
        match self {
            GitFailure::ConnectionFailure => messages::CONNECT,
            GitFailure::AuthFailure => messages::AUTH,
            GitFailure::NotARepository => messages::NOT_GIT,
            GitFailure::NoHead => messages::NO_HEAD,
            GitFailure::GenericFailure => messages::GENERIC,
        }
    }

    /// Message recorded on a failed clone of `address`.
    ///
    /// An address without the conventional `.git` suffix that turns out not to
    /// be a repository most likely is a web page URL, so say so.
    pub fn clone_message(self, address: &str) -> &'static str {
        match self {
            GitFailure::NotARepository if !address.trim().to_lowercase().ends_with(".git") => {
                messages::NOT_GIT_GUESS
            }
            other => other.user_message(),
        }
    }
}

/// A classified git failure together with what git itself reported
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {detail}")]
pub struct GitError {
    pub kind: GitFailure,
    /// Raw error text, kept for the error trace
    pub detail: String,
}

impl GitError {
    pub fn new(kind: GitFailure, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

impl From<GitFailure> for GitError {
    fn from(kind: GitFailure) -> Self {
        Self::new(kind, kind.to_string())
    }
}

/// Core domain errors
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Repository not found: {folder}")]
    RecordNotFound { folder: String },

    #[error("A repository with the same folder already exists: {folder}")]
    DuplicateFolder { folder: String },

    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("Repository {folder} is {state}, cannot {action}")]
    InvalidState {
        folder: String,
        state: RepoState,
        action: &'static str,
    },

    #[error("Record store error: {source}")]
    Store { source: anyhow::Error },

    #[error("Port error: {source}")]
    Port { source: anyhow::Error },

    #[error("Operation worker stopped")]
    WorkerStopped,

    #[error("Another repodeck process owns these repositories, try again when it finishes")]
    Locked,
}

impl CoreError {
    pub fn store(source: anyhow::Error) -> Self {
        Self::Store { source }
    }

    pub fn port(source: anyhow::Error) -> Self {
        Self::Port { source }
    }

    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
