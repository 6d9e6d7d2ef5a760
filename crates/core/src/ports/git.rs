use crate::domain::{Commit, Credentials, ProgressSink};
use crate::error::GitError;
use anyhow::Result;
use std::path::Path;

/// Port for the git capability.
///
/// Every call is blocking; callers run them on a background worker.
pub trait GitPort: Send + Sync {
    /// Clone `url` into `path`, which must not exist or be empty
    fn clone_repo(
        &self,
        url: &str,
        path: &Path,
        credentials: Option<&Credentials>,
        progress: &mut dyn ProgressSink,
    ) -> std::result::Result<(), GitError>;

    /// Fast-forward the checked out branch from its remote. Local edits are
    /// kept; when the update would overwrite one, nothing changes and the
    /// pull fails.
    fn pull(
        &self,
        path: &Path,
        credentials: Option<&Credentials>,
        progress: &mut dyn ProgressSink,
    ) -> std::result::Result<(), GitError>;

    /// Switch the working tree to a branch, tag or commit. Short names are
    /// tried as a local branch, then as a remote branch. Branches keep HEAD
    /// attached, anything else detaches it.
    fn checkout(&self, path: &Path, reference: &str) -> std::result::Result<(), GitError>;

    /// Display name of the checked out branch or tag, `None` without a HEAD
    fn current_ref(&self, path: &Path) -> Result<Option<String>>;

    /// Fully qualified names of every reference in the repository
    fn list_refs(&self, path: &Path) -> Result<Vec<String>>;

    /// Up to `limit` commits reachable from HEAD, newest first
    fn log(&self, path: &Path, limit: usize) -> Result<Vec<Commit>>;

    /// Total size in bytes of the files under `path`
    fn repo_size(&self, path: &Path) -> Result<u64>;

    /// Remove the local copy; a missing directory is not an error
    fn delete_local(&self, path: &Path) -> Result<()>;
}
