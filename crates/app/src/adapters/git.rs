use anyhow::{Context, Result};
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{
    BranchType, Cred, CredentialType, ErrorClass, ErrorCode, FetchOptions, Oid, RemoteCallbacks,
    Repository as GitRepository,
};
use repodeck_core::domain::{
    resolve_current_ref, Author, Commit, Credentials, ProgressSink, TagRef, Timestamp,
};
use repodeck_core::error::{GitError, GitFailure};
use repodeck_core::ports::GitPort;
use std::cell::RefCell;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const DEFAULT_REMOTE: &str = "origin";

/// Git adapter that implements GitPort using git2
#[derive(Debug, Default, Clone, Copy)]
pub struct Git2Adapter;

impl Git2Adapter {
    pub fn new() -> Self {
        Self
    }

    /// Open git repository at the given path
    fn open_repo(&self, path: &Path) -> Result<GitRepository> {
        GitRepository::open(path)
            .with_context(|| format!("Failed to open git repository at {}", path.display()))
    }
}

/// Apply the server connect timeout to every libgit2 transport in the process
pub fn set_connect_timeout(timeout: Duration) -> Result<()> {
    let millis = std::ffi::c_int::try_from(timeout.as_millis()).unwrap_or(std::ffi::c_int::MAX);
    // SAFETY: libgit2 global options are set once at startup, before any
    // transport is created on another thread.
    unsafe { git2::opts::set_server_connect_timeout_in_milliseconds(millis) }
        .context("Failed to set git connect timeout")
}

/// Map a libgit2 error to the failure categories shown to the user
pub fn classify(err: &git2::Error) -> GitFailure {
    let message = err.message().to_lowercase();
    let auth_hint = ["401", "403", "authentication", "not authorized", "unauthorized"]
        .iter()
        .any(|hint| message.contains(hint));

    if err.code() == ErrorCode::Auth || auth_hint {
        return GitFailure::AuthFailure;
    }

    match err.class() {
        ErrorClass::Http => {
            if message.contains("404") || message.contains("content-type") || message.contains("not found") {
                GitFailure::NotARepository
            } else {
                GitFailure::ConnectionFailure
            }
        }
        ErrorClass::Net | ErrorClass::Ssl | ErrorClass::Ssh => GitFailure::ConnectionFailure,
        ErrorClass::Repository | ErrorClass::Odb if err.code() == ErrorCode::NotFound => {
            GitFailure::NotARepository
        }
        _ if message.contains("unsupported url protocol") => GitFailure::ConnectionFailure,
        _ => GitFailure::GenericFailure,
    }
}

// Log the raw libgit2 error and classify it, keeping the raw text.
fn failure(operation: &str, err: git2::Error) -> GitError {
    let kind = classify(&err);
    let detail = format!(
        "git {} failed ({:?}/{:?}): {}",
        operation,
        err.class(),
        err.code(),
        err.message()
    );
    warn!("{} -> {:?}", detail, kind);
    GitError::new(kind, detail)
}

// Failures that never reached libgit2.
fn local_failure(kind: GitFailure, detail: String) -> GitError {
    warn!("{} -> {:?}", detail, kind);
    GitError::new(kind, detail)
}

// Expand a short branch name to its full reference, local branches first.
fn qualified_name(git_repo: &GitRepository, reference: &str) -> String {
    if reference.starts_with("refs/") {
        return reference.to_string();
    }
    if git_repo.find_branch(reference, BranchType::Local).is_ok() {
        return format!("refs/heads/{}", reference);
    }
    if git_repo.find_branch(reference, BranchType::Remote).is_ok() {
        return format!("refs/remotes/{}", reference);
    }
    reference.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Receiving,
    Resolving,
    CheckingOut,
}

impl Phase {
    fn label(self) -> &'static str {
        match self {
            Phase::Receiving => "Receiving objects",
            Phase::Resolving => "Resolving deltas",
            Phase::CheckingOut => "Checking out files",
        }
    }
}

/// Turns libgit2's absolute counters into begin/update calls on a sink
struct ProgressBridge<'a> {
    sink: &'a mut dyn ProgressSink,
    phase: Option<(Phase, u64)>,
    done: u64,
}

impl<'a> ProgressBridge<'a> {
    fn new(sink: &'a mut dyn ProgressSink) -> Self {
        Self {
            sink,
            phase: None,
            done: 0,
        }
    }

    fn report(&mut self, phase: Phase, done: u64, total: u64) {
        if self.phase != Some((phase, total)) {
            if self.phase.is_some() {
                self.sink.end_task();
            }
            self.sink.begin_task(phase.label(), total);
            self.phase = Some((phase, total));
            self.done = 0;
        }
        if done > self.done {
            self.sink.update(done - self.done);
            self.done = done;
        }
    }

    fn transfer(&mut self, stats: &git2::Progress<'_>) {
        let total_deltas = stats.total_deltas();
        if stats.received_objects() < stats.total_objects() || total_deltas == 0 {
            self.report(
                Phase::Receiving,
                stats.received_objects() as u64,
                stats.total_objects() as u64,
            );
        } else {
            self.report(Phase::Resolving, stats.indexed_deltas() as u64, total_deltas as u64);
        }
    }

    fn checkout(&mut self, done: usize, total: usize) {
        self.report(Phase::CheckingOut, done as u64, total as u64);
    }

    fn finish(&mut self) {
        if self.phase.take().is_some() {
            self.sink.end_task();
        }
    }
}

/// Remote callbacks with progress forwarding and, optionally, credentials.
///
/// Credentials are offered once; libgit2 asks again after a rejection and a
/// second request is reported as an authentication failure.
fn remote_callbacks<'a>(
    bridge: &'a RefCell<ProgressBridge<'_>>,
    credentials: Option<&'a Credentials>,
) -> RemoteCallbacks<'a> {
    let mut callbacks = RemoteCallbacks::new();
    callbacks.transfer_progress(move |stats| {
        bridge.borrow_mut().transfer(&stats);
        true
    });

    if let Some(credentials) = credentials {
        let mut offered = false;
        callbacks.credentials(move |_url, _username_from_url, allowed| {
            if offered || !allowed.contains(CredentialType::USER_PASS_PLAINTEXT) {
                return Err(git2::Error::new(
                    ErrorCode::Auth,
                    ErrorClass::Http,
                    "credentials rejected",
                ));
            }
            offered = true;
            Cred::userpass_plaintext(&credentials.user_name, &credentials.password)
        });
    }

    callbacks
}

impl GitPort for Git2Adapter {
    fn clone_repo(
        &self,
        url: &str,
        path: &Path,
        credentials: Option<&Credentials>,
        progress: &mut dyn ProgressSink,
    ) -> std::result::Result<(), GitError> {
        info!("Cloning {} into {}", url, path.display());
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                local_failure(
                    GitFailure::GenericFailure,
                    format!("cannot create {}: {}", parent.display(), e),
                )
            })?;
        }
        let bridge = RefCell::new(ProgressBridge::new(progress));

        let result = {
            let mut fetch_options = FetchOptions::new();
            fetch_options.remote_callbacks(remote_callbacks(&bridge, credentials));

            let mut checkout = CheckoutBuilder::new();
            checkout.progress(|_path, done, total| bridge.borrow_mut().checkout(done, total));

            RepoBuilder::new()
                .fetch_options(fetch_options)
                .with_checkout(checkout)
                .clone(url, path)
        };
        bridge.borrow_mut().finish();

        result.map(|_| ()).map_err(|e| failure("clone", e))
    }

    fn pull(
        &self,
        path: &Path,
        credentials: Option<&Credentials>,
        progress: &mut dyn ProgressSink,
    ) -> std::result::Result<(), GitError> {
        let git_repo = GitRepository::open(path).map_err(|e| failure("open", e))?;

        if git_repo.head_detached().unwrap_or(false) {
            debug!("Pull refused, HEAD is detached in {}", path.display());
            return Err(GitError::new(
                GitFailure::NoHead,
                format!("HEAD is detached in {}", path.display()),
            ));
        }
        let head = git_repo.head().map_err(|e| {
            local_failure(
                GitFailure::NoHead,
                format!("pull without HEAD in {}: {}", path.display(), e),
            )
        })?;
        let (Some(local_ref), Some(branch)) = (head.name(), head.shorthand()) else {
            return Err(GitFailure::NoHead.into());
        };
        let (local_ref, branch) = (local_ref.to_string(), branch.to_string());
        drop(head);

        let mut remote = git_repo.find_remote(DEFAULT_REMOTE).map_err(|e| {
            local_failure(
                GitFailure::NotARepository,
                format!("no {} remote in {}: {}", DEFAULT_REMOTE, path.display(), e),
            )
        })?;

        let bridge = RefCell::new(ProgressBridge::new(progress));
        let fetched = {
            let mut fetch_options = FetchOptions::new();
            fetch_options.remote_callbacks(remote_callbacks(&bridge, credentials));
            remote.fetch(&[] as &[&str], Some(&mut fetch_options), None)
        };
        if let Err(e) = fetched {
            bridge.borrow_mut().finish();
            return Err(failure("fetch", e));
        }

        // Upstream from config, or the same name on the default remote
        let upstream = git_repo
            .branch_upstream_name(&local_ref)
            .ok()
            .and_then(|buf| buf.as_str().map(str::to_string))
            .unwrap_or_else(|| format!("refs/remotes/{}/{}", DEFAULT_REMOTE, branch));

        let merged = (|| -> std::result::Result<(), git2::Error> {
            let upstream_ref = git_repo.find_reference(&upstream)?;
            let incoming = git_repo.reference_to_annotated_commit(&upstream_ref)?;
            let (analysis, _) = git_repo.merge_analysis(&[&incoming])?;

            if analysis.is_up_to_date() {
                debug!("{} already up to date", local_ref);
                return Ok(());
            }
            if !analysis.is_fast_forward() {
                return Err(git2::Error::new(
                    ErrorCode::NotFastForward,
                    ErrorClass::Merge,
                    "local branch has diverged from its upstream",
                ));
            }

            // Update the working tree first; local edits in the way abort
            // the pull before the branch moves
            let target = git_repo.find_commit(incoming.id())?;
            let mut checkout = CheckoutBuilder::new();
            checkout
                .safe()
                .progress(|_path, done, total| bridge.borrow_mut().checkout(done, total));
            git_repo.checkout_tree(target.as_object(), Some(&mut checkout))?;

            let mut reference = git_repo.find_reference(&local_ref)?;
            reference.set_target(incoming.id(), "repodeck: pull fast-forward")?;
            git_repo.set_head(&local_ref)
        })();
        bridge.borrow_mut().finish();

        merged.map_err(|e| failure("pull", e))
    }

    fn checkout(&self, path: &Path, reference: &str) -> std::result::Result<(), GitError> {
        // Every checkout problem is reported as a plain failure
        let generic = |operation: &str, e: git2::Error| {
            GitError::new(GitFailure::GenericFailure, failure(operation, e).detail)
        };
        let git_repo = GitRepository::open(path).map_err(|e| generic("open", e))?;
        let reference = qualified_name(&git_repo, reference);
        let reference = reference.as_str();

        let switched = (|| -> std::result::Result<(), git2::Error> {
            let commit = git_repo.revparse_single(reference)?.peel_to_commit()?;

            let mut checkout = CheckoutBuilder::new();
            checkout.safe();
            git_repo.checkout_tree(commit.as_object(), Some(&mut checkout))?;

            if let Some(rest) = reference.strip_prefix("refs/remotes/") {
                // Track the remote branch with a local branch of the same name
                let (remote, name) = rest.split_once('/').unwrap_or((DEFAULT_REMOTE, rest));
                let local_ref = format!("refs/heads/{}", name);
                git_repo.reference(&local_ref, commit.id(), true, "repodeck: checkout")?;
                let mut branch = git_repo.find_branch(name, BranchType::Local)?;
                branch.set_upstream(Some(&format!("{}/{}", remote, name)))?;
                git_repo.set_head(&local_ref)
            } else if reference.starts_with("refs/heads/") {
                git_repo.set_head(reference)
            } else {
                git_repo.set_head_detached(commit.id())
            }
        })();

        switched.map_err(|e| generic("checkout", e))
    }

    fn current_ref(&self, path: &Path) -> Result<Option<String>> {
        let git_repo = self.open_repo(path)?;

        let head = match git_repo.head() {
            Ok(head) => head,
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => {
                return Ok(None);
            }
            Err(e) => return Err(e).context("Failed to read HEAD"),
        };

        let head_name = if git_repo.head_detached().unwrap_or(false) {
            match head.target() {
                Some(oid) => oid.to_string(),
                None => return Ok(None),
            }
        } else {
            match head.name() {
                Some(name) => name.to_string(),
                None => return Ok(None),
            }
        };

        let mut tags = Vec::new();
        for reference in git_repo
            .references_glob("refs/tags/*")
            .context("Failed to list tags")?
        {
            let reference = reference.context("Failed to read tag reference")?;
            let (Some(name), Some(target)) = (reference.name(), reference.target()) else {
                continue;
            };
            let peeled = reference
                .peel_to_commit()
                .ok()
                .map(|commit| commit.id())
                .filter(|id| *id != target)
                .map(|id| id.to_string());
            tags.push(TagRef {
                name: name.to_string(),
                target: target.to_string(),
                peeled,
            });
        }

        Ok(Some(resolve_current_ref(&head_name, &tags)))
    }

    fn list_refs(&self, path: &Path) -> Result<Vec<String>> {
        let git_repo = self.open_repo(path)?;

        let mut names = Vec::new();
        for reference in git_repo.references().context("Failed to list references")? {
            let reference = reference.context("Failed to read reference")?;
            if let Some(name) = reference.name() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    fn log(&self, path: &Path, limit: usize) -> Result<Vec<Commit>> {
        let git_repo = self.open_repo(path)?;

        let mut revwalk = git_repo.revwalk()?;
        revwalk.set_sorting(git2::Sort::TIME)?;
        match revwalk.push_head() {
            Ok(()) => {}
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => {
                return Ok(Vec::new());
            }
            Err(e) => return Err(e).context("Failed to start history walk"),
        }

        let mut commits = Vec::new();
        for oid in revwalk.take(limit) {
            let oid: Oid = oid?;
            let commit = git_repo.find_commit(oid)?;
            let author = commit.author();

            commits.push(Commit {
                id: oid.to_string(),
                message: commit.message().unwrap_or("").to_string(),
                author: Author {
                    name: author.name().unwrap_or("").to_string(),
                    email: author.email().unwrap_or("").to_string(),
                },
                timestamp: Timestamp::new(commit.time().seconds(), commit.time().offset_minutes()),
            });
        }

        Ok(commits)
    }

    fn repo_size(&self, path: &Path) -> Result<u64> {
        let mut total = 0u64;
        for entry in WalkDir::new(path) {
            let entry = entry.context("Failed to read directory entry")?;
            if entry.file_type().is_file() {
                let metadata = entry
                    .metadata()
                    .with_context(|| format!("Failed to stat {}", entry.path().display()))?;
                total += metadata.len();
            }
        }
        Ok(total)
    }

    fn delete_local(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Ok(());
        }
        std::fs::remove_dir_all(path)
            .with_context(|| format!("Failed to delete {}", path.display()))
    }
}
