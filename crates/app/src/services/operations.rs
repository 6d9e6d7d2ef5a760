//! Synchronous execution of a single dispatcher command.
//!
//! Everything here blocks on git and on the record store; the dispatcher runs
//! it on the blocking pool, one command at a time.

use repodeck_core::app::{Command, OperationKind, OperationReport};
use repodeck_core::domain::{
    Credentials, ErrorTrace, Event, ProgressEvent, ProgressReporter, RepoRecord, RepoState,
    SequenceCounter,
};
use repodeck_core::error::{messages, CoreError, GitError, GitFailure, Result};
use repodeck_core::ports::{GitPort, RecordStore, TraceStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Directory that holds one working directory per record folder
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, folder: &str) -> PathBuf {
        self.root.join(folder)
    }
}

/// Everything a running operation needs
pub struct OperationContext {
    pub git: Arc<dyn GitPort>,
    pub store: Arc<dyn RecordStore>,
    /// Where the last git failure is kept
    pub trace: Arc<dyn TraceStore>,
    pub workspace: Workspace,
    pub sequence: SequenceCounter,
    pub events: mpsc::UnboundedSender<Event>,
}

impl OperationContext {
    /// Execute one command to completion
    pub fn run(&self, command: Command) -> Result<OperationReport> {
        match command {
            Command::Clone { record, credentials } => self.run_clone(record, credentials),
            Command::Pull { record, credentials } => self.run_pull(record, credentials),
            Command::Checkout { record, reference } => self.run_checkout(record, &reference),
            Command::Delete { record } => Ok(self.run_delete(record)),
        }
    }

    fn run_clone(
        &self,
        mut record: RepoRecord,
        credentials: Option<Credentials>,
    ) -> Result<OperationReport> {
        let path = self.workspace.path_for(&record.folder);
        if let Err(e) = self.git.delete_local(&path) {
            warn!("Could not clear {} before cloning: {:#}", path.display(), e);
        }

        let mut reporter = self.reporter(&record.folder);
        let outcome = self
            .git
            .clone_repo(&record.address, &path, credentials.as_ref(), &mut reporter);

        let failure = match outcome {
            Ok(()) => {
                record.mark_local(self.size_of(&path));
                info!("Cloned {} into {}", record.address, path.display());
                None
            }
            Err(error) => {
                record.mark_failed(error.kind.clone_message(&record.address));
                warn!("Clone of {} failed: {}", record.address, error.kind);
                self.keep_trace(&record.folder, OperationKind::Clone, &error);
                Some(error.kind)
            }
        };

        self.store.update(&record).map_err(CoreError::store)?;
        Ok(report(&record, OperationKind::Clone, failure, None))
    }

    fn run_pull(
        &self,
        mut record: RepoRecord,
        credentials: Option<Credentials>,
    ) -> Result<OperationReport> {
        let path = self.workspace.path_for(&record.folder);
        let mut reporter = self.reporter(&record.folder);
        let outcome = self.git.pull(&path, credentials.as_ref(), &mut reporter);

        let (failure, message) = match outcome {
            Ok(()) => {
                info!("Pulled {}", record.name);
                (None, messages::PULL_DONE.to_string())
            }
            Err(error) => {
                warn!("Pull of {} failed: {}", record.name, error.kind);
                self.keep_trace(&record.folder, OperationKind::Pull, &error);
                (Some(error.kind), failed(messages::PULL_FAILED, error.kind))
            }
        };
        self.notify(&record.folder, &message);

        // Pull failures are never persisted
        record.mark_local(None);
        self.store.update(&record).map_err(CoreError::store)?;
        Ok(report(&record, OperationKind::Pull, failure, Some(message)))
    }

    fn run_checkout(&self, mut record: RepoRecord, reference: &str) -> Result<OperationReport> {
        let path = self.workspace.path_for(&record.folder);
        let outcome = self.git.checkout(&path, reference);

        let (failure, message) = match outcome {
            Ok(()) => {
                record.mark_local(self.size_of(&path));
                info!("Checked out {} in {}", reference, record.name);
                (None, messages::CHECKOUT_DONE.to_string())
            }
            Err(error) => {
                record.mark_local(None);
                warn!("Checkout of {} in {} failed: {}", reference, record.name, error.kind);
                self.keep_trace(&record.folder, OperationKind::Checkout, &error);
                (Some(error.kind), failed(messages::CHECKOUT_FAILED, error.kind))
            }
        };
        self.notify(&record.folder, &message);

        self.store.update(&record).map_err(CoreError::store)?;
        Ok(report(&record, OperationKind::Checkout, failure, Some(message)))
    }

    fn run_delete(&self, record: RepoRecord) -> OperationReport {
        let path = self.workspace.path_for(&record.folder);
        match self.git.delete_local(&path) {
            Ok(()) => info!("Deleted {}", path.display()),
            Err(e) => warn!("Failed to delete {}: {:#}", path.display(), e),
        }
        report(&record, OperationKind::Delete, None, None)
    }

    fn reporter(&self, folder: &str) -> ProgressReporter<impl FnMut(ProgressEvent)> {
        let events = self.events.clone();
        ProgressReporter::new(folder, self.sequence.clone(), move |event| {
            // Nobody listening is fine
            let _ = events.send(Event::Progress(event));
        })
    }

    fn notify(&self, folder: &str, message: &str) {
        let _ = self.events.send(Event::Notice {
            folder: folder.to_string(),
            message: message.to_string(),
        });
    }

    // A trace that cannot be written must not fail the operation.
    fn keep_trace(&self, folder: &str, kind: OperationKind, error: &GitError) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        let trace = ErrorTrace::new(folder, kind.to_string(), error, now);
        if let Err(e) = self.trace.save(&trace) {
            warn!("Could not keep the error trace for {}: {:#}", folder, e);
        }
    }

    fn size_of(&self, path: &Path) -> Option<u64> {
        match self.git.repo_size(path) {
            Ok(size) => {
                debug!("{} uses {} bytes", path.display(), size);
                Some(size)
            }
            Err(e) => {
                warn!("Could not measure {}: {:#}", path.display(), e);
                None
            }
        }
    }
}

fn failed(prefix: &str, kind: GitFailure) -> String {
    format!("{} {}", prefix, kind.user_message())
}

fn report(
    record: &RepoRecord,
    kind: OperationKind,
    failure: Option<GitFailure>,
    message: Option<String>,
) -> OperationReport {
    let message = message.or_else(|| (record.state == RepoState::Error).then(|| record.error.clone()));
    OperationReport {
        folder: record.folder.clone(),
        kind,
        state: record.state,
        failure,
        message,
    }
}
