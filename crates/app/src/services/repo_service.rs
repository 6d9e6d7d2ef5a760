use super::dispatcher::{Dispatcher, PendingOperation};
use super::operations::Workspace;
use repodeck_core::app::{CloneRequest, Command};
use repodeck_core::domain::{checkout_candidates, Commit, Credentials, RepoRecord, RepoState};
use repodeck_core::error::{CoreError, Result};
use repodeck_core::ports::{GitPort, RecordStore};
use std::sync::Arc;
use tracing::{debug, info};

/// Caller side of the dispatcher.
///
/// Validates requests, performs the state transitions that must happen before
/// an operation is queued and answers read queries against records and
/// working directories.
///
/// A read-only service answers queries but refuses every request and
/// recovery; it is what a process gets when another one owns the records.
pub struct RepoService {
    store: Arc<dyn RecordStore>,
    git: Arc<dyn GitPort>,
    workspace: Workspace,
    dispatcher: Dispatcher,
    read_only: bool,
}

impl RepoService {
    /// Service for the process that owns the records and working copies
    pub fn new(
        store: Arc<dyn RecordStore>,
        git: Arc<dyn GitPort>,
        workspace: Workspace,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            store,
            git,
            workspace,
            dispatcher,
            read_only: false,
        }
    }

    pub fn read_only(
        store: Arc<dyn RecordStore>,
        git: Arc<dyn GitPort>,
        workspace: Workspace,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            read_only: true,
            ..Self::new(store, git, workspace, dispatcher)
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn ensure_owner(&self) -> Result<()> {
        if self.read_only {
            return Err(CoreError::Locked);
        }
        Ok(())
    }

    /// Accept a clone request and queue the clone
    pub fn request_clone(&self, request: &CloneRequest) -> Result<PendingOperation> {
        self.ensure_owner()?;
        let (record, credentials) = request.validate()?;

        if let Some(old_folder) = request.replaces.as_deref() {
            self.drop_replaced(old_folder, &record.folder)?;
        }

        if self.store.exists(&record.folder).map_err(CoreError::store)? {
            return Err(CoreError::DuplicateFolder {
                folder: record.folder,
            });
        }

        let record = self.store.add(&record).map_err(CoreError::store)?;
        info!("Accepted clone of {} as {}", record.address, record.folder);
        Ok(self.dispatcher.submit(Command::Clone {
            record,
            credentials,
        }))
    }

    // Editing a failed clone removes the old record first
    fn drop_replaced(&self, old_folder: &str, new_folder: &str) -> Result<()> {
        let Some(old) = self.store.find(old_folder).map_err(CoreError::store)? else {
            return Ok(());
        };
        if old.state != RepoState::Error {
            return Err(CoreError::InvalidState {
                folder: old.folder,
                state: old.state,
                action: "replace",
            });
        }

        self.store.delete(&old.folder).map_err(CoreError::store)?;
        if old.folder != new_folder {
            // Nobody waits for the cleanup
            drop(self.dispatcher.submit(Command::Delete { record: old }));
        }
        Ok(())
    }

    /// Clone a failed record again with its stored name, address and user
    pub fn retry_clone(&self, folder: &str, password: Option<&str>) -> Result<PendingOperation> {
        self.ensure_owner()?;
        let mut record = self.record(folder)?;
        if record.state != RepoState::Error {
            return Err(invalid_state(record, "retry"));
        }

        let credentials = Credentials::from_parts(record.user_name.as_deref(), password);
        record.state = RepoState::New;
        record.error.clear();
        self.store.update(&record).map_err(CoreError::store)?;

        info!("Retrying clone of {}", record.address);
        Ok(self.dispatcher.submit(Command::Clone {
            record,
            credentials,
        }))
    }

    pub fn request_pull(&self, folder: &str, password: Option<&str>) -> Result<PendingOperation> {
        self.ensure_owner()?;
        let record = self.mark_busy(folder, "pull")?;
        let credentials = Credentials::from_parts(record.user_name.as_deref(), password);
        Ok(self.dispatcher.submit(Command::Pull {
            record,
            credentials,
        }))
    }

    pub fn request_checkout(&self, folder: &str, reference: &str) -> Result<PendingOperation> {
        self.ensure_owner()?;
        if reference.trim().is_empty() {
            return Err(CoreError::invalid_request("reference must not be empty"));
        }
        let record = self.mark_busy(folder, "checkout")?;
        Ok(self.dispatcher.submit(Command::Checkout {
            record,
            reference: reference.trim().to_string(),
        }))
    }

    /// Forget the record and queue removal of its working directory
    pub fn request_delete(&self, folder: &str) -> Result<PendingOperation> {
        self.ensure_owner()?;
        let record = self.record(folder)?;
        if record.state.is_pending() {
            return Err(invalid_state(record, "delete"));
        }

        self.store.delete(&record.folder).map_err(CoreError::store)?;
        info!("Removed record {}", record.folder);
        Ok(self.dispatcher.submit(Command::Delete { record }))
    }

    /// Restore a consistent state after a restart.
    ///
    /// Records left in `New` are cloned again (anonymously); records left in
    /// `Busy` lost their operation and go back to `Local`. Only the owning
    /// process may do this.
    pub fn recover(&self) -> Result<Vec<PendingOperation>> {
        self.ensure_owner()?;
        let mut resumed = Vec::new();
        for mut record in self.store.list_all().map_err(CoreError::store)? {
            match record.state {
                RepoState::New => {
                    debug!("Resuming clone of {}", record.folder);
                    resumed.push(self.dispatcher.submit(Command::Clone {
                        record,
                        credentials: None,
                    }));
                }
                RepoState::Busy => {
                    debug!("Resetting interrupted {}", record.folder);
                    record.mark_local(None);
                    self.store.update(&record).map_err(CoreError::store)?;
                }
                RepoState::Local | RepoState::Error => {}
            }
        }

        if !resumed.is_empty() {
            info!("Resumed {} interrupted clone(s)", resumed.len());
        }
        Ok(resumed)
    }

    /// All records ordered by name
    pub fn records(&self) -> Result<Vec<RepoRecord>> {
        self.store.list_all().map_err(CoreError::store)
    }

    /// Folder of the record whose name or folder is `key`
    pub fn folder_of(&self, key: &str) -> Result<String> {
        self.records()?
            .into_iter()
            .find(|r| r.name == key)
            .or_else(|| self.store.find(key).ok().flatten())
            .map(|r| r.folder)
            .ok_or_else(|| CoreError::RecordNotFound {
                folder: key.to_string(),
            })
    }

    /// Refs that can be passed to `request_checkout`, sorted
    pub fn checkout_candidates(&self, folder: &str) -> Result<Vec<String>> {
        let record = self.local_record(folder, "list refs of")?;
        let names = self
            .git
            .list_refs(&self.workspace.path_for(&record.folder))
            .map_err(CoreError::port)?;
        Ok(checkout_candidates(names))
    }

    /// Display name of the checked out branch or tag
    pub fn current_ref(&self, folder: &str) -> Result<Option<String>> {
        let record = self.record(folder)?;
        if record.state == RepoState::New || record.state == RepoState::Error {
            return Ok(None);
        }
        self.git
            .current_ref(&self.workspace.path_for(&record.folder))
            .map_err(CoreError::port)
    }

    /// Most recent commits reachable from HEAD
    pub fn history(&self, folder: &str, limit: usize) -> Result<Vec<Commit>> {
        let record = self.local_record(folder, "show history of")?;
        self.git
            .log(&self.workspace.path_for(&record.folder), limit)
            .map_err(CoreError::port)
    }

    fn record(&self, folder: &str) -> Result<RepoRecord> {
        self.store
            .find(folder)
            .map_err(CoreError::store)?
            .ok_or_else(|| CoreError::RecordNotFound {
                folder: folder.to_string(),
            })
    }

    fn local_record(&self, folder: &str, action: &'static str) -> Result<RepoRecord> {
        let record = self.record(folder)?;
        match record.state {
            RepoState::Local | RepoState::Busy => Ok(record),
            _ => Err(invalid_state(record, action)),
        }
    }

    fn mark_busy(&self, folder: &str, action: &'static str) -> Result<RepoRecord> {
        let mut record = self.record(folder)?;
        if record.state != RepoState::Local {
            return Err(invalid_state(record, action));
        }
        record.state = RepoState::Busy;
        self.store.update(&record).map_err(CoreError::store)?;
        Ok(record)
    }
}

fn invalid_state(record: RepoRecord, action: &'static str) -> CoreError {
    CoreError::InvalidState {
        folder: record.folder,
        state: record.state,
        action,
    }
}
