//! Dispatcher and service running real git2 operations on local remotes

mod support;

use anyhow::Result;
use repodeck::adapters::{FileRecordStore, FileTraceStore, Git2Adapter, OwnerLock};
use repodeck::services::{Dispatcher, OperationContext, RepoService, Workspace};
use repodeck_core::app::{Command, ReadProjection};
use repodeck_core::domain::{Event, RepoRecord, RepoState, SequenceCounter};
use repodeck_core::error::{messages, CoreError, GitFailure};
use repodeck_core::ports::{GitPort, RecordStore, TraceStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use support::{Remote, BASE_TIME};
use tokio::sync::mpsc;

/// Adapters and dispatcher for one process working on `records`
fn context(records: &Path, workspace: &Workspace) -> (OperationContext, mpsc::UnboundedReceiver<Event>) {
    let (event_tx, events) = mpsc::unbounded_channel();
    let context = OperationContext {
        git: Arc::new(Git2Adapter::new()),
        store: Arc::new(FileRecordStore::new(records)),
        trace: Arc::new(FileTraceStore::new(records.with_file_name("last_error.toml"))),
        workspace: workspace.clone(),
        sequence: SequenceCounter::new(),
        events: event_tx,
    };
    (context, events)
}

/// Start the way the binary does: own the records if nobody else does,
/// otherwise come up read-only
fn open_service(records: &Path, workspace: &Workspace) -> Result<(Option<OwnerLock>, RepoService)> {
    let owner = OwnerLock::try_acquire(records)?;
    let (context, _events) = context(records, workspace);
    let (store, git) = (context.store.clone(), context.git.clone());
    let (dispatcher, _worker) = Dispatcher::start(context);
    let service = match owner {
        Some(_) => RepoService::new(store, git, workspace.clone(), dispatcher),
        None => RepoService::read_only(store, git, workspace.clone(), dispatcher),
    };
    Ok((owner, service))
}

struct Stack {
    remote: Remote,
    records: PathBuf,
    owner: OwnerLock,
    store: Arc<dyn RecordStore>,
    trace: Arc<dyn TraceStore>,
    dispatcher: Dispatcher,
    service: RepoService,
    workspace: Workspace,
    events: mpsc::UnboundedReceiver<Event>,
}

impl Stack {
    fn new() -> Result<Self> {
        let remote = Remote::create()?;
        let records = remote.temp.path().join("records.toml");
        let workspace = Workspace::new(remote.temp.path().join("repos"));
        let owner = OwnerLock::try_acquire(&records)?
            .ok_or_else(|| anyhow::anyhow!("records already owned"))?;

        let (context, events) = context(&records, &workspace);
        let (store, git, trace) = (context.store.clone(), context.git.clone(), context.trace.clone());
        let (dispatcher, _worker) = Dispatcher::start(context);
        let service = RepoService::new(store.clone(), git, workspace.clone(), dispatcher.clone());

        Ok(Self {
            remote,
            records,
            owner,
            store,
            trace,
            dispatcher,
            service,
            workspace,
            events,
        })
    }

    /// Local paths are not accepted by clone requests, so go through the
    /// store and dispatcher directly
    async fn clone_remote(&self, name: &str) -> Result<RepoRecord> {
        let record = self
            .store
            .add(&RepoRecord::new(name, self.remote.url()?, None))?;
        let report = self
            .dispatcher
            .submit(Command::Clone {
                record: record.clone(),
                credentials: None,
            })
            .wait()
            .await?;
        assert_eq!(report.state, RepoState::Local, "{:?}", report.message);
        Ok(self.store.find(&record.folder)?.unwrap_or(record))
    }

    fn drain(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

#[tokio::test]
async fn test_clone_persists_local_state_and_size() -> Result<()> {
    let mut stack = Stack::new()?;
    let record = stack.clone_remote("demo").await?;

    assert_eq!(record.state, RepoState::Local);
    assert!(record.size > 0);
    assert!(stack.workspace.path_for(&record.folder).join(".git").exists());

    let events = stack.drain();
    assert_eq!(events.last(), Some(&Event::Refresh));

    let mut projection = ReadProjection::new();
    for event in &events {
        projection.apply(event);
    }
    assert!(projection.needs_reload);
    projection.replace_records(stack.service.records()?);
    assert_eq!(projection.records.len(), 1);
    assert!(projection.progress_for(&record.folder).is_none());
    Ok(())
}

#[tokio::test]
async fn test_failed_clone_is_recorded() -> Result<()> {
    let stack = Stack::new()?;
    let missing = stack.remote.temp.path().join("plain");
    std::fs::create_dir_all(&missing)?;

    let record = stack.store.add(&RepoRecord::new(
        "plain",
        missing.to_string_lossy().to_string(),
        None,
    ))?;
    let report = stack
        .dispatcher
        .submit(Command::Clone {
            record: record.clone(),
            credentials: None,
        })
        .wait()
        .await?;

    assert_eq!(report.state, RepoState::Error);
    let stored = stack.store.find(&record.folder)?;
    let stored = stored.ok_or_else(|| anyhow::anyhow!("record vanished"))?;
    assert_eq!(stored.state, RepoState::Error);
    assert!(!stored.error.is_empty());

    let trace = stack.trace.load()?.ok_or_else(|| anyhow::anyhow!("no trace"))?;
    assert_eq!(trace.folder, record.folder);
    assert_eq!(trace.operation, "clone");
    assert!(trace.detail.starts_with("git clone failed ("), "{}", trace.detail);
    Ok(())
}

#[tokio::test]
async fn test_checkout_and_pull_through_service() -> Result<()> {
    let mut stack = Stack::new()?;
    let record = stack.clone_remote("demo").await?;
    stack.drain();

    let candidates = stack.service.checkout_candidates(&record.folder)?;
    assert!(candidates.contains(&"refs/tags/v1.0".to_string()));

    let report = stack
        .service
        .request_checkout(&record.folder, "refs/tags/v1.0")?
        .wait()
        .await?;
    assert!(report.succeeded(), "{:?}", report.message);
    assert_eq!(stack.service.current_ref(&record.folder)?, Some("v1.0".to_string()));

    // Detached HEAD cannot be pulled; the failure is only a notice
    let report = stack.service.request_pull(&record.folder, None)?.wait().await?;
    assert_eq!(report.state, RepoState::Local);
    let expected = format!("{} {}", messages::PULL_FAILED, messages::NO_HEAD);
    assert_eq!(report.message.as_deref(), Some(expected.as_str()));

    stack
        .service
        .request_checkout(&record.folder, "refs/remotes/origin/main")?
        .wait()
        .await?;
    assert_eq!(stack.service.current_ref(&record.folder)?, Some("main".to_string()));

    stack.remote.advance("d.txt", "fourth", BASE_TIME + 180)?;
    let report = stack.service.request_pull(&record.folder, None)?.wait().await?;
    assert_eq!(report.message.as_deref(), Some(messages::PULL_DONE));

    let history = stack.service.history(&record.folder, 2)?;
    assert_eq!(history[0].summary(), "fourth");
    assert_eq!(
        stack.store.find(&record.folder)?.map(|r| r.state),
        Some(RepoState::Local)
    );

    let events = stack.drain();
    let notices = events
        .iter()
        .filter(|e| matches!(e, Event::Notice { .. }))
        .count();
    assert_eq!(notices, 4);
    Ok(())
}

#[tokio::test]
async fn test_delete_removes_working_directory() -> Result<()> {
    let stack = Stack::new()?;
    let record = stack.clone_remote("demo").await?;
    let path = stack.workspace.path_for(&record.folder);
    assert!(path.exists());

    stack.service.request_delete(&record.folder)?.wait().await?;
    assert!(!path.exists());
    assert!(stack.service.records()?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_operations_run_in_submission_order() -> Result<()> {
    let stack = Stack::new()?;
    let first = stack
        .store
        .add(&RepoRecord::new("first", stack.remote.url()?, None))?;
    let second = stack
        .store
        .add(&RepoRecord::new("second", stack.remote.url()?, None))?;

    let a = stack.dispatcher.submit(Command::Clone {
        record: first.clone(),
        credentials: None,
    });
    let b = stack.dispatcher.submit(Command::Clone {
        record: second.clone(),
        credentials: None,
    });

    // Waiting on the later one first still sees both done
    let second_report = b.wait().await?;
    assert_eq!(second_report.state, RepoState::Local);
    assert_eq!(
        stack.store.find(&first.folder)?.map(|r| r.state),
        Some(RepoState::Local)
    );
    assert_eq!(a.wait().await?.folder, first.folder);
    Ok(())
}

#[tokio::test]
async fn test_second_process_leaves_owned_records_alone() -> Result<()> {
    let stack = Stack::new()?;
    let record = stack
        .store
        .add(&RepoRecord::new("demo", stack.remote.url()?, None))?;
    let partial = stack.workspace.path_for(&record.folder).join("partial");
    std::fs::create_dir_all(stack.workspace.path_for(&record.folder))?;
    std::fs::write(&partial, "half a clone")?;

    let (owner, second) = open_service(&stack.records, &stack.workspace)?;
    assert!(owner.is_none());
    assert!(second.is_read_only());
    assert!(matches!(second.recover(), Err(CoreError::Locked)));
    assert!(matches!(second.request_delete(&record.folder), Err(CoreError::Locked)));

    assert!(partial.exists());
    assert_eq!(
        stack.store.find(&record.folder)?.map(|r| r.state),
        Some(RepoState::New)
    );
    assert_eq!(second.records()?.len(), 1);

    // Once the owner exits, the next process takes over and resumes the clone
    drop(stack.owner);
    let (owner, third) = open_service(&stack.records, &stack.workspace)?;
    assert!(owner.is_some());
    let pending = third.recover()?;
    assert_eq!(pending.len(), 1);
    for operation in pending {
        assert_eq!(operation.wait().await?.state, RepoState::Local);
    }
    assert!(!partial.exists());
    Ok(())
}

#[tokio::test]
async fn test_pull_failure_is_traced_next_to_records() -> Result<()> {
    let stack = Stack::new()?;
    let record = stack.clone_remote("demo").await?;
    stack
        .service
        .request_checkout(&record.folder, "refs/tags/v1.0")?
        .wait()
        .await?;
    stack.service.request_pull(&record.folder, None)?.wait().await?;

    let reopened = FileTraceStore::new(stack.records.with_file_name("last_error.toml"));
    let trace = reopened.load()?.ok_or_else(|| anyhow::anyhow!("no trace"))?;
    assert_eq!(trace.operation, "pull");
    assert_eq!(trace.kind, GitFailure::NoHead);
    assert_eq!(trace.folder, record.folder);
    Ok(())
}
