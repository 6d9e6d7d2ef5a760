// Composition root: wires adapters, dispatcher and service, then runs one
// CLI command and waits for every operation it queued.

use anyhow::{Context, Result};
use clap::Parser;
use repodeck::adapters::git::set_connect_timeout;
use repodeck::adapters::{FileConfigStore, FileRecordStore, FileTraceStore, Git2Adapter, OwnerLock};
use repodeck::cli::{describe_trace, reload_records, row_label, CliArgs, CliCommand};
use repodeck::services::{Dispatcher, OperationContext, PendingOperation, RepoService, Workspace};
use repodeck_core::app::{CloneRequest, ReadProjection};
use repodeck_core::domain::{Event, RepoState, SequenceCounter};
use repodeck_core::ports::{AppConfig, ConfigStore, GitPort, RecordStore, TraceStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    let config_store = match &args.config {
        Some(path) => FileConfigStore::with_path(path),
        None => FileConfigStore::new()?,
    };
    let mut config = config_store.load()?;
    if let Some(repos_dir) = args.repos_dir.clone() {
        config.repos_dir = repos_dir; // CLI overrides config file
    }

    init_tracing(&config.log_filter);
    info!("Loaded config from {}", config_store.path().display());

    set_connect_timeout(Duration::from_secs(config.git.connect_timeout_secs))?;
    std::fs::create_dir_all(&config.repos_dir).with_context(|| {
        format!("Failed to create repository directory {}", config.repos_dir.display())
    })?;

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let git: Arc<dyn GitPort> = Arc::new(Git2Adapter::new());
    let store: Arc<dyn RecordStore> = Arc::new(FileRecordStore::new(&config.records_file));
    let trace: Arc<dyn TraceStore> = Arc::new(FileTraceStore::new(config.trace_file()));
    let workspace = Workspace::new(&config.repos_dir);

    // Held until every queued operation has finished
    let owner = OwnerLock::try_acquire(&config.records_file)?;

    let (dispatcher, worker) = Dispatcher::start(OperationContext {
        git: git.clone(),
        store: store.clone(),
        trace: trace.clone(),
        workspace: workspace.clone(),
        sequence: SequenceCounter::new(),
        events: event_tx,
    });
    let service = match &owner {
        Some(lock) => {
            info!("Owning records through {}", lock.path().display());
            RepoService::new(store.clone(), git, workspace, dispatcher)
        }
        None => {
            warn!("Another repodeck process is running operations, only queries are available");
            RepoService::read_only(store.clone(), git, workspace, dispatcher)
        }
    };
    let printer = tokio::spawn(print_events(event_rx, store));

    let mut pending = if service.is_read_only() {
        Vec::new()
    } else {
        service.recover()?
    };
    let command = args.command.unwrap_or(CliCommand::List);
    let outcome = run_command(&service, trace.as_ref(), &config, command);
    if let Ok(queued) = &outcome {
        info!("{} operation(s) queued", queued.len() + pending.len());
    }

    // Recovered clones finish even when the command itself was rejected
    match outcome {
        Ok(queued) => {
            pending.extend(queued);
            finish(pending, service, worker, printer).await;
            drop(owner);
            Ok(())
        }
        Err(e) => {
            finish(pending, service, worker, printer).await;
            drop(owner);
            Err(e)
        }
    }
}

fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Execute a command; returns the operations it queued
fn run_command(
    service: &RepoService,
    trace: &dyn TraceStore,
    config: &AppConfig,
    command: CliCommand,
) -> Result<Vec<PendingOperation>> {
    let queued = match command {
        CliCommand::List => {
            print_records(service)?;
            Vec::new()
        }
        CliCommand::Clone {
            name,
            address,
            user,
            password,
            replaces,
        } => {
            let mut request = CloneRequest::new(name, address);
            request.user_name = user;
            request.password = password;
            if let Some(key) = replaces {
                request = request.replacing(service.folder_of(&key)?);
            }
            vec![service.request_clone(&request)?]
        }
        CliCommand::Retry { name, password } => {
            let folder = service.folder_of(&name)?;
            vec![service.retry_clone(&folder, password.as_deref())?]
        }
        CliCommand::Pull { name, password } => {
            let folder = service.folder_of(&name)?;
            vec![service.request_pull(&folder, password.as_deref())?]
        }
        CliCommand::Checkout { name, reference } => {
            let folder = service.folder_of(&name)?;
            vec![service.request_checkout(&folder, &reference)?]
        }
        CliCommand::Refs { name } => {
            let folder = service.folder_of(&name)?;
            let current = service.current_ref(&folder)?;
            for candidate in service.checkout_candidates(&folder)? {
                println!("  {}", candidate);
            }
            if let Some(current) = current {
                println!("* {}", current);
            }
            Vec::new()
        }
        CliCommand::Log { name, limit } => {
            let folder = service.folder_of(&name)?;
            let limit = limit.unwrap_or(config.history.log_limit);
            for commit in service.history(&folder, limit)? {
                println!("{}\n", commit);
            }
            Vec::new()
        }
        CliCommand::Delete { name } => {
            let folder = service.folder_of(&name)?;
            vec![service.request_delete(&folder)?]
        }
        CliCommand::Trace => {
            println!("{}", describe_trace(trace.load()?.as_ref()));
            Vec::new()
        }
    };
    Ok(queued)
}

fn print_records(service: &RepoService) -> Result<()> {
    let records = service.records()?;
    if records.is_empty() {
        println!("No repositories yet. Add one with `repodeck clone <name> <address>`.");
        return Ok(());
    }

    for record in records {
        let detail = match record.state {
            RepoState::Local => service
                .current_ref(&record.folder)
                .ok()
                .flatten()
                .unwrap_or_default(),
            RepoState::Error => record.error.clone(),
            RepoState::New | RepoState::Busy => String::new(),
        };
        println!(
            "{:<24} {:<12} {:<6} {:>10}  {}",
            record.name,
            record.folder,
            record.state,
            format_size(record.size),
            detail
        );
    }
    Ok(())
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// Print progress and notices as the worker emits them, naming rows after
/// the records the projection last loaded
async fn print_events(mut events: mpsc::UnboundedReceiver<Event>, store: Arc<dyn RecordStore>) {
    let mut projection = ReadProjection::new();
    reload_records(&mut projection, store.as_ref());

    while let Some(event) = events.recv().await {
        match &event {
            Event::Progress(progress) => {
                if !projection.apply_progress(progress) {
                    continue;
                }
                let folder = progress.receiver_id.as_str();
                if !projection.records.iter().any(|r| r.folder == folder) {
                    reload_records(&mut projection, store.as_ref());
                }
                if let Some(row) = projection.progress_for(folder) {
                    eprintln!("{}: {} {}%", row_label(&projection, folder), row.task, row.percent);
                }
            }
            _ => projection.apply(&event),
        }

        if projection.needs_reload {
            reload_records(&mut projection, store.as_ref());
        }
        for notice in projection.drain_notices() {
            println!("{}", notice);
        }
    }
}

async fn finish(
    pending: Vec<PendingOperation>,
    service: RepoService,
    worker: tokio::task::JoinHandle<()>,
    printer: tokio::task::JoinHandle<()>,
) {
    for operation in pending {
        match operation.wait().await {
            Ok(report) => match &report.message {
                Some(message) if !report.succeeded() || report.state == RepoState::Error => {
                    println!("{} {}: {}", report.kind, report.folder, message)
                }
                _ => println!("{} {}: {}", report.kind, report.folder, report.state),
            },
            Err(e) => error!("Operation failed: {}", e),
        }
    }

    // Dropping the last dispatcher handle stops the worker, which closes the
    // event channel and ends the printer
    drop(service);
    if let Err(e) = worker.await {
        error!("Operation worker failed: {}", e);
    }
    if let Err(e) = printer.await {
        error!("Event printer failed: {}", e);
    }
}
