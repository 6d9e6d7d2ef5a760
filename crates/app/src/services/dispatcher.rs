use super::operations::OperationContext;
use anyhow::anyhow;
use repodeck_core::app::{Command, OperationReport};
use repodeck_core::domain::Event;
use repodeck_core::error::{CoreError, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

struct Job {
    command: Command,
    reply: oneshot::Sender<Result<OperationReport>>,
}

/// Handle to the single operation worker.
///
/// Cloning the handle shares the queue; the worker stops once every handle
/// is dropped and the queue is drained.
#[derive(Clone)]
pub struct Dispatcher {
    jobs: mpsc::UnboundedSender<Job>,
}

impl Dispatcher {
    /// Spawn the worker on the current tokio runtime
    pub fn start(context: OperationContext) -> (Self, JoinHandle<()>) {
        let (jobs, queue) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(Arc::new(context), queue));
        (Self { jobs }, worker)
    }

    /// Queue a command behind everything already submitted
    pub fn submit(&self, command: Command) -> PendingOperation {
        let (reply, completion) = oneshot::channel();
        debug!("Queueing {} of {}", command.kind(), command.record().folder);

        // A dropped job drops its reply sender, which resolves the handle
        if self.jobs.send(Job { command, reply }).is_err() {
            warn!("Operation worker is gone, command dropped");
        }
        PendingOperation { completion }
    }
}

/// Completion of one submitted command
#[derive(Debug)]
pub struct PendingOperation {
    completion: oneshot::Receiver<Result<OperationReport>>,
}

impl PendingOperation {
    pub async fn wait(self) -> Result<OperationReport> {
        self.completion.await.map_err(|_| CoreError::WorkerStopped)?
    }
}

async fn run_worker(context: Arc<OperationContext>, mut queue: mpsc::UnboundedReceiver<Job>) {
    info!("Operation worker started");

    while let Some(Job { command, reply }) = queue.recv().await {
        let kind = command.kind();
        let folder = command.record().folder.clone();
        debug!("Running {} of {}", kind, folder);

        let ctx = context.clone();
        let result = match tokio::task::spawn_blocking(move || ctx.run(command)).await {
            Ok(result) => result,
            Err(e) => {
                error!("{} of {} panicked: {}", kind, folder, e);
                Err(CoreError::port(anyhow!("{} of {} aborted: {}", kind, folder, e)))
            }
        };

        if let Err(e) = &result {
            error!("{} of {} failed: {}", kind, folder, e);
        }

        let _ = context.events.send(Event::Refresh);
        // The submitter may have stopped waiting
        let _ = reply.send(result);
    }

    info!("Operation worker stopped");
}
