/// Background jobs
///
/// Long-running operations (export, backup, OCR, batch import) run on the
/// tokio blocking pool. A job never touches foreground state: when it ends
/// it pushes exactly one [`JobEvent`] onto the queue's channel, and the
/// foreground picks it up with [`JobQueue::next_event`].
use std::fmt;

use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::export::ExportReport;
use crate::ops::backup::Snapshot;
use crate::ops::import::ImportReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Export,
    Backup,
    TextExtraction,
    Import,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Export => "export",
            JobKind::Backup => "backup",
            JobKind::TextExtraction => "text extraction",
            JobKind::Import => "import",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a successful job produced
#[derive(Debug)]
pub enum JobOutput {
    Exported(ExportReport),
    BackedUp(Snapshot),
    /// Extracted text and the sidecar it was written to
    TextExtracted { text: String, sidecar: std::path::PathBuf },
    Imported { subject: String, report: ImportReport },
}

/// Completion or failure of one job
#[derive(Debug)]
pub struct JobEvent {
    pub id: u64,
    pub kind: JobKind,
    pub outcome: Result<JobOutput>,
}

/// Returned when a job is scheduled.
///
/// Dropping the handle only discards interest in the job; the job itself
/// keeps running and still reports through the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobHandle {
    pub id: u64,
    pub kind: JobKind,
}

impl JobHandle {
    /// Jobs cannot be stopped once started
    pub fn cancel(&self) -> Result<()> {
        Err(Error::Unsupported(format!(
            "{} job {} cannot be cancelled once started",
            self.kind, self.id
        )))
    }
}

pub struct JobQueue {
    runtime: Handle,
    sender: mpsc::UnboundedSender<JobEvent>,
    receiver: mpsc::UnboundedReceiver<JobEvent>,
    next_id: u64,
}

impl JobQueue {
    pub fn new(runtime: Handle) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            runtime,
            sender,
            receiver,
            next_id: 1,
        }
    }

    /// Run `work` in the background and report its result as a [`JobEvent`]
    pub fn spawn<F>(&mut self, kind: JobKind, work: F) -> JobHandle
    where
        F: FnOnce() -> Result<JobOutput> + Send + 'static,
    {
        let id = self.next_id;
        self.next_id += 1;

        let sender = self.sender.clone();
        let blocking = self.runtime.spawn_blocking(work);
        self.runtime.spawn(async move {
            let outcome = match blocking.await {
                Ok(outcome) => outcome,
                Err(join_error) => Err(Error::Background {
                    operation: kind.as_str(),
                    message: join_error.to_string(),
                }),
            };

            if let Err(e) = &outcome {
                tracing::warn!(job = id, kind = %kind, error = %e, "❌ Job failed");
            } else {
                tracing::info!(job = id, kind = %kind, "✅ Job finished");
            }

            // The receiver lives as long as the queue; a closed channel means
            // the foreground is gone and nobody is left to tell.
            let _ = sender.send(JobEvent { id, kind, outcome });
        });

        tracing::debug!(job = id, kind = %kind, "job scheduled");
        JobHandle { id, kind }
    }

    /// Wait for the next finished job
    pub async fn next_event(&mut self) -> Option<JobEvent> {
        self.receiver.recv().await
    }

    /// Take a finished job's event if one is waiting
    pub fn try_next_event(&mut self) -> Option<JobEvent> {
        self.receiver.try_recv().ok()
    }
}

impl fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobQueue")
            .field("next_id", &self.next_id)
            .finish()
    }
}
