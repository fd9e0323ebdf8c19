//! Document job queue.
//!
//! Architecture:
//!
//! ```text
//! control surface (CLI, headless)            scheduler task (one per queue)
//! ───────────────────────────────            ──────────────────────────────
//! enqueue / start / stop / clear              wait for state != Idle
//!         │                                           │
//!         ▼                                           ▼
//!   RwLock<Vec<Job>>  ◄────── shared ──────►  pick first Pending (FIFO)
//!   watch<QueueState>                                 │  job_delay
//!                                                     ▼
//!                                             DocumentProcessor::process
//!                                                     │
//!                                                     ▼
//!                                             Completed / Error, events
//! ```
//!
//! At most one job is Processing at a time. `stop()` never interrupts the
//! in-flight job; the scheduler goes Idle once it finishes. The job list only
//! accepts `enqueue` and `clear` while Idle.

mod types;


pub use types::{Job, JobId, JobStatus, QueueConfig, QueueEvent, QueueState, QueueStats};

use std::sync::Arc;

use tokio::sync::{mpsc, watch, RwLock};
use tokio_util::sync::CancellationToken;

use crate::documents::{DocumentProcessor, DocumentSource, RedactedDocument};
use crate::error::QueueError;

/// Buffered scheduler events. Events past this are dropped, not awaited.
const EVENT_BUFFER: usize = 256;

struct Shared {
    jobs: RwLock<Vec<Job>>,
    state: watch::Sender<QueueState>,
    events: mpsc::Sender<QueueEvent>,
    cancel: CancellationToken,
    config: QueueConfig,
}

impl Shared {
    fn state(&self) -> QueueState {
        *self.state.borrow()
    }

    fn set_state(&self, state: QueueState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::info!(from = %previous, to = %state, "Queue state changed");
            self.emit(QueueEvent::StateChanged { state });
        }
    }

    fn emit(&self, event: QueueEvent) {
        if let Err(mpsc::error::TrySendError::Full(event)) = self.events.try_send(event) {
            tracing::debug!(?event, "Event buffer full, dropping event");
        }
    }
}

/// Handle to a job queue and its scheduler task.
///
/// Cheap to clone; every clone controls the same queue.
#[derive(Clone)]
pub struct JobQueue {
    shared: Arc<Shared>,
}

impl JobQueue {
    /// Create a queue and spawn its scheduler.
    ///
    /// Must be called from within a tokio runtime. Returns the handle and the
    /// receiving end of the scheduler's event stream.
    pub fn spawn(
        processor: DocumentProcessor,
        config: QueueConfig,
    ) -> (Self, mpsc::Receiver<QueueEvent>) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let (state_tx, _) = watch::channel(QueueState::Idle);

        let shared = Arc::new(Shared {
            jobs: RwLock::new(Vec::new()),
            state: state_tx,
            events: event_tx,
            cancel: CancellationToken::new(),
            config,
        });

        let scheduler = shared.clone();
        tokio::spawn(async move {
            run_scheduler(scheduler, processor).await;
        });

        (Self { shared }, event_rx)
    }

    /// Append one Pending job per source, in order.
    ///
    /// Only allowed while Idle with nothing in flight. Rejected without
    /// touching the queue if the result would hold more than `capacity` jobs.
    pub async fn enqueue(&self, sources: Vec<DocumentSource>) -> Result<Vec<JobId>, QueueError> {
        let mut jobs = self.shared.jobs.write().await;

        let state = self.shared.state();
        let in_flight = jobs.iter().any(|j| j.status == JobStatus::Processing);
        if state != QueueState::Idle || in_flight {
            tracing::warn!(%state, in_flight, "Queue busy, rejecting documents");
            return Err(QueueError::State { state });
        }

        let capacity = self.shared.config.capacity;

        if jobs.len() + sources.len() > capacity {
            tracing::warn!(
                current = jobs.len(),
                requested = sources.len(),
                capacity,
                "Queue capacity exceeded, rejecting documents"
            );
            return Err(QueueError::Capacity {
                current: jobs.len(),
                requested: sources.len(),
                capacity,
            });
        }

        let ids = sources
            .into_iter()
            .map(|source| {
                let job = Job::new(source);
                let id = job.id.clone();
                tracing::debug!(job_id = %id, name = %job.name, "Job queued");
                jobs.push(job);
                id
            })
            .collect::<Vec<_>>();

        tracing::info!(added = ids.len(), total = jobs.len(), "Documents queued");
        Ok(ids)
    }

    /// Start processing pending jobs. Returns the resulting state.
    ///
    /// With nothing pending or in flight the queue stays Idle. While Stopping
    /// this resumes Running; the in-flight job is not started twice.
    pub async fn start(&self) -> QueueState {
        let jobs = self.shared.jobs.read().await;

        if self.shared.state() == QueueState::Running {
            return QueueState::Running;
        }

        let has_work = jobs
            .iter()
            .any(|j| matches!(j.status, JobStatus::Pending | JobStatus::Processing));
        if !has_work {
            tracing::info!("Nothing to process");
            self.shared.set_state(QueueState::Idle);
            return QueueState::Idle;
        }

        self.shared.set_state(QueueState::Running);
        QueueState::Running
    }

    /// Stop after the in-flight job. No-op unless Running.
    pub fn stop(&self) -> QueueState {
        let state = self.shared.state();
        if state == QueueState::Running {
            self.shared.set_state(QueueState::Stopping);
            return QueueState::Stopping;
        }
        state
    }

    /// Remove every job. Only allowed while Idle.
    pub async fn clear(&self) -> Result<usize, QueueError> {
        let mut jobs = self.shared.jobs.write().await;

        let state = self.shared.state();
        if state != QueueState::Idle {
            return Err(QueueError::State { state });
        }

        let removed = jobs.len();
        jobs.clear();
        tracing::info!(removed, "Queue cleared");
        Ok(removed)
    }

    /// Snapshot of every job, in queue order.
    pub async fn jobs(&self) -> Vec<Job> {
        self.shared.jobs.read().await.clone()
    }

    pub async fn job(&self, id: &str) -> Option<Job> {
        self.shared
            .jobs
            .read()
            .await
            .iter()
            .find(|j| j.id == id)
            .cloned()
    }

    pub async fn stats(&self) -> QueueStats {
        QueueStats::from_jobs(&self.shared.jobs.read().await)
    }

    pub fn state(&self) -> QueueState {
        self.shared.state()
    }

    pub fn capacity(&self) -> usize {
        self.shared.config.capacity
    }

    /// Wait until the queue is Idle. Returns immediately if it already is.
    pub async fn wait_idle(&self) {
        let mut rx = self.shared.state.subscribe();
        let _ = rx.wait_for(|s| *s == QueueState::Idle).await;
    }

    /// `(file name, document)` pairs of every completed job, in queue order.
    pub async fn completed_outputs(&self) -> Vec<(String, Arc<Vec<u8>>)> {
        self.shared
            .jobs
            .read()
            .await
            .iter()
            .filter_map(|j| j.result.as_ref())
            .map(|r| (r.file_name.clone(), r.document.clone()))
            .collect()
    }

    /// Terminate the scheduler task. An in-flight job is marked failed.
    pub fn shutdown(&self) {
        self.shared.cancel.cancel();
    }
}

/// What the scheduler picked to run next.
struct NextJob {
    id: JobId,
    name: String,
    source: DocumentSource,
}

async fn run_scheduler(shared: Arc<Shared>, processor: DocumentProcessor) {
    let mut state_rx = shared.state.subscribe();
    tracing::debug!("Scheduler started");

    loop {
        tokio::select! {
            biased;

            _ = shared.cancel.cancelled() => break,

            changed = state_rx.wait_for(|s| *s != QueueState::Idle) => {
                if changed.is_err() {
                    break;
                }
            }
        }

        let Some(next) = next_pending(&shared).await else {
            continue;
        };

        // Pacing. Leaving Running during the wait means the job never starts.
        let proceed = tokio::select! {
            biased;

            _ = shared.cancel.cancelled() => break,

            _ = state_rx.wait_for(|s| *s != QueueState::Running) => false,

            _ = tokio::time::sleep(shared.config.job_delay) => true,
        };

        if !proceed || !begin_job(&shared, &next.id).await {
            continue;
        }

        tracing::info!(job_id = %next.id, name = %next.name, "Processing document");
        shared.emit(QueueEvent::JobStarted {
            id: next.id.clone(),
            name: next.name.clone(),
        });

        let started = std::time::Instant::now();
        let outcome = tokio::select! {
            biased;

            _ = shared.cancel.cancelled() => {
                finish_job(&shared, &next, Err("queue shut down".to_string())).await;
                break;
            }

            outcome = processor.process(&next.source) => outcome,
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(result) => {
                tracing::info!(
                    job_id = %next.id,
                    name = %next.name,
                    output = %result.file_name,
                    elapsed_ms,
                    "Document anonymized"
                );
                finish_job(&shared, &next, Ok(result)).await;
            }
            Err(e) => {
                tracing::error!(
                    job_id = %next.id,
                    name = %next.name,
                    error = %e,
                    elapsed_ms,
                    "Document failed"
                );
                finish_job(&shared, &next, Err(e.to_string())).await;
            }
        }
    }

    tracing::debug!("Scheduler stopped");
}

/// Select the earliest Pending job, or settle the queue into Idle.
async fn next_pending(shared: &Shared) -> Option<NextJob> {
    let jobs = shared.jobs.read().await;

    match shared.state() {
        QueueState::Running => {}
        QueueState::Stopping => {
            shared.set_state(QueueState::Idle);
            return None;
        }
        QueueState::Idle => return None,
    }

    match jobs.iter().find(|j| j.status == JobStatus::Pending) {
        Some(job) => Some(NextJob {
            id: job.id.clone(),
            name: job.name.clone(),
            source: job.source.clone(),
        }),
        None => {
            tracing::info!("Queue drained");
            shared.set_state(QueueState::Idle);
            None
        }
    }
}

/// Mark the job Processing if the queue is still Running.
async fn begin_job(shared: &Shared, id: &str) -> bool {
    let mut jobs = shared.jobs.write().await;

    if shared.state() != QueueState::Running {
        shared.set_state(QueueState::Idle);
        return false;
    }

    match jobs.iter_mut().find(|j| j.id == id) {
        Some(job) if job.status == JobStatus::Pending => {
            job.mark_processing();
            true
        }
        _ => false,
    }
}

async fn finish_job(
    shared: &Shared,
    next: &NextJob,
    outcome: Result<RedactedDocument, String>,
) {
    let mut jobs = shared.jobs.write().await;

    if let Some(job) = jobs.iter_mut().find(|j| j.id == next.id) {
        match outcome {
            Ok(result) => {
                job.mark_completed(result);
                shared.emit(QueueEvent::JobCompleted {
                    id: next.id.clone(),
                    name: next.name.clone(),
                });
            }
            Err(error) => {
                job.mark_failed(error.clone());
                shared.emit(QueueEvent::JobFailed {
                    id: next.id.clone(),
                    name: next.name.clone(),
                    error,
                });
            }
        }
    }

    if shared.state() == QueueState::Stopping {
        shared.set_state(QueueState::Idle);
    }
}
