//! Job and queue types.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::documents::{DocumentSource, RedactedDocument};

/// Job identifier, a UUID v4 string.
pub type JobId = String;

/// Where a job is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Queued, waiting for the scheduler
    Pending,
    /// Being extracted, redacted or rendered right now
    Processing,
    /// Finished; `result` is set
    Completed,
    /// Failed; `error` is set
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Error => write!(f, "error"),
        }
    }
}

/// One document tracked by the queue.
///
/// Callers only ever see clones; the queue is the sole writer.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: JobId,
    /// Source file name
    pub name: String,
    #[serde(skip)]
    pub source: DocumentSource,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<RedactedDocument>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub(crate) fn new(source: DocumentSource) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: source.name.clone(),
            source,
            status: JobStatus::Pending,
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub(crate) fn mark_processing(&mut self) {
        self.status = JobStatus::Processing;
        self.started_at = Some(Utc::now());
    }

    pub(crate) fn mark_completed(&mut self, result: RedactedDocument) {
        self.status = JobStatus::Completed;
        self.result = Some(result);
        self.finished_at = Some(Utc::now());
    }

    pub(crate) fn mark_failed(&mut self, error: String) {
        self.status = JobStatus::Error;
        self.error = Some(error);
        self.finished_at = Some(Utc::now());
    }

    /// Wall time spent processing, once finished.
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        Some(self.finished_at? - self.started_at?)
    }
}

/// Scheduler control state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    /// Not processing; `clear` is allowed
    #[default]
    Idle,
    /// Processing pending jobs one at a time
    Running,
    /// Finishing the in-flight job, then going idle
    Stopping,
}

impl std::fmt::Display for QueueState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueState::Idle => write!(f, "idle"),
            QueueState::Running => write!(f, "running"),
            QueueState::Stopping => write!(f, "stopping"),
        }
    }
}

/// Job counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl QueueStats {
    pub fn from_jobs(jobs: &[Job]) -> Self {
        let count = |status: JobStatus| jobs.iter().filter(|j| j.status == status).count();
        Self {
            total: jobs.len(),
            pending: count(JobStatus::Pending),
            processing: count(JobStatus::Processing),
            completed: count(JobStatus::Completed),
            failed: count(JobStatus::Error),
        }
    }
}

/// Notification emitted by the scheduler
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum QueueEvent {
    StateChanged { state: QueueState },
    JobStarted { id: JobId, name: String },
    JobCompleted { id: JobId, name: String },
    JobFailed { id: JobId, name: String, error: String },
}

/// Queue tuning
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum number of jobs held at once, finished ones included
    pub capacity: usize,
    /// Pause before starting each job
    pub job_delay: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            job_delay: Duration::from_millis(1000),
        }
    }
}
