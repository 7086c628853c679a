//! Client-side projection of a server-owned generation job.
//!
//! The backend reports jobs as loosely-typed JSON ([`JobRecord`]). The
//! controller never works on the raw record: it converts it into a
//! [`JobSnapshot`], which only exposes result images for succeeded jobs
//! and failure reasons for failed or cancelled ones.

use serde::{Deserialize, Serialize};

use crate::generation::FailureKind;
use crate::types::JobId;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// `true` for `succeeded`, `failed` and `cancelled`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Wire record
// ---------------------------------------------------------------------------

/// Job as returned inside the `job` field of `GET /api/job/{id}/status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    #[serde(default)]
    pub job_id: Option<JobId>,
    pub status: JobStatus,
    #[serde(default)]
    pub queue_position: i64,
    #[serde(default)]
    pub estimated_wait: f64,
    #[serde(default)]
    pub images: Option<Vec<String>>,
    #[serde(default)]
    pub error: Option<String>,
    /// Structured error kind, e.g. `"COMPLIANCE"`.
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub stage: Option<String>,
}

impl JobRecord {
    /// A bare record with the given status and nothing else set.
    pub fn with_status(status: JobStatus) -> Self {
        Self {
            job_id: None,
            status,
            queue_position: 0,
            estimated_wait: 0.0,
            images: None,
            error: None,
            code: None,
            progress: None,
            stage: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Read-only, invariant-respecting view of a job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSnapshot {
    pub job_id: Option<JobId>,
    pub status: JobStatus,
    /// 0 means not waiting (running or terminal).
    pub queue_position: u32,
    /// Advisory wait in seconds, never negative.
    pub estimated_wait: f64,
    pub progress: u8,
    pub stage: Option<String>,
    images: Vec<String>,
    error: Option<String>,
    code: Option<String>,
}

impl JobSnapshot {
    /// Result image URLs. Empty unless the job succeeded.
    pub fn images(&self) -> &[String] {
        &self.images
    }

    /// Failure reason. Only ever set for failed or cancelled jobs.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// Still waiting for a worker slot.
    pub fn is_waiting(&self) -> bool {
        self.queue_position > 0
    }

    pub fn failure_kind(&self) -> FailureKind {
        FailureKind::from_code(self.code())
    }
}

impl From<JobRecord> for JobSnapshot {
    fn from(record: JobRecord) -> Self {
        let status = record.status;
        let queue_position = if status.is_terminal() {
            0
        } else {
            u32::try_from(record.queue_position.max(0)).unwrap_or(u32::MAX)
        };
        let estimated_wait = if record.estimated_wait.is_finite() {
            record.estimated_wait.max(0.0)
        } else {
            0.0
        };
        let images = match status {
            JobStatus::Succeeded => record.images.unwrap_or_default(),
            _ => Vec::new(),
        };
        let error = match status {
            JobStatus::Failed | JobStatus::Cancelled => record.error.filter(|e| !e.is_empty()),
            _ => None,
        };
        let progress = record
            .progress
            .filter(|p| p.is_finite())
            .map(|p| p.clamp(0.0, 100.0) as u8)
            .unwrap_or(0);

        Self {
            job_id: record.job_id,
            status,
            queue_position,
            estimated_wait,
            progress,
            stage: record.stage,
            images,
            error,
            code: record.code,
        }
    }
}

// ---------------------------------------------------------------------------
// Queue display
// ---------------------------------------------------------------------------

/// Queue position shown while a job waits for a worker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QueueInfo {
    pub position: u32,
    pub estimated_wait: f64,
    pub running_count: u32,
    pub waiting_count: u32,
}

/// Backend-wide queue statistics (`GET /api/queue/stats`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    #[serde(default)]
    pub running_count: u32,
    #[serde(default)]
    pub waiting_count: u32,
    #[serde(default)]
    pub max_concurrent: u32,
    /// Average job duration in seconds.
    #[serde(default)]
    pub avg_duration: f64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: JobStatus) -> JobRecord {
        JobRecord::with_status(status)
    }

    #[test]
    fn terminal_states() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn status_parses_from_wire() {
        let status: JobStatus = serde_json::from_str("\"cancelled\"").unwrap();
        assert_eq!(status, JobStatus::Cancelled);
    }

    #[test]
    fn images_dropped_unless_succeeded() {
        let mut running = record(JobStatus::Running);
        running.images = Some(vec!["/img/partial.png".into()]);
        assert!(JobSnapshot::from(running).images().is_empty());

        let mut done = record(JobStatus::Succeeded);
        done.images = Some(vec!["/img/1.png".into(), "/img/2.png".into()]);
        let snapshot = JobSnapshot::from(done);
        assert_eq!(snapshot.images(), ["/img/1.png", "/img/2.png"]);
    }

    #[test]
    fn error_only_kept_for_failed_or_cancelled() {
        let mut queued = record(JobStatus::Queued);
        queued.error = Some("stale".into());
        assert_eq!(JobSnapshot::from(queued).error(), None);

        let mut failed = record(JobStatus::Failed);
        failed.error = Some("boom".into());
        assert_eq!(JobSnapshot::from(failed).error(), Some("boom"));

        let mut cancelled = record(JobStatus::Cancelled);
        cancelled.error = Some(String::new());
        assert_eq!(JobSnapshot::from(cancelled).error(), None);
    }

    #[test]
    fn negative_queue_values_are_clamped() {
        let mut queued = record(JobStatus::Queued);
        queued.queue_position = -2;
        queued.estimated_wait = -5.0;
        let snapshot = JobSnapshot::from(queued);
        assert_eq!(snapshot.queue_position, 0);
        assert_eq!(snapshot.estimated_wait, 0.0);
        assert!(!snapshot.is_waiting());
    }

    #[test]
    fn terminal_job_is_never_waiting() {
        let mut done = record(JobStatus::Succeeded);
        done.queue_position = 4;
        assert!(!JobSnapshot::from(done).is_waiting());
    }

    #[test]
    fn full_status_payload_deserializes() {
        let json = serde_json::json!({
            "job_id": "abc123",
            "status": "succeeded",
            "progress": 100,
            "stage": "done",
            "images": ["/img/1.png"],
            "error": null,
            "queue_position": 0,
            "estimated_wait": 0,
            "created_at": 1700000000.5
        });
        let record: JobRecord = serde_json::from_value(json).unwrap();
        let snapshot = JobSnapshot::from(record);
        assert_eq!(snapshot.job_id.as_deref(), Some("abc123"));
        assert_eq!(snapshot.progress, 100);
        assert_eq!(snapshot.images(), ["/img/1.png"]);
    }
}
