//! Events emitted by the job controller.
//!
//! These are the state changes a front-end renders: status transitions,
//! the analysis preview, queue position, progress, new transcript
//! messages, and the compliance banner flag.

use joyip_core::analysis::AnalysisResult;
use joyip_core::chat::{ChatMessage, ChatStatus};
use joyip_core::job::{JobStatus, QueueInfo};
use joyip_core::types::JobId;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub enum ControllerEvent {
    /// The chat flow moved to a new status.
    StatusChanged { status: ChatStatus },

    /// Analysis finished; the preview can be shown and edited.
    AnalysisReady {
        analysis: AnalysisResult,
        prompt: String,
    },

    /// The backend accepted a job and polling has begun.
    JobStarted { job_id: JobId },

    /// Queue position changed. `None` once the job left the queue.
    QueueUpdated { queue: Option<QueueInfo> },

    /// Status or progress of the tracked job changed.
    JobProgress {
        job_id: JobId,
        status: JobStatus,
        /// Completion percentage (0-100).
        progress: u8,
        stage: Option<String>,
    },

    /// The tracked job reached an outcome (including user cancellation).
    JobFinished { job_id: JobId, status: JobStatus },

    /// A message was appended to the transcript.
    MessageAppended { message: ChatMessage },

    /// The compliance banner should be shown (`true`) or hidden.
    ComplianceFlagChanged { active: bool },
}
