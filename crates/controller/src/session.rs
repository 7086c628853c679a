//! Mutable state of one chat session.
//!
//! [`Session`] holds everything the controller tracks between calls: the
//! persisted [`ChatState`], the current [`ChatStatus`], the analysis under
//! review, and the job being polled. Every mutation that a front-end
//! needs to see goes through a method here so the matching
//! [`ControllerEvent`] is emitted and the transcript is persisted.
//!
//! The session performs no I/O besides the synchronous store write, which
//! keeps the transitions testable without a runtime.

use std::sync::Arc;

use joyip_core::analysis::AnalysisResult;
use joyip_core::chat::{ChatMessage, ChatState, ChatStatus};
use joyip_core::generation::{
    FailureKind, GenerationSettings, Phase, CANCELLED_TEXT, GENERATED_TEXT, INTERRUPTED_TEXT,
};
use joyip_core::job::{JobSnapshot, JobStatus, QueueInfo};
use joyip_core::types::JobId;
use joyip_store::{ChatStateRepo, KeyValueStore};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::events::ControllerEvent;

// ---------------------------------------------------------------------------
// Active job
// ---------------------------------------------------------------------------

/// The job currently being polled.
///
/// Dropping the handle cancels its poll task, so clearing the session's
/// job slot is enough to stop polling.
pub struct ActiveJob {
    pub job_id: JobId,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    last_progress: Option<(JobStatus, u8)>,
}

impl ActiveJob {
    pub fn new(job_id: JobId, cancel: CancellationToken) -> Self {
        Self {
            job_id,
            cancel,
            task: None,
            last_progress: None,
        }
    }

    pub fn with_task(mut self, task: JoinHandle<()>) -> Self {
        self.task = Some(task);
        self
    }

    /// Cancel polling and hand back the task so the caller may await it.
    pub fn stop(mut self) -> Option<JoinHandle<()>> {
        self.cancel.cancel();
        self.task.take()
    }
}

impl Drop for ActiveJob {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// What a status update did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The job is still queued or running; keep polling.
    Pending,
    /// The job reached a terminal status and its message was appended.
    Finished(JobStatus),
    /// The update belongs to a job that is no longer tracked.
    Stale,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub struct Session {
    pub(crate) chat: ChatState,
    pub(crate) status: ChatStatus,
    pub(crate) is_loading: bool,
    pub(crate) analysis: Option<AnalysisResult>,
    pub(crate) pending_prompt: String,
    pub(crate) settings: GenerationSettings,
    pub(crate) queue: Option<QueueInfo>,
    pub(crate) compliance_error: bool,
    /// Bumped whenever a request flow starts or the session is cleared,
    /// so a late response can tell it no longer applies.
    pub(crate) flow: u64,
    active_job: Option<ActiveJob>,
    store: Arc<dyn KeyValueStore>,
    events: broadcast::Sender<ControllerEvent>,
}

impl Session {
    /// Restore the persisted chat state. No job is ever restored.
    pub fn restore(
        store: Arc<dyn KeyValueStore>,
        settings: GenerationSettings,
        events: broadcast::Sender<ControllerEvent>,
    ) -> Self {
        let chat = ChatStateRepo::load(store.as_ref());
        Self {
            chat,
            status: ChatStatus::Idle,
            is_loading: false,
            analysis: None,
            pending_prompt: String::new(),
            settings,
            queue: None,
            compliance_error: false,
            flow: 0,
            active_job: None,
            store,
            events,
        }
    }

    pub fn chat(&self) -> &ChatState {
        &self.chat
    }

    pub fn status(&self) -> ChatStatus {
        self.status
    }

    pub fn queue(&self) -> Option<QueueInfo> {
        self.queue
    }

    pub fn compliance_error(&self) -> bool {
        self.compliance_error
    }

    pub fn job_id(&self) -> Option<&str> {
        self.active_job.as_ref().map(|j| j.job_id.as_str())
    }

    // ---- event-emitting setters ----

    fn emit(&self, event: ControllerEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    pub(crate) fn set_status(&mut self, status: ChatStatus) {
        if self.status != status {
            tracing::debug!(from = %self.status, to = %status, "Chat status changed");
            self.status = status;
            self.emit(ControllerEvent::StatusChanged { status });
        }
    }

    pub(crate) fn set_queue(&mut self, queue: Option<QueueInfo>) {
        if self.queue != queue {
            self.queue = queue;
            self.emit(ControllerEvent::QueueUpdated { queue });
        }
    }

    pub(crate) fn set_compliance(&mut self, active: bool) {
        if self.compliance_error != active {
            self.compliance_error = active;
            self.emit(ControllerEvent::ComplianceFlagChanged { active });
        }
    }

    /// Append a message and persist the whole chat state before returning.
    pub(crate) fn append_message(&mut self, message: ChatMessage) {
        self.chat.messages.push(message.clone());
        self.persist();
        self.emit(ControllerEvent::MessageAppended { message });
    }

    /// Write the chat state to the store. Failures are logged; the
    /// in-memory transcript stays authoritative.
    pub(crate) fn persist(&self) {
        if let Err(e) = ChatStateRepo::save(self.store.as_ref(), &self.chat) {
            tracing::warn!(error = %e, "Failed to persist chat state");
        }
    }

    // ---- analysis phase ----

    pub(crate) fn begin_analysis(&mut self, prompt: &str) -> u64 {
        self.flow += 1;
        self.chat.input.clear();
        self.append_message(ChatMessage::user(prompt));
        self.is_loading = true;
        self.set_status(ChatStatus::Analyzing);
        self.flow
    }

    pub(crate) fn enter_preview(&mut self, analysis: AnalysisResult, prompt: &str) {
        self.set_compliance(false);
        self.analysis = Some(analysis.clone());
        self.pending_prompt = prompt.to_string();
        self.is_loading = false;
        self.set_status(ChatStatus::Preview);
        self.emit(ControllerEvent::AnalysisReady {
            analysis,
            prompt: prompt.to_string(),
        });
    }

    /// Drop the preview without generating.
    pub(crate) fn reset_preview(&mut self) {
        self.analysis = None;
        self.pending_prompt.clear();
        self.is_loading = false;
        self.set_status(ChatStatus::Idle);
    }

    /// End the analyze or start phase with an error message and return
    /// to idle.
    pub(crate) fn fail(&mut self, kind: FailureKind, text: String) {
        self.analysis = None;
        self.pending_prompt.clear();
        self.set_queue(None);
        self.set_compliance(kind.is_compliance());
        self.append_message(ChatMessage::assistant(text));
        self.is_loading = false;
        self.set_status(ChatStatus::Idle);
    }

    /// End a flow whose request was abandoned before its response was
    /// applied. Returns `false` when the flow already moved on.
    pub(crate) fn abandon(&mut self, flow: u64, phase: Phase) -> bool {
        let waiting = match phase {
            Phase::Analyze => ChatStatus::Analyzing,
            Phase::Generate => ChatStatus::Generating,
        };
        if self.flow != flow || self.status != waiting || self.active_job.is_some() {
            return false;
        }
        tracing::warn!(?phase, flow, "Request abandoned, returning to idle");
        self.flow += 1;
        self.fail(
            FailureKind::Generic,
            phase.failure_text(FailureKind::Generic, Some(INTERRUPTED_TEXT)),
        );
        true
    }

    // ---- generation phase ----

    pub(crate) fn begin_generation(&mut self) -> u64 {
        self.flow += 1;
        self.is_loading = true;
        self.set_status(ChatStatus::Generating);
        self.flow
    }

    /// Start tracking an accepted job. Any previous job is stopped.
    pub(crate) fn track_job(&mut self, job: ActiveJob, queue: Option<QueueInfo>) {
        let job_id = job.job_id.clone();
        self.analysis = None;
        self.pending_prompt.clear();
        self.active_job = Some(job);
        self.set_queue(queue);
        tracing::info!(job_id = %job_id, "Tracking generation job");
        self.emit(ControllerEvent::JobStarted { job_id });
    }

    /// Stop tracking the active job without touching the transcript.
    pub(crate) fn take_job(&mut self) -> Option<ActiveJob> {
        self.active_job.take()
    }

    /// Apply one status update for `job_id`.
    ///
    /// Updates for a job that is not the tracked one are ignored. A
    /// terminal update stops polling, appends exactly one message, clears
    /// the job and returns the session to idle.
    pub fn apply_job_update(&mut self, job_id: &str, snapshot: JobSnapshot) -> PollOutcome {
        let Some(job) = self.active_job.as_mut().filter(|j| j.job_id == job_id) else {
            tracing::debug!(job_id, status = %snapshot.status, "Ignoring update for untracked job");
            return PollOutcome::Stale;
        };

        let progress = (snapshot.status, snapshot.progress);
        let progressed = job.last_progress != Some(progress);
        job.last_progress = Some(progress);

        if snapshot.is_waiting() {
            // Keep the counts reported when the job was accepted.
            let (running_count, waiting_count) = self
                .queue
                .map(|q| (q.running_count, q.waiting_count))
                .unwrap_or_default();
            self.set_queue(Some(QueueInfo {
                position: snapshot.queue_position,
                estimated_wait: snapshot.estimated_wait,
                running_count,
                waiting_count,
            }));
        } else if snapshot.status == JobStatus::Running {
            self.set_queue(None);
        }

        if progressed && !snapshot.status.is_terminal() {
            self.emit(ControllerEvent::JobProgress {
                job_id: job_id.to_string(),
                status: snapshot.status,
                progress: snapshot.progress,
                stage: snapshot.stage.clone(),
            });
        }

        let message = match snapshot.status {
            JobStatus::Queued | JobStatus::Running => return PollOutcome::Pending,
            JobStatus::Succeeded => {
                self.set_compliance(false);
                ChatMessage::assistant_with_images(GENERATED_TEXT, snapshot.images().to_vec())
            }
            JobStatus::Cancelled => {
                self.set_compliance(snapshot.failure_kind().is_compliance());
                ChatMessage::assistant(CANCELLED_TEXT)
            }
            JobStatus::Failed => {
                let kind = snapshot.failure_kind();
                self.set_compliance(kind.is_compliance());
                ChatMessage::assistant(Phase::Generate.failure_text(kind, snapshot.error()))
            }
        };

        tracing::info!(job_id, status = %snapshot.status, "Job finished");
        self.finish_job(message, snapshot.status);
        PollOutcome::Finished(snapshot.status)
    }

    /// Record a job outcome decided on this side (user cancellation).
    pub(crate) fn finish_cancelled(&mut self, job_id: JobId) {
        self.active_job = None;
        self.finish_job_as(job_id, ChatMessage::assistant(CANCELLED_TEXT), JobStatus::Cancelled);
    }

    fn finish_job(&mut self, message: ChatMessage, status: JobStatus) {
        if let Some(job) = self.active_job.take() {
            self.finish_job_as(job.job_id.clone(), message, status);
        }
    }

    fn finish_job_as(&mut self, job_id: JobId, message: ChatMessage, status: JobStatus) {
        self.set_queue(None);
        self.append_message(message);
        self.is_loading = false;
        self.set_status(ChatStatus::Idle);
        self.emit(ControllerEvent::JobFinished { job_id, status });
    }

    /// Reset to a blank session: empty transcript, default input, no
    /// presets, no job.
    pub(crate) fn clear(&mut self) {
        self.flow += 1;
        self.active_job = None;
        self.chat = ChatState::default();
        self.analysis = None;
        self.pending_prompt.clear();
        self.is_loading = false;
        self.set_queue(None);
        self.set_compliance(false);
        self.set_status(ChatStatus::Idle);
        if let Err(e) = ChatStateRepo::clear(self.store.as_ref()) {
            tracing::warn!(error = %e, "Failed to remove persisted chat state");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
