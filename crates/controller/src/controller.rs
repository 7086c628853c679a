//! Public handle over a chat session.
//!
//! [`JobController`] is cheap to clone. All clones share one session;
//! when the last clone is dropped any running poll task is cancelled.

use std::sync::Arc;
use std::time::Duration;

use joyip_client::types::{AnalyzeRequest, StartGenerateRequest};
use joyip_client::{ApiError, GenerationApi};
use joyip_core::analysis::{AnalysisField, AnalysisResult};
use joyip_core::chat::{ChatMessage, ChatState, ChatStatus, PresetKind};
use joyip_core::generation::{
    FailureKind, GenerationMode, GenerationSettings, Phase, START_FAILED_TEXT,
};
use joyip_core::job::QueueInfo;
use joyip_core::types::JobId;
use joyip_store::KeyValueStore;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::events::ControllerEvent;
use crate::poller;
use crate::session::{ActiveJob, Session};

/// Interval between job status checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2500);

/// How long [`JobController::shutdown`] waits for the poll task.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Broadcast channel capacity for controller events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Config / errors / snapshot
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub poll_interval: Duration,
    pub settings: GenerationSettings,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            settings: GenerationSettings::default(),
        }
    }
}

/// Requests the controller refuses in its current state.
///
/// Backend failures are not errors here: they end the flow with a
/// transcript message instead.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ControllerError {
    #[error("Input is empty")]
    EmptyInput,

    #[error("Another request is in progress (status: {status})")]
    Busy { status: ChatStatus },

    #[error("No analysis preview to act on (status: {status})")]
    NotInPreview { status: ChatStatus },

    #[error("Controller has been shut down")]
    ShutDown,
}

/// Point-in-time copy of the session, for rendering.
#[derive(Debug, Clone)]
pub struct ControllerSnapshot {
    pub status: ChatStatus,
    pub is_loading: bool,
    pub job_id: Option<JobId>,
    pub queue: Option<QueueInfo>,
    pub analysis: Option<AnalysisResult>,
    pub pending_prompt: String,
    pub compliance_error: bool,
    pub settings: GenerationSettings,
    pub chat: ChatState,
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct JobController {
    api: Arc<dyn GenerationApi>,
    session: Arc<Mutex<Session>>,
    events: broadcast::Sender<ControllerEvent>,
    poll_interval: Duration,
    /// Parent of every poll task's token.
    cancel: CancellationToken,
    _guard: Arc<DropGuard>,
}

impl JobController {
    /// Create a controller and restore the persisted chat state.
    pub fn new(
        api: Arc<dyn GenerationApi>,
        store: Arc<dyn KeyValueStore>,
        config: ControllerConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let session = Session::restore(store, config.settings, events.clone());
        let cancel = CancellationToken::new();

        Self {
            api,
            session: Arc::new(Mutex::new(session)),
            events,
            poll_interval: config.poll_interval,
            _guard: Arc::new(cancel.clone().drop_guard()),
            cancel,
        }
    }

    /// Subscribe to state change events.
    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> ControllerSnapshot {
        let s = self.session.lock().await;
        ControllerSnapshot {
            status: s.status,
            is_loading: s.is_loading,
            job_id: s.job_id().map(str::to_string),
            queue: s.queue,
            analysis: s.analysis.clone(),
            pending_prompt: s.pending_prompt.clone(),
            compliance_error: s.compliance_error,
            settings: s.settings.clone(),
            chat: s.chat.clone(),
        }
    }

    // ---- analyze ----

    /// Send a requirement for analysis.
    ///
    /// The user message is appended and persisted before the request is
    /// made. On success the session enters preview; on failure exactly
    /// one assistant message explains why and the session returns to
    /// idle.
    pub async fn submit(&self, text: &str) -> Result<(), ControllerError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ControllerError::EmptyInput);
        }

        let (flow, request) = {
            let mut s = self.session.lock().await;
            self.ensure_idle(&s)?;
            let flow = s.begin_analysis(text);
            let request = AnalyzeRequest {
                requirement: text.to_string(),
                mode: s.settings.mode,
                perspective: s.settings.perspective_param().map(str::to_string),
            };
            (flow, request)
        };
        let pending = PendingRequest::new(&self.session, flow, Phase::Analyze);

        tracing::info!(mode = %request.mode, "Analyzing requirement");
        let result = self.api.analyze(&request).await;

        let mut s = self.session.lock().await;
        pending.complete();
        if s.flow != flow || s.status != ChatStatus::Analyzing {
            tracing::debug!("Session reset during analysis, discarding result");
            return Ok(());
        }

        match result {
            Ok(response) if response.success && !response.failure_kind().is_compliance() => {
                match response.analysis {
                    Some(mut analysis) => {
                        analysis.sanitize();
                        tracing::info!("Analysis ready for review");
                        s.enter_preview(analysis, text);
                    }
                    None => {
                        tracing::warn!("Analysis succeeded without a result");
                        s.fail(
                            FailureKind::Generic,
                            Phase::Analyze.failure_text(FailureKind::Generic, None),
                        );
                    }
                }
            }
            Ok(response) => {
                let kind = response.failure_kind();
                tracing::info!(compliance = kind.is_compliance(), "Analysis rejected");
                s.fail(kind, Phase::Analyze.failure_text(kind, response.failure_detail()));
            }
            Err(e) => {
                tracing::warn!(error = %e, "Analysis request failed");
                let (kind, text) = describe_error(Phase::Analyze, &e);
                s.fail(kind, text);
            }
        }
        Ok(())
    }

    /// Submit the current input field.
    pub async fn send_input(&self) -> Result<(), ControllerError> {
        let input = self.session.lock().await.chat.input.clone();
        self.submit(&input).await
    }

    // ---- preview ----

    /// Change one field of the analysis under review. Local only.
    pub async fn edit_analysis(
        &self,
        field: AnalysisField,
        value: impl Into<String>,
    ) -> Result<(), ControllerError> {
        let mut s = self.session.lock().await;
        let status = s.status;
        match s.analysis.as_mut() {
            Some(analysis) if status == ChatStatus::Preview => {
                analysis.set(field, value);
                Ok(())
            }
            _ => Err(ControllerError::NotInPreview { status }),
        }
    }

    /// Drop the preview and return to idle without generating.
    pub async fn discard_preview(&self) -> Result<(), ControllerError> {
        let mut s = self.session.lock().await;
        if s.status != ChatStatus::Preview {
            return Err(ControllerError::NotInPreview { status: s.status });
        }
        tracing::info!("Preview discarded");
        s.reset_preview();
        Ok(())
    }

    // ---- generate ----

    /// Confirm the (possibly edited) analysis and start a generation job.
    ///
    /// On acceptance the job is tracked and polled in the background until
    /// it finishes or is cancelled.
    pub async fn confirm(&self) -> Result<(), ControllerError> {
        let (flow, request) = {
            let mut s = self.session.lock().await;
            if self.cancel.is_cancelled() {
                return Err(ControllerError::ShutDown);
            }
            let analysis = match (&s.analysis, s.status) {
                (Some(analysis), ChatStatus::Preview) if !s.pending_prompt.is_empty() => {
                    analysis.clone()
                }
                _ => return Err(ControllerError::NotInPreview { status: s.status }),
            };
            let flow = s.begin_generation();
            let request = StartGenerateRequest {
                requirement: s.pending_prompt.clone(),
                analysis,
                mode: s.settings.mode,
                perspective: s.settings.perspective_param().map(str::to_string),
            };
            (flow, request)
        };
        let pending = PendingRequest::new(&self.session, flow, Phase::Generate);

        tracing::info!(mode = %request.mode, "Starting generation job");
        let result = self.api.start_generate(&request).await;

        let mut s = self.session.lock().await;
        pending.complete();
        if s.flow != flow || s.status != ChatStatus::Generating || s.job_id().is_some() {
            tracing::debug!("Session reset while starting job, discarding result");
            return Ok(());
        }
        if self.cancel.is_cancelled() {
            return Err(ControllerError::ShutDown);
        }

        match result {
            Ok(response) if response.success => {
                let Some(job_id) = response.job_id.clone().filter(|id| !id.is_empty()) else {
                    tracing::warn!("Start response without job id");
                    s.fail(
                        FailureKind::Generic,
                        Phase::Generate.failure_text(FailureKind::Generic, Some(START_FAILED_TEXT)),
                    );
                    return Ok(());
                };

                let queue = (response.queue_position > 0).then(|| {
                    let stats = response.queue_stats.unwrap_or_default();
                    QueueInfo {
                        position: u32::try_from(response.queue_position).unwrap_or(u32::MAX),
                        estimated_wait: response.estimated_wait.max(0.0),
                        running_count: stats.running_count,
                        waiting_count: stats.waiting_count,
                    }
                });

                let token = self.cancel.child_token();
                let task = tokio::spawn(poller::run_poll_loop(
                    Arc::clone(&self.api),
                    Arc::clone(&self.session),
                    job_id.clone(),
                    self.poll_interval,
                    token.clone(),
                ));
                s.track_job(ActiveJob::new(job_id, token).with_task(task), queue);
            }
            Ok(response) => {
                let kind = response.failure_kind();
                let detail = response.error.as_deref().unwrap_or(START_FAILED_TEXT);
                tracing::info!(compliance = kind.is_compliance(), "Job submission rejected");
                s.fail(kind, Phase::Generate.failure_text(kind, Some(detail)));
            }
            Err(e) => {
                tracing::warn!(error = %e, "Job submission failed");
                let (kind, text) = describe_error(Phase::Generate, &e);
                s.fail(kind, text);
            }
        }
        Ok(())
    }

    /// Cancel the active job.
    ///
    /// Returns `false` without doing anything when no job is tracked.
    /// Otherwise polling stops immediately, the backend is asked to cancel
    /// (best effort), and the session returns to idle with a single
    /// cancellation message whatever the backend answers.
    pub async fn cancel_job(&self) -> bool {
        let Some(job) = self.session.lock().await.take_job() else {
            return false;
        };
        let job_id = job.job_id.clone();
        drop(job.stop());

        tracing::info!(job_id = %job_id, "Cancelling job");
        match self.api.cancel_job(&job_id).await {
            Ok(ack) => tracing::debug!(
                job_id = %job_id,
                success = ack.success,
                message = ack.message.as_deref().or(ack.error.as_deref()).unwrap_or_default(),
                "Backend acknowledged cancel"
            ),
            Err(e) => tracing::warn!(job_id = %job_id, error = %e, "Backend cancel failed"),
        }

        let mut s = self.session.lock().await;
        if s.status == ChatStatus::Generating && s.job_id().is_none() {
            s.finish_cancelled(job_id);
        }
        true
    }

    // ---- page state ----

    pub async fn set_input(&self, input: impl Into<String>) {
        let mut s = self.session.lock().await;
        s.chat.input = input.into();
        s.persist();
    }

    /// Pick a preset and rebuild the input from the template.
    pub async fn select_preset(&self, kind: PresetKind, value: impl Into<String>) -> String {
        let mut s = self.session.lock().await;
        s.chat.selected_presets.select(kind, value);
        s.chat.input = s.chat.selected_presets.build_input();
        s.persist();
        s.chat.input.clone()
    }

    pub async fn set_scroll_top(&self, scroll_top: f64) {
        let mut s = self.session.lock().await;
        s.chat.scroll_top = scroll_top.max(0.0);
        s.persist();
    }

    /// Settings apply to the next request.
    pub async fn set_mode(&self, mode: GenerationMode) {
        self.session.lock().await.settings.mode = mode;
    }

    pub async fn set_perspective(&self, perspective: impl Into<String>) {
        self.session.lock().await.settings.perspective = perspective.into();
    }

    /// Record the outcome of an image edit as an assistant message.
    ///
    /// Edits run outside the job flow, so this works in any status.
    pub async fn record_edit(&self, text: impl Into<String>, images: Vec<String>) {
        let message = if images.is_empty() {
            ChatMessage::assistant(text)
        } else {
            ChatMessage::assistant_with_images(text, images)
        };
        self.session.lock().await.append_message(message);
    }

    /// Wipe the transcript and page state and stop any job polling.
    ///
    /// The backend job itself is left to finish.
    pub async fn clear(&self) {
        let mut s = self.session.lock().await;
        if let Some(job_id) = s.job_id() {
            tracing::info!(job_id, "Clearing session, abandoning job");
        }
        s.clear();
    }

    /// Stop polling and refuse further jobs. Waits briefly for the poll
    /// task to exit.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let task = self.session.lock().await.take_job().and_then(ActiveJob::stop);

        if let Some(task) = task {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, task).await {
                Ok(_) => tracing::debug!("Poll task stopped"),
                Err(_) => tracing::warn!("Poll task did not stop within timeout"),
            }
        }
        tracing::info!("Job controller shut down");
    }

    fn ensure_idle(&self, s: &Session) -> Result<(), ControllerError> {
        if self.cancel.is_cancelled() {
            return Err(ControllerError::ShutDown);
        }
        if s.is_loading || s.status != ChatStatus::Idle {
            return Err(ControllerError::Busy { status: s.status });
        }
        Ok(())
    }
}

/// Ends an analyze or start flow when the future driving it is dropped
/// before the response is applied, so the session never stays busy.
struct PendingRequest {
    session: Arc<Mutex<Session>>,
    flow: u64,
    phase: Phase,
    armed: bool,
}

impl PendingRequest {
    fn new(session: &Arc<Mutex<Session>>, flow: u64, phase: Phase) -> Self {
        Self {
            session: Arc::clone(session),
            flow,
            phase,
            armed: true,
        }
    }

    /// The response is being applied; nothing to undo.
    fn complete(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let (flow, phase) = (self.flow, self.phase);
        if let Ok(mut s) = self.session.try_lock() {
            s.abandon(flow, phase);
            return;
        }
        // The lock is busy; finish the reset once it is free.
        let session = Arc::clone(&self.session);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    session.lock().await.abandon(flow, phase);
                });
            }
            Err(_) => tracing::warn!(?phase, "No runtime to reset abandoned request"),
        }
    }
}

/// Transcript text for a request that failed without a usable response.
fn describe_error(phase: Phase, error: &ApiError) -> (FailureKind, String) {
    match error {
        ApiError::Timeout => (FailureKind::Generic, phase.timeout_text().to_string()),
        ApiError::Rejected { code, message, .. } => {
            let kind = FailureKind::from_code(code.as_deref());
            (kind, phase.failure_text(kind, Some(message)))
        }
        other => (FailureKind::Generic, phase.transport_text(other)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
