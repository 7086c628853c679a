//! Scripted backend and helpers shared by the controller tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use joyip_client::types::{
    AckResponse, AnalyzeRequest, AnalyzeResponse, BackgroundRequest, EditResponse,
    FeedbackRequest, JobStatusResponse, OptimizeRequest, StartGenerateRequest,
    StartGenerateResponse, TurnRequest, UploadRequest,
};
use joyip_client::{ApiError, GenerationApi};
use joyip_controller::{ControllerConfig, ControllerEvent, JobController};
use joyip_core::analysis::AnalysisResult;
use joyip_core::job::{JobRecord, JobStatus, QueueStats};
use joyip_store::{KeyValueStore, MemoryStore};
use tokio::sync::{broadcast, Notify};

pub const POLL_INTERVAL: Duration = Duration::from_millis(2500);

/// A recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Analyze(AnalyzeRequest),
    Start(StartGenerateRequest),
    Status(String),
    Cancel(String),
}

/// Fake backend answering from per-endpoint queues.
///
/// When the status queue runs dry every further check reports the job
/// as running. A gated endpoint holds its next call until the returned
/// [`Notify`] is signalled.
#[derive(Default)]
pub struct ScriptedApi {
    analyze: Mutex<VecDeque<Result<AnalyzeResponse, ApiError>>>,
    start: Mutex<VecDeque<Result<StartGenerateResponse, ApiError>>>,
    status: Mutex<VecDeque<Result<JobStatusResponse, ApiError>>>,
    cancel: Mutex<VecDeque<Result<AckResponse, ApiError>>>,
    analyze_gate: Mutex<Option<Arc<Notify>>>,
    start_gate: Mutex<Option<Arc<Notify>>>,
    status_gate: Mutex<Option<Arc<Notify>>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_analyze(&self, response: Result<AnalyzeResponse, ApiError>) {
        self.analyze.lock().unwrap().push_back(response);
    }

    pub fn push_start(&self, response: Result<StartGenerateResponse, ApiError>) {
        self.start.lock().unwrap().push_back(response);
    }

    pub fn push_status(&self, response: Result<JobStatusResponse, ApiError>) {
        self.status.lock().unwrap().push_back(response);
    }

    pub fn push_job(&self, record: JobRecord) {
        self.push_status(Ok(JobStatusResponse::found(record)));
    }

    pub fn push_cancel(&self, response: Result<AckResponse, ApiError>) {
        self.cancel.lock().unwrap().push_back(response);
    }

    pub fn gate_analyze(&self) -> Arc<Notify> {
        Self::gate(&self.analyze_gate)
    }

    pub fn gate_start(&self) -> Arc<Notify> {
        Self::gate(&self.start_gate)
    }

    pub fn gate_status(&self) -> Arc<Notify> {
        Self::gate(&self.status_gate)
    }

    fn gate(slot: &Mutex<Option<Arc<Notify>>>) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *slot.lock().unwrap() = Some(notify.clone());
        notify
    }

    async fn pass(slot: &Mutex<Option<Arc<Notify>>>) {
        let gate = slot.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn status_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Status(_)))
            .count()
    }

    pub fn cancel_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Cancel(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl GenerationApi for ScriptedApi {
    async fn analyze(&self, request: &AnalyzeRequest) -> Result<AnalyzeResponse, ApiError> {
        self.record(Call::Analyze(request.clone()));
        Self::pass(&self.analyze_gate).await;
        self.analyze
            .lock()
            .unwrap()
            .pop_front()
            .expect("unexpected analyze call")
    }

    async fn start_generate(
        &self,
        request: &StartGenerateRequest,
    ) -> Result<StartGenerateResponse, ApiError> {
        self.record(Call::Start(request.clone()));
        Self::pass(&self.start_gate).await;
        self.start
            .lock()
            .unwrap()
            .pop_front()
            .expect("unexpected start call")
    }

    async fn job_status(&self, job_id: &str) -> Result<JobStatusResponse, ApiError> {
        self.record(Call::Status(job_id.to_string()));
        Self::pass(&self.status_gate).await;
        let next = self.status.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(JobStatusResponse::found(running(job_id))))
    }

    async fn cancel_job(&self, job_id: &str) -> Result<AckResponse, ApiError> {
        self.record(Call::Cancel(job_id.to_string()));
        let next = self.cancel.lock().unwrap().pop_front();
        next.unwrap_or_else(|| {
            Ok(AckResponse {
                success: true,
                message: Some("任务已取消".into()),
                error: None,
            })
        })
    }

    async fn queue_stats(&self) -> Result<QueueStats, ApiError> {
        Ok(QueueStats::default())
    }

    async fn health(&self) -> Result<serde_json::Value, ApiError> {
        Ok(serde_json::json!({ "status": "ok" }))
    }

    async fn run_turn(&self, _request: &TurnRequest) -> Result<EditResponse, ApiError> {
        Err(ApiError::Decode("not scripted".into()))
    }

    async fn run_background(
        &self,
        _request: &BackgroundRequest,
    ) -> Result<EditResponse, ApiError> {
        Err(ApiError::Decode("not scripted".into()))
    }

    async fn run_jimeng_background(
        &self,
        _request: &BackgroundRequest,
    ) -> Result<EditResponse, ApiError> {
        Err(ApiError::Decode("not scripted".into()))
    }

    async fn optimize_image(&self, _request: &OptimizeRequest) -> Result<EditResponse, ApiError> {
        Err(ApiError::Decode("not scripted".into()))
    }

    async fn upload_image(&self, _request: &UploadRequest) -> Result<EditResponse, ApiError> {
        Err(ApiError::Decode("not scripted".into()))
    }

    async fn send_feedback(&self, _request: &FeedbackRequest) -> Result<AckResponse, ApiError> {
        Err(ApiError::Decode("not scripted".into()))
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn analysis() -> AnalysisResult {
    AnalysisResult {
        expression: "开心".into(),
        action: "站姿".into(),
        upper_garment: "红色夹克".into(),
        lower_garment: "牛仔裤".into(),
        headwear: "无".into(),
        held_item: String::new(),
        viewpoint: None,
    }
}

pub fn analyze_ok() -> AnalyzeResponse {
    AnalyzeResponse {
        success: true,
        compliant: Some(true),
        analysis: Some(analysis()),
        ..Default::default()
    }
}

pub fn started(job_id: &str) -> StartGenerateResponse {
    StartGenerateResponse {
        success: true,
        job_id: Some(job_id.into()),
        ..Default::default()
    }
}

pub fn queued(job_id: &str, position: i64, wait: f64) -> JobRecord {
    JobRecord {
        job_id: Some(job_id.into()),
        queue_position: position,
        estimated_wait: wait,
        ..JobRecord::with_status(JobStatus::Queued)
    }
}

pub fn running(job_id: &str) -> JobRecord {
    JobRecord {
        job_id: Some(job_id.into()),
        progress: Some(40.0),
        ..JobRecord::with_status(JobStatus::Running)
    }
}

pub fn succeeded(job_id: &str, images: &[&str]) -> JobRecord {
    JobRecord {
        job_id: Some(job_id.into()),
        images: Some(images.iter().map(|s| s.to_string()).collect()),
        progress: Some(100.0),
        ..JobRecord::with_status(JobStatus::Succeeded)
    }
}

pub fn failed(job_id: &str, error: &str, code: Option<&str>) -> JobRecord {
    JobRecord {
        job_id: Some(job_id.into()),
        error: Some(error.into()),
        code: code.map(str::to_string),
        ..JobRecord::with_status(JobStatus::Failed)
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub fn controller(api: &Arc<ScriptedApi>) -> (JobController, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (controller_with_store(api, store.clone()), store)
}

pub fn controller_with_store(api: &Arc<ScriptedApi>, store: Arc<dyn KeyValueStore>) -> JobController {
    JobController::new(
        api.clone(),
        store,
        ControllerConfig {
            poll_interval: POLL_INTERVAL,
            ..Default::default()
        },
    )
}

/// Drive the controller to preview for `text`.
pub async fn to_preview(api: &Arc<ScriptedApi>, controller: &JobController, text: &str) {
    api.push_analyze(Ok(analyze_ok()));
    controller.submit(text).await.unwrap();
}

/// Collect events until the tracked job finishes.
pub async fn events_until_finished(
    rx: &mut broadcast::Receiver<ControllerEvent>,
) -> Vec<ControllerEvent> {
    let collect = async {
        let mut events = Vec::new();
        loop {
            let event = rx.recv().await.expect("event channel closed");
            let done = matches!(event, ControllerEvent::JobFinished { .. });
            events.push(event);
            if done {
                return events;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(600), collect)
        .await
        .expect("job did not finish")
}
