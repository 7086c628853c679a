//! REST client for the generation backend.
//!
//! Wraps the analyze, job submission, status, cancellation, queue,
//! image-edit, upload and feedback endpoints using [`reqwest`]. Each call carries its own
//! timeout because analysis and edits can take minutes while status
//! checks should fail fast.

use std::time::Duration;

use async_trait::async_trait;
use joyip_core::job::QueueStats;

use crate::types::{
    AckResponse, AnalyzeRequest, AnalyzeResponse, BackgroundRequest, EditResponse, ErrorEnvelope,
    FeedbackRequest, JobStatusResponse, OptimizeRequest, QueueStatsResponse,
    StartGenerateRequest, StartGenerateResponse, TurnRequest, UploadRequest,
};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Errors from the backend API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request did not complete within its timeout.
    #[error("Request timed out")]
    Timeout,

    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[source] reqwest::Error),

    /// The backend answered with a non-2xx status and a JSON error body.
    #[error("Backend rejected request ({status}): {message}")]
    Rejected {
        status: u16,
        /// Structured error kind, e.g. `COMPLIANCE`.
        code: Option<String>,
        message: String,
    },

    /// The backend answered with a non-2xx status and an unrecognised body.
    #[error("Backend API error ({status}): {body}")]
    Status { status: u16, body: String },

    /// The response body could not be decoded.
    #[error("Invalid response body: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Request(e)
        }
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Operations the job controller needs from the backend.
#[async_trait]
pub trait GenerationApi: Send + Sync {
    /// Turn a free-text requirement into a structured analysis.
    async fn analyze(&self, request: &AnalyzeRequest) -> Result<AnalyzeResponse, ApiError>;

    /// Queue a generation job for a confirmed analysis.
    async fn start_generate(
        &self,
        request: &StartGenerateRequest,
    ) -> Result<StartGenerateResponse, ApiError>;

    /// Fetch the current state of a job.
    async fn job_status(&self, job_id: &str) -> Result<JobStatusResponse, ApiError>;

    /// Ask the backend to cancel a job. Best effort.
    async fn cancel_job(&self, job_id: &str) -> Result<AckResponse, ApiError>;

    async fn queue_stats(&self) -> Result<QueueStats, ApiError>;

    async fn health(&self) -> Result<serde_json::Value, ApiError>;

    /// Re-render a generated image from another angle.
    async fn run_turn(&self, request: &TurnRequest) -> Result<EditResponse, ApiError>;

    /// Composite a generated image onto a described background.
    async fn run_background(&self, request: &BackgroundRequest)
        -> Result<EditResponse, ApiError>;

    /// Same composite, rendered by the Jimeng engine.
    async fn run_jimeng_background(
        &self,
        request: &BackgroundRequest,
    ) -> Result<EditResponse, ApiError>;

    /// Refine the character in an image from a keyword.
    async fn optimize_image(&self, request: &OptimizeRequest) -> Result<EditResponse, ApiError>;

    /// Host an image so the edit engines can fetch it by URL.
    async fn upload_image(&self, request: &UploadRequest) -> Result<EditResponse, ApiError>;

    async fn send_feedback(&self, request: &FeedbackRequest) -> Result<AckResponse, ApiError>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// Per-endpoint request timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiTimeouts {
    pub analyze: Duration,
    pub start: Duration,
    pub status: Duration,
    pub edit: Duration,
    /// Cancel, queue stats and health.
    pub default: Duration,
}

impl Default for ApiTimeouts {
    fn default() -> Self {
        Self {
            analyze: Duration::from_secs(180),
            start: Duration::from_secs(60),
            status: Duration::from_secs(60),
            edit: Duration::from_secs(120),
            default: Duration::from_secs(30),
        }
    }
}

/// HTTP client for one backend instance.
pub struct HttpGenerationApi {
    client: reqwest::Client,
    api_url: String,
    timeouts: ApiTimeouts,
}

impl HttpGenerationApi {
    /// Create a client for the backend at `api_url`, e.g. `http://host:28888`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            api_url,
            timeouts: ApiTimeouts::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: ApiTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code.
    ///
    /// Non-2xx responses whose body is the backend's JSON error envelope
    /// become [`ApiError::Rejected`]; anything else becomes
    /// [`ApiError::Status`] with the raw body.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        tracing::debug!(status = status.as_u16(), "Backend returned error status");

        match serde_json::from_str::<ErrorEnvelope>(&body) {
            Ok(envelope) if envelope.error.is_some() || envelope.code.is_some() => {
                Err(ApiError::Rejected {
                    status: status.as_u16(),
                    code: envelope.code,
                    message: envelope.error.or(envelope.reason).unwrap_or_default(),
                })
            }
            _ => Err(ApiError::Status {
                status: status.as_u16(),
                body,
            }),
        }
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    async fn post_json<B, T>(&self, path: &str, body: &B, timeout: Duration) -> Result<T, ApiError>
    where
        B: serde::Serialize + ?Sized + Sync,
        T: serde::de::DeserializeOwned,
    {
        let response = self
            .client
            .post(self.url(path))
            .timeout(timeout)
            .json(body)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    async fn get_json<T>(&self, path: &str, timeout: Duration) -> Result<T, ApiError>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = self
            .client
            .get(self.url(path))
            .timeout(timeout)
            .send()
            .await?;

        Self::parse_response(response).await
    }
}

#[async_trait]
impl GenerationApi for HttpGenerationApi {
    async fn analyze(&self, request: &AnalyzeRequest) -> Result<AnalyzeResponse, ApiError> {
        self.post_json("/api/analyze", request, self.timeouts.analyze)
            .await
    }

    async fn start_generate(
        &self,
        request: &StartGenerateRequest,
    ) -> Result<StartGenerateResponse, ApiError> {
        self.post_json("/api/start_generate", request, self.timeouts.start)
            .await
    }

    async fn job_status(&self, job_id: &str) -> Result<JobStatusResponse, ApiError> {
        self.get_json(&format!("/api/job/{job_id}/status"), self.timeouts.status)
            .await
    }

    async fn cancel_job(&self, job_id: &str) -> Result<AckResponse, ApiError> {
        let response = self
            .client
            .post(self.url(&format!("/api/job/{job_id}/cancel")))
            .timeout(self.timeouts.default)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    async fn queue_stats(&self) -> Result<QueueStats, ApiError> {
        let response: QueueStatsResponse = self
            .get_json("/api/queue/stats", self.timeouts.default)
            .await?;
        Ok(response.stats)
    }

    async fn health(&self) -> Result<serde_json::Value, ApiError> {
        self.get_json("/api/health", self.timeouts.default).await
    }

    async fn run_turn(&self, request: &TurnRequest) -> Result<EditResponse, ApiError> {
        self.post_json("/api/run-turn", request, self.timeouts.edit)
            .await
    }

    async fn run_background(
        &self,
        request: &BackgroundRequest,
    ) -> Result<EditResponse, ApiError> {
        self.post_json("/api/run-banana", request, self.timeouts.edit)
            .await
    }

    async fn run_jimeng_background(
        &self,
        request: &BackgroundRequest,
    ) -> Result<EditResponse, ApiError> {
        self.post_json("/api/run-jimeng4", request, self.timeouts.edit)
            .await
    }

    async fn optimize_image(&self, request: &OptimizeRequest) -> Result<EditResponse, ApiError> {
        self.post_json("/api/run-banana-pro-img-jd", request, self.timeouts.edit)
            .await
    }

    async fn upload_image(&self, request: &UploadRequest) -> Result<EditResponse, ApiError> {
        self.post_json("/api/upload-image", request, self.timeouts.default)
            .await
    }

    async fn send_feedback(&self, request: &FeedbackRequest) -> Result<AckResponse, ApiError> {
        self.post_json("/api/feedback", request, self.timeouts.default)
            .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_trimmed() {
        let api = HttpGenerationApi::new("http://localhost:28888/");
        assert_eq!(api.api_url(), "http://localhost:28888");
        assert_eq!(api.url("/api/health"), "http://localhost:28888/api/health");
    }

    #[test]
    fn default_timeouts() {
        let t = ApiTimeouts::default();
        assert_eq!(t.analyze, Duration::from_secs(180));
        assert_eq!(t.start, Duration::from_secs(60));
        assert_eq!(t.status, Duration::from_secs(60));
    }

    #[test]
    fn rejected_error_display() {
        let err = ApiError::Rejected {
            status: 400,
            code: Some("COMPLIANCE".into()),
            message: "内容不合规".into(),
        };
        assert_eq!(err.to_string(), "Backend rejected request (400): 内容不合规");
    }
}
