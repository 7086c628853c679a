//! Request and response bodies of the backend HTTP API.
//!
//! Response types are lenient: every field the backend may omit has a
//! default, so a partially filled body still decodes and the caller
//! decides what is missing.

use joyip_core::analysis::AnalysisResult;
use joyip_core::generation::{FailureKind, GenerationMode};
use joyip_core::job::{JobRecord, QueueStats};
use joyip_core::types::JobId;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Analyze
// ---------------------------------------------------------------------------

/// Body of `POST /api/analyze`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub requirement: String,
    pub mode: GenerationMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perspective: Option<String>,
}

/// Response of `POST /api/analyze`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub analysis: Option<AnalysisResult>,
    #[serde(default)]
    pub compliant: Option<bool>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl AnalyzeResponse {
    pub fn failure_kind(&self) -> FailureKind {
        FailureKind::from_analysis(self.code.as_deref(), self.compliant)
    }

    /// Server-provided explanation, preferring `reason` over `error`.
    pub fn failure_detail(&self) -> Option<&str> {
        self.reason.as_deref().or(self.error.as_deref())
    }
}

// ---------------------------------------------------------------------------
// Start generation
// ---------------------------------------------------------------------------

/// Body of `POST /api/start_generate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartGenerateRequest {
    pub requirement: String,
    /// The analysis as confirmed (and possibly edited) by the user.
    pub analysis: AnalysisResult,
    pub mode: GenerationMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perspective: Option<String>,
}

/// Response of `POST /api/start_generate`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StartGenerateResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub job_id: Option<JobId>,
    #[serde(default)]
    pub queue_position: i64,
    #[serde(default)]
    pub estimated_wait: f64,
    #[serde(default)]
    pub queue_stats: Option<QueueStats>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl StartGenerateResponse {
    pub fn failure_kind(&self) -> FailureKind {
        FailureKind::from_code(self.code.as_deref())
    }
}

// ---------------------------------------------------------------------------
// Job status / cancel
// ---------------------------------------------------------------------------

/// Response of `GET /api/job/{id}/status`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobStatusResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub job: Option<JobRecord>,
    #[serde(default)]
    pub error: Option<String>,
}

impl JobStatusResponse {
    pub fn found(job: JobRecord) -> Self {
        Self {
            success: true,
            job: Some(job),
            error: None,
        }
    }
}

/// Plain acknowledgement, as returned by cancel and feedback.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AckResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Response of `GET /api/queue/stats`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStatsResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub stats: QueueStats,
}

// ---------------------------------------------------------------------------
// Image edits
// ---------------------------------------------------------------------------

/// Body of `POST /api/run-turn` (rotate the character to another angle).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    pub image_url: String,
    pub action: String,
}

/// Body of `POST /api/run-banana` (composite onto a generated background).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundRequest {
    pub tag_img_url: String,
    pub background_text: String,
}

/// Body of `POST /api/run-banana-pro-img-jd` (refine the character from a
/// keyword).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizeRequest {
    pub image_url: String,
    pub prompt: String,
}

/// Name the backend gives uploaded reference images.
pub const DEFAULT_UPLOAD_NAME: &str = "tag_img";

/// Body of `POST /api/upload-image`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    /// Local path or URL of the image to host.
    pub image: String,
    pub custom_name: String,
}

impl UploadRequest {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            custom_name: DEFAULT_UPLOAD_NAME.to_string(),
        }
    }
}

/// Response shared by the image edit and upload endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub result_images: Vec<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl EditResponse {
    /// The produced image: `url` when set, otherwise the first result.
    pub fn image_url(&self) -> Option<&str> {
        self.url
            .as_deref()
            .or_else(|| self.result_images.first().map(String::as_str))
    }

    /// Why no image came back. Some scripts only fill `message`.
    pub fn failure_detail(&self) -> Option<&str> {
        self.error.as_deref().or(self.message.as_deref())
    }
}

// ---------------------------------------------------------------------------
// Feedback
// ---------------------------------------------------------------------------

/// Body of `POST /api/feedback`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRequest {
    pub message: String,
    /// Optional contact details; sent empty when absent.
    #[serde(default)]
    pub contact: String,
}

// ---------------------------------------------------------------------------
// Error envelope
// ---------------------------------------------------------------------------

/// JSON body the backend sends alongside non-2xx statuses.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ErrorEnvelope {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analyze_request_omits_perspective_for_3d() {
        let req = AnalyzeRequest {
            requirement: "红色夹克的角色".into(),
            mode: GenerationMode::ThreeD,
            perspective: None,
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["mode"], "3D");
        assert!(value.get("perspective").is_none());
    }

    #[test]
    fn analyze_failure_prefers_reason() {
        let resp: AnalyzeResponse = serde_json::from_value(serde_json::json!({
            "success": false,
            "compliant": false,
            "reason": "包含违规词",
            "error": "other"
        }))
        .unwrap();
        assert_eq!(resp.failure_detail(), Some("包含违规词"));
        assert_eq!(resp.failure_kind(), FailureKind::Compliance);
    }

    #[test]
    fn start_response_with_queue_stats() {
        let resp: StartGenerateResponse = serde_json::from_value(serde_json::json!({
            "success": true,
            "job_id": "abc123",
            "queue_position": 2,
            "estimated_wait": 90.0,
            "queue_stats": {
                "running_count": 3,
                "waiting_count": 2,
                "max_concurrent": 3,
                "avg_duration": 45.0
            }
        }))
        .unwrap();
        assert_eq!(resp.job_id.as_deref(), Some("abc123"));
        assert_eq!(resp.queue_stats.unwrap().running_count, 3);
    }

    #[test]
    fn start_request_carries_analysis_with_chinese_keys() {
        let req = StartGenerateRequest {
            requirement: "x".into(),
            analysis: AnalysisResult {
                expression: "开心".into(),
                ..Default::default()
            },
            mode: GenerationMode::TwoD,
            perspective: Some("侧视角".into()),
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["analysis"]["表情"], "开心");
        assert_eq!(value["perspective"], "侧视角");
    }

    #[test]
    fn edit_requests_use_camel_case() {
        let value = serde_json::to_value(BackgroundRequest {
            tag_img_url: "/img/1.png".into(),
            background_text: "雪山".into(),
        })
        .unwrap();
        assert_eq!(value["tagImgUrl"], "/img/1.png");
        assert_eq!(value["backgroundText"], "雪山");
    }

    #[test]
    fn upload_and_optimize_use_backend_names() {
        let value = serde_json::to_value(UploadRequest::new("/generated_images/a.png")).unwrap();
        assert_eq!(value["image"], "/generated_images/a.png");
        assert_eq!(value["customName"], "tag_img");

        let value = serde_json::to_value(OptimizeRequest {
            image_url: "https://img.example/a.png".into(),
            prompt: "更可爱".into(),
        })
        .unwrap();
        assert_eq!(value["imageUrl"], "https://img.example/a.png");
        assert_eq!(value["prompt"], "更可爱");
    }

    #[test]
    fn edit_failure_detail_falls_back_to_message() {
        let resp: EditResponse = serde_json::from_value(serde_json::json!({
            "success": false,
            "message": "未检测到新增文件，可能脚本未生成输出",
            "resultImages": []
        }))
        .unwrap();
        assert_eq!(resp.image_url(), None);
        assert_eq!(
            resp.failure_detail(),
            Some("未检测到新增文件，可能脚本未生成输出")
        );
    }

    #[test]
    fn edit_response_falls_back_to_result_images() {
        let resp: EditResponse = serde_json::from_value(serde_json::json!({
            "success": true,
            "resultImages": ["/generated_images/bg.png"]
        }))
        .unwrap();
        assert_eq!(resp.image_url(), Some("/generated_images/bg.png"));
    }
}
