//! Generation modes, failure classification, and transcript texts.
//!
//! Compliance rejections are recognised from structured fields only (the
//! `code` sentinel and the analyze `compliant` flag). Free-text error
//! messages are shown to the user but never inspected.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Modes
// ---------------------------------------------------------------------------

/// Default viewing angle for 2D generation.
pub const DEFAULT_PERSPECTIVE: &str = "正视角";

/// Which generation pipeline the backend should run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GenerationMode {
    #[serde(rename = "2D")]
    TwoD,
    #[default]
    #[serde(rename = "3D")]
    ThreeD,
}

impl GenerationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TwoD => "2D",
            Self::ThreeD => "3D",
        }
    }
}

impl std::fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GenerationMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "2D" => Ok(Self::TwoD),
            "3D" => Ok(Self::ThreeD),
            other => Err(CoreError::UnknownMode(other.to_string())),
        }
    }
}

/// Mode plus perspective, as sent with analyze and start requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationSettings {
    pub mode: GenerationMode,
    pub perspective: String,
}

impl GenerationSettings {
    /// The perspective is only meaningful to the 2D pipeline.
    pub fn perspective_param(&self) -> Option<&str> {
        match self.mode {
            GenerationMode::TwoD => Some(self.perspective.as_str()),
            GenerationMode::ThreeD => None,
        }
    }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            mode: GenerationMode::default(),
            perspective: DEFAULT_PERSPECTIVE.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure classification
// ---------------------------------------------------------------------------

/// Error code the backend uses for moderation rejections.
pub const COMPLIANCE_CODE: &str = "COMPLIANCE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The request was rejected by content moderation.
    Compliance,
    Generic,
}

impl FailureKind {
    pub fn from_code(code: Option<&str>) -> Self {
        match code {
            Some(COMPLIANCE_CODE) => Self::Compliance,
            _ => Self::Generic,
        }
    }

    /// Analyze responses carry an explicit `compliant` flag in addition
    /// to the code.
    pub fn from_analysis(code: Option<&str>, compliant: Option<bool>) -> Self {
        if compliant == Some(false) {
            Self::Compliance
        } else {
            Self::from_code(code)
        }
    }

    pub fn is_compliance(self) -> bool {
        self == Self::Compliance
    }
}

// ---------------------------------------------------------------------------
// Transcript texts
// ---------------------------------------------------------------------------

pub const COMPLIANCE_REJECTION_TEXT: &str = "输入内容不符合规范，请重新描述你的需求";
pub const GENERATED_TEXT: &str = "已为您生成图片";
pub const CANCELLED_TEXT: &str = "任务已取消";
pub const UNKNOWN_ERROR_TEXT: &str = "未知错误";
pub const START_FAILED_TEXT: &str = "启动任务失败";
/// Detail for a request whose caller went away before it completed.
pub const INTERRUPTED_TEXT: &str = "请求已中断";

/// The request phase a failure happened in; selects the wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Analyze,
    Generate,
}

impl Phase {
    pub fn timeout_text(self) -> &'static str {
        match self {
            Self::Analyze => "分析超时，请稍后重试",
            Self::Generate => "生成超时: 图片生成过程较长，请稍后重试。",
        }
    }

    /// Text for a failure reported by the server.
    ///
    /// Compliance rejections always produce [`COMPLIANCE_REJECTION_TEXT`]
    /// regardless of `detail`.
    pub fn failure_text(self, kind: FailureKind, detail: Option<&str>) -> String {
        if kind.is_compliance() {
            return COMPLIANCE_REJECTION_TEXT.to_string();
        }
        let detail = detail
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or(UNKNOWN_ERROR_TEXT);
        match self {
            Self::Analyze => format!("分析失败: {detail}"),
            Self::Generate => format!("生成失败: {detail}"),
        }
    }

    /// Text for a transport-level error that is neither a timeout nor a
    /// server rejection.
    pub fn transport_text(self, error: &dyn std::fmt::Display) -> String {
        format!("错误: {error}")
    }
}

/// Human-readable estimate for a queue wait.
pub fn format_wait_time(seconds: f64) -> String {
    if !seconds.is_finite() || seconds <= 0.0 {
        return "即将开始".to_string();
    }
    if seconds < 60.0 {
        return format!("约 {} 秒", seconds.ceil() as u64);
    }
    format!("约 {} 分钟", (seconds / 60.0).ceil() as u64)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
