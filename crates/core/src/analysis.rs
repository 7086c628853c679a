//! Structured character analysis returned by the analyze endpoint.
//!
//! The backend keys every dimension by its Chinese label; the Rust field
//! names are the English equivalents. Users may edit any dimension while
//! the analysis is in preview, before it is submitted with the job.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::CoreError;

/// Accessory values that start with another accessory's label
/// (e.g. `头戴：圣诞帽` in the held-item slot) were misfiled upstream.
static MISFILED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(上装|下装|头戴|手持)[：:]").expect("valid regex"));

/// Values meaning "nothing here".
const NONE_WORDS: &[&str] = &["无", "没有", "未提供", "不带", "不戴", "不拿"];

// ---------------------------------------------------------------------------
// Fields
// ---------------------------------------------------------------------------

/// One editable dimension of an [`AnalysisResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalysisField {
    Expression,
    Action,
    UpperGarment,
    LowerGarment,
    Headwear,
    HeldItem,
    Viewpoint,
}

impl AnalysisField {
    pub const ALL: [AnalysisField; 7] = [
        Self::Expression,
        Self::Action,
        Self::UpperGarment,
        Self::LowerGarment,
        Self::Headwear,
        Self::HeldItem,
        Self::Viewpoint,
    ];

    /// Wire key and display label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Expression => "表情",
            Self::Action => "动作",
            Self::UpperGarment => "上装",
            Self::LowerGarment => "下装",
            Self::Headwear => "头戴",
            Self::HeldItem => "手持",
            Self::Viewpoint => "视角",
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Self::Expression => "expression",
            Self::Action => "action",
            Self::UpperGarment => "upper",
            Self::LowerGarment => "lower",
            Self::Headwear => "headwear",
            Self::HeldItem => "held",
            Self::Viewpoint => "viewpoint",
        }
    }

    fn is_accessory(self) -> bool {
        matches!(
            self,
            Self::UpperGarment | Self::LowerGarment | Self::Headwear | Self::HeldItem
        )
    }
}

impl FromStr for AnalysisField {
    type Err = CoreError;

    /// Accepts either the English key or the Chinese label.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|f| f.label() == s || f.key().eq_ignore_ascii_case(s))
            .ok_or_else(|| CoreError::UnknownField(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// AnalysisResult
// ---------------------------------------------------------------------------

/// Character description split into named dimensions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(rename = "表情", default, deserialize_with = "lenient_string")]
    pub expression: String,
    #[serde(rename = "动作", default, deserialize_with = "lenient_string")]
    pub action: String,
    #[serde(rename = "上装", default, deserialize_with = "lenient_string")]
    pub upper_garment: String,
    #[serde(rename = "下装", default, deserialize_with = "lenient_string")]
    pub lower_garment: String,
    #[serde(rename = "头戴", default, deserialize_with = "lenient_string")]
    pub headwear: String,
    #[serde(rename = "手持", default, deserialize_with = "lenient_string")]
    pub held_item: String,
    /// Only present for 2D generation.
    #[serde(rename = "视角", default, skip_serializing_if = "Option::is_none")]
    pub viewpoint: Option<String>,
}

impl AnalysisResult {
    pub fn get(&self, field: AnalysisField) -> Option<&str> {
        match field {
            AnalysisField::Expression => Some(&self.expression),
            AnalysisField::Action => Some(&self.action),
            AnalysisField::UpperGarment => Some(&self.upper_garment),
            AnalysisField::LowerGarment => Some(&self.lower_garment),
            AnalysisField::Headwear => Some(&self.headwear),
            AnalysisField::HeldItem => Some(&self.held_item),
            AnalysisField::Viewpoint => self.viewpoint.as_deref(),
        }
    }

    pub fn set(&mut self, field: AnalysisField, value: impl Into<String>) {
        let value = value.into();
        match field {
            AnalysisField::Expression => self.expression = value,
            AnalysisField::Action => self.action = value,
            AnalysisField::UpperGarment => self.upper_garment = value,
            AnalysisField::LowerGarment => self.lower_garment = value,
            AnalysisField::Headwear => self.headwear = value,
            AnalysisField::HeldItem => self.held_item = value,
            AnalysisField::Viewpoint => self.viewpoint = Some(value),
        }
    }

    /// Blank out accessory values that are negations or were filed under
    /// the wrong label.
    pub fn sanitize(&mut self) {
        for field in AnalysisField::ALL.into_iter().filter(|f| f.is_accessory()) {
            let cleaned = sanitize_accessory(field, self.get(field).unwrap_or_default());
            self.set(field, cleaned);
        }
    }
}

impl std::fmt::Display for AnalysisResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for field in AnalysisField::ALL {
            if let Some(value) = self.get(field) {
                let shown = if value.is_empty() { "-" } else { value };
                writeln!(f, "{} ({}): {}", field.label(), field.key(), shown)?;
            }
        }
        Ok(())
    }
}

fn sanitize_accessory(field: AnalysisField, raw: &str) -> String {
    let value = raw.trim();
    if value.is_empty() || NONE_WORDS.contains(&value) {
        return String::new();
    }
    if let Some(caps) = MISFILED_RE.captures(value) {
        if &caps[1] != field.label() {
            return String::new();
        }
    }
    let crossed = match field {
        AnalysisField::HeldItem => value.contains(AnalysisField::Headwear.label()),
        AnalysisField::Headwear => value.contains(AnalysisField::HeldItem.label()),
        _ => false,
    };
    if crossed {
        return String::new();
    }
    value.to_string()
}

/// Accept `null` where a string is expected.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_chinese_keys() {
        let json = serde_json::json!({
            "表情": "开心",
            "动作": "站姿",
            "上装": "红色夹克",
            "下装": null,
            "头戴": "",
            "手持": "礼物盒"
        });
        let analysis: AnalysisResult = serde_json::from_value(json).unwrap();
        assert_eq!(analysis.expression, "开心");
        assert_eq!(analysis.upper_garment, "红色夹克");
        assert_eq!(analysis.lower_garment, "");
        assert_eq!(analysis.viewpoint, None);
    }

    #[test]
    fn viewpoint_omitted_when_absent() {
        let value = serde_json::to_value(AnalysisResult::default()).unwrap();
        assert!(value.get("视角").is_none());
        assert_eq!(value["表情"], "");
    }

    #[test]
    fn field_parses_from_key_or_label() {
        assert_eq!("表情".parse::<AnalysisField>().unwrap(), AnalysisField::Expression);
        assert_eq!("Held".parse::<AnalysisField>().unwrap(), AnalysisField::HeldItem);
        assert!("hat".parse::<AnalysisField>().is_err());
    }

    #[test]
    fn set_and_get_round_trip_each_field() {
        let mut analysis = AnalysisResult::default();
        for field in AnalysisField::ALL {
            analysis.set(field, field.key());
            assert_eq!(analysis.get(field), Some(field.key()));
        }
    }

    #[test]
    fn sanitize_blanks_negations() {
        let mut analysis = AnalysisResult {
            headwear: "不戴".into(),
            held_item: " 无 ".into(),
            ..Default::default()
        };
        analysis.sanitize();
        assert_eq!(analysis.headwear, "");
        assert_eq!(analysis.held_item, "");
    }

    #[test]
    fn sanitize_blanks_misfiled_values() {
        let mut analysis = AnalysisResult {
            held_item: "头戴：圣诞帽".into(),
            upper_garment: "上装: 红色夹克".into(),
            ..Default::default()
        };
        analysis.sanitize();
        assert_eq!(analysis.held_item, "");
        // Own label prefix is not a misfiling.
        assert_eq!(analysis.upper_garment, "上装: 红色夹克");
    }

    #[test]
    fn sanitize_blanks_crossed_accessories() {
        let mut analysis = AnalysisResult {
            headwear: "手持魔法棒".into(),
            held_item: "魔法棒".into(),
            expression: "无".into(),
            ..Default::default()
        };
        analysis.sanitize();
        assert_eq!(analysis.headwear, "");
        assert_eq!(analysis.held_item, "魔法棒");
        // Non-accessory dimensions are left alone.
        assert_eq!(analysis.expression, "无");
    }
}
