//! Chat transcript and the persisted chat-page state.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::Timestamp;

/// Input shown when nothing has been typed or selected yet.
pub const DEFAULT_INPUT: &str = "我想生成一个 [表情] ， [动作] ，[场景] 的joy";

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    User,
    Assistant,
}

/// One transcript entry. Never modified after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
    /// Serialized as an RFC 3339 string.
    pub timestamp: Timestamp,
}

impl ChatMessage {
    fn new(kind: MessageKind, content: String, images: Option<Vec<String>>) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            kind,
            content,
            images,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageKind::User, content.into(), None)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageKind::Assistant, content.into(), None)
    }

    pub fn assistant_with_images(content: impl Into<String>, images: Vec<String>) -> Self {
        Self::new(MessageKind::Assistant, content.into(), Some(images))
    }

    pub fn images(&self) -> &[String] {
        self.images.as_deref().unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Where the chat page is in the analyze / preview / generate flow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatStatus {
    #[default]
    Idle,
    Analyzing,
    Preview,
    Generating,
}

impl std::fmt::Display for ChatStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Analyzing => "analyzing",
            Self::Preview => "preview",
            Self::Generating => "generating",
        })
    }
}

// ---------------------------------------------------------------------------
// Presets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresetKind {
    Expression,
    Action,
    Style,
}

impl FromStr for PresetKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "expression" | "表情" => Ok(Self::Expression),
            "action" | "动作" => Ok(Self::Action),
            "style" | "场景" => Ok(Self::Style),
            other => Err(CoreError::UnknownPreset(other.to_string())),
        }
    }
}

/// Quick-pick values that fill the input template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedPresets {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

impl SelectedPresets {
    pub fn select(&mut self, kind: PresetKind, value: impl Into<String>) {
        let value = Some(value.into());
        match kind {
            PresetKind::Expression => self.expression = value,
            PresetKind::Action => self.action = value,
            PresetKind::Style => self.style = value,
        }
    }

    /// Fill the input template, keeping placeholders for unset presets.
    pub fn build_input(&self) -> String {
        let pick = |v: &Option<String>, placeholder: &'static str| -> String {
            v.as_deref()
                .filter(|s| !s.is_empty())
                .unwrap_or(placeholder)
                .to_string()
        };
        format!(
            "我想生成一个 {} ， {} ，{} 的joy",
            pick(&self.expression, "[表情]"),
            pick(&self.action, "[动作]"),
            pick(&self.style, "[场景]"),
        )
    }
}

// ---------------------------------------------------------------------------
// Persisted page state
// ---------------------------------------------------------------------------

/// Everything about the chat page that survives a restart.
///
/// An in-flight job is deliberately not part of this record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatState {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default = "default_input")]
    pub input: String,
    #[serde(default)]
    pub selected_presets: SelectedPresets,
    #[serde(default)]
    pub scroll_top: f64,
}

impl Default for ChatState {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            input: default_input(),
            selected_presets: SelectedPresets::default(),
            scroll_top: 0.0,
        }
    }
}

impl ChatState {
    /// Most recent assistant message that carries images.
    pub fn last_images(&self) -> Option<&[String]> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.kind == MessageKind::Assistant && !m.images().is_empty())
            .map(ChatMessage::images)
    }
}

fn default_input() -> String {
    DEFAULT_INPUT.to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_serializes_with_type_and_string_timestamp() {
        let msg = ChatMessage::assistant_with_images("done", vec!["/img/1.png".into()]);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "assistant");
        assert!(value["timestamp"].is_string());
        assert_eq!(value["images"][0], "/img/1.png");

        let back: ChatMessage = serde_json::from_value(value).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn user_message_has_no_images_field() {
        let value = serde_json::to_value(ChatMessage::user("hi")).unwrap();
        assert!(value.get("images").is_none());
    }

    #[test]
    fn message_ids_are_unique() {
        let a = ChatMessage::user("a");
        let b = ChatMessage::user("b");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn preset_input_keeps_placeholders() {
        let mut presets = SelectedPresets::default();
        assert_eq!(presets.build_input(), DEFAULT_INPUT);

        presets.select(PresetKind::Expression, "开心");
        presets.select(PresetKind::Style, "圣诞节");
        assert_eq!(presets.build_input(), "我想生成一个 开心 ， [动作] ，圣诞节 的joy");
    }

    #[test]
    fn chat_state_tolerates_missing_fields() {
        let state: ChatState = serde_json::from_str("{}").unwrap();
        assert_eq!(state, ChatState::default());
    }

    #[test]
    fn chat_state_uses_camel_case_keys() {
        let value = serde_json::to_value(ChatState::default()).unwrap();
        assert!(value.get("selectedPresets").is_some());
        assert!(value.get("scrollTop").is_some());
    }

    #[test]
    fn last_images_skips_text_only_messages() {
        let mut state = ChatState::default();
        state
            .messages
            .push(ChatMessage::assistant_with_images("ok", vec!["/a.png".into()]));
        state.messages.push(ChatMessage::assistant("任务已取消"));
        assert_eq!(state.last_images(), Some(&["/a.png".to_string()][..]));
    }
}
