//! Repository for the persisted [`ChatState`] record.

use joyip_core::chat::ChatState;

use crate::kv::{KeyValueStore, StoreError};

/// Key under which the chat page state is stored.
pub const CHAT_STATE_KEY: &str = "joy_ip_chat_state";

/// Load/save helpers for the chat record.
pub struct ChatStateRepo;

impl ChatStateRepo {
    /// Load the persisted chat state.
    ///
    /// A missing record yields the defaults. A record that cannot be
    /// read or decoded is logged and also yields the defaults; the next
    /// save overwrites it.
    pub fn load(store: &dyn KeyValueStore) -> ChatState {
        let raw = match store.get(CHAT_STATE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return ChatState::default(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read chat state, starting fresh");
                return ChatState::default();
            }
        };

        match serde_json::from_str::<ChatState>(&raw) {
            Ok(state) => {
                tracing::debug!(messages = state.messages.len(), "Restored chat state");
                state
            }
            Err(e) => {
                tracing::warn!(error = %e, "Persisted chat state is corrupt, starting fresh");
                ChatState::default()
            }
        }
    }

    /// Serialize and write the full chat state.
    pub fn save(store: &dyn KeyValueStore, state: &ChatState) -> Result<(), StoreError> {
        let raw = serde_json::to_string(state)?;
        store.set(CHAT_STATE_KEY, &raw)
    }

    pub fn clear(store: &dyn KeyValueStore) -> Result<(), StoreError> {
        store.remove(CHAT_STATE_KEY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use joyip_core::chat::{ChatMessage, PresetKind};

    use super::*;
    use crate::kv::{FileStore, MemoryStore};

    fn sample_state() -> ChatState {
        let mut state = ChatState::default();
        state.messages.push(ChatMessage::user("红色夹克的角色"));
        state
            .messages
            .push(ChatMessage::assistant_with_images("已为您生成图片", vec!["/img/1.png".into()]));
        state.input = String::new();
        state.selected_presets.select(PresetKind::Action, "跑步");
        state.scroll_top = 420.0;
        state
    }

    #[test]
    fn load_without_record_returns_defaults() {
        let store = MemoryStore::new();
        assert_eq!(ChatStateRepo::load(&store), ChatState::default());
    }

    #[test]
    fn saved_state_is_restored_by_a_new_store_instance() {
        let dir = tempfile::tempdir().unwrap();
        let state = sample_state();
        {
            let store = FileStore::open(dir.path()).unwrap();
            ChatStateRepo::save(&store, &state).unwrap();
        }

        let reopened = FileStore::open(dir.path()).unwrap();
        let restored = ChatStateRepo::load(&reopened);
        assert_eq!(restored, state);
        assert_eq!(restored.messages[1].images(), ["/img/1.png"]);
    }

    #[test]
    fn corrupt_record_falls_back_to_defaults() {
        let store = MemoryStore::new();
        store.set(CHAT_STATE_KEY, "{not json").unwrap();
        assert_eq!(ChatStateRepo::load(&store), ChatState::default());
    }

    #[test]
    fn persisted_timestamps_are_strings() {
        let store = MemoryStore::new();
        ChatStateRepo::save(&store, &sample_state()).unwrap();
        let raw = store.get(CHAT_STATE_KEY).unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(value["messages"][0]["timestamp"].is_string());
        assert_eq!(value["selectedPresets"]["action"], "跑步");
    }

    #[test]
    fn clear_removes_the_record() {
        let store = MemoryStore::new();
        ChatStateRepo::save(&store, &sample_state()).unwrap();
        ChatStateRepo::clear(&store).unwrap();
        assert_eq!(store.get(CHAT_STATE_KEY).unwrap(), None);
    }
}
