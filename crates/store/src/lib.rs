//! Local persistence for the chat page.
//!
//! - [`KeyValueStore`] is the storage seam: string values under string
//!   keys, with a file-backed ([`FileStore`]) and an in-memory
//!   ([`MemoryStore`]) implementation.
//! - [`ChatStateRepo`] reads and writes the single persisted chat record.

pub mod chat_state;
pub mod kv;

pub use chat_state::{ChatStateRepo, CHAT_STATE_KEY};
pub use kv::{FileStore, KeyValueStore, MemoryStore, StoreError};
