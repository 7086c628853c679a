//! Domain types for the Joy IP generation client.
//!
//! Everything here is pure data and pure logic: the server-owned job
//! projection, the locally owned chat transcript, the user-editable
//! character analysis, generation modes, and the mapping from failures
//! to the text shown in the transcript. Network and storage live in
//! `joyip-client` and `joyip-store`.

pub mod analysis;
pub mod chat;
pub mod error;
pub mod generation;
pub mod job;
pub mod types;
