//! Job lifecycle controller for the Joy IP chat flow.
//!
//! [`JobController`] owns the chat page state and drives one generation
//! at a time through `idle -> analyzing -> preview -> generating -> idle`:
//!
//! - analysis of the free-text requirement and an editable preview,
//! - job submission and status polling on a fixed interval,
//! - user cancellation and teardown of the poll task,
//! - exactly one transcript message per job outcome, persisted locally.
//!
//! State changes are broadcast as [`ControllerEvent`]s. Call
//! [`JobController::subscribe`] to receive them.

pub mod controller;
pub mod events;
mod poller;
pub mod session;

pub use controller::{ControllerConfig, ControllerError, ControllerSnapshot, JobController};
pub use events::ControllerEvent;
