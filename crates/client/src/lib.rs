//! HTTP client for the Joy IP generation backend.
//!
//! [`GenerationApi`] is the seam the job controller talks to;
//! [`HttpGenerationApi`] implements it over `reqwest`. Request and
//! response bodies live in [`types`].

pub mod api;
pub mod types;

pub use api::{ApiError, ApiTimeouts, GenerationApi, HttpGenerationApi};
