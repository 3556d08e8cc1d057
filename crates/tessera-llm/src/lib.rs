//! # tessera-llm
//!
//! LLM generation backend for the tessera extraction worker.
//!
//! This crate provides:
//! - [`GeminiBackend`] - the production HTTP backend with per-attempt
//!   timeouts, retry with exponential backoff on transient failures, and
//!   token usage + cost accounting
//! - [`MockLlmBackend`] - a deterministic in-process backend for tests
//!
//! The backend trait itself ([`tessera_core::LlmBackend`]) lives in
//! tessera-core so downstream crates can depend on the seam without pulling
//! in HTTP machinery.

pub mod gemini;
pub mod mock;

pub use gemini::{GeminiBackend, GeminiConfig};
pub use mock::MockLlmBackend;
