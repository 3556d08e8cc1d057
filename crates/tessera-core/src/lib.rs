//! # tessera-core
//!
//! Core types, traits, and text utilities for the tessera extraction worker.
//!
//! This crate provides the foundational data structures, the error taxonomy,
//! default constants, the structured-logging field schema, and the pure text
//! functions (label normalization, quote extraction) that the other tessera
//! crates depend on.

pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod text;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use text::{extract_quote, normalize_label, normalize_whitespace};
pub use traits::{GraphStore, LlmBackend};
