//! # tessera-graph
//!
//! Graph service client and the write-side machinery of the extraction
//! pipeline.
//!
//! This crate provides:
//! - [`GraphClient`] - HTTP client for the graph service's entity, lookup,
//!   and additive-update endpoints
//! - [`CheckCreateEngine`] - the race-resolving idempotent upsert protocol
//!   with its bounded-concurrency batch wrapper
//! - [`build_updates`] - consolidation of parsed operations into additive
//!   update batches with connectivity and provenance relationships
//! - [`MemoryGraphStore`] - deterministic in-memory store for tests

pub mod check_create;
pub mod client;
pub mod memory;
pub mod update_builder;

pub use check_create::{CheckCreateConfig, CheckCreateEngine};
pub use client::{GraphClient, GraphConfig};
pub use memory::MemoryGraphStore;
pub use update_builder::{build_updates, UpdateBuilderInput};
