//! # tessera-worker
//!
//! The extraction job: contract, parsing, prompt composition, the pipeline
//! orchestrator, and the worker runner.
//!
//! This crate provides:
//! - The job contract ([`JobContext`], [`JobResult`], [`JobHandler`]) between
//!   the worker-host runtime and the pipeline
//! - [`parser`] - validation and classification of model operation output
//! - [`ExtractHandler`] - the five-step pipeline (fetch → LLM → parse →
//!   check-create → fire updates) returning the newly created entity ids
//! - [`Worker`] - bounded-concurrency job loop with event broadcast and
//!   graceful shutdown
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tessera_llm::GeminiBackend;
//! use tessera_worker::{ExtractHandler, Worker, WorkerConfig, WorkerEvent};
//!
//! let llm = Arc::new(GeminiBackend::from_env()?);
//! let worker = Worker::new(Arc::new(ExtractHandler::new(llm)), WorkerConfig::from_env());
//! let handle = worker.start();
//!
//! handle.submit(request).await?;
//! let mut events = handle.events();
//! while let Ok(event) = events.recv().await {
//!     if let WorkerEvent::JobCompleted { entry, .. } = event {
//!         println!("handoff: {}", entry["new_entity_ids"]);
//!         break;
//!     }
//! }
//! handle.shutdown().await?;
//! ```

pub mod extract;
pub mod handler;
pub mod parser;
pub mod prompt;
pub mod worker;

pub use extract::{ExtractHandler, GraphStoreFactory};
pub use handler::{JobContext, JobHandler, JobResult};
pub use worker::{Worker, WorkerConfig, WorkerEvent, WorkerHandle};
