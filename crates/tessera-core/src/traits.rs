//! Core traits for tessera abstractions.
//!
//! These traits define the seams to the two external services the worker
//! talks to, enabling pluggable backends and deterministic tests.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    AdditiveUpdate, CreateEntityRequest, EntityRef, GraphEntity, LlmResponse,
};

/// A large language model generation backend.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Perform one request/response round-trip.
    ///
    /// Implementations are responsible for their own retry policy on
    /// transient failures; a returned error is final for the job.
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<LlmResponse>;
}

/// The graph service surface consumed by the extraction pipeline.
///
/// Entities are owned by the graph service; the worker only ever holds
/// transient references. Every method maps to one HTTP endpoint of the
/// service.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Fetch an entity with relationship previews expanded.
    async fn fetch_entity(&self, id: &str) -> Result<GraphEntity>;

    /// Fetch an out-of-band content payload for an entity.
    async fn fetch_content(&self, id: &str, key: &str) -> Result<String>;

    /// Exact-match lookup by `(label, type)` within a collection.
    ///
    /// `label` matching is case-insensitive on the service side; callers pass
    /// the normalized form. The index is eventually consistent: an empty
    /// result does not prove absence.
    async fn lookup_entities(
        &self,
        collection: &str,
        label: &str,
        entity_type: &str,
        limit: usize,
    ) -> Result<Vec<EntityRef>>;

    /// Create a new entity. With `sync_index`, the service indexes the record
    /// before responding.
    async fn create_entity(&self, req: &CreateEntityRequest) -> Result<EntityRef>;

    /// Best-effort delete, used only to resolve creation races.
    async fn delete_entity(&self, id: &str) -> Result<()>;

    /// Post one batch (max [`crate::defaults::UPDATE_BATCH_MAX`] entries) of
    /// additive updates. Returns the accepted count. The service upserts
    /// relationships by `(entity, predicate, peer)` and deep-merges property
    /// bags, so re-posting a batch is safe.
    async fn post_additive_updates(&self, updates: &[AdditiveUpdate]) -> Result<usize>;
}
