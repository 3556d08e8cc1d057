//! Core data models for tessera.
//!
//! These types are shared across all tessera crates: the graph service wire
//! shapes, the operation variants emitted by the model, and the job contract
//! with the worker host.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use uuid::Uuid;

// =============================================================================
// GRAPH ENTITIES
// =============================================================================

/// Direction of a relationship from the subject entity's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// A relationship attached to a fetched entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRelationship {
    pub predicate: String,
    pub peer: String,
    pub direction: Direction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer_label: Option<String>,
    #[serde(default)]
    pub properties: Map<String, JsonValue>,
    /// Compact peer snapshot returned by `expand=relationships:preview`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_preview: Option<JsonValue>,
}

/// An entity fetched from the graph service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEntity {
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default)]
    pub properties: Map<String, JsonValue>,
    #[serde(default)]
    pub relationships: Vec<EntityRelationship>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Minimal `{id, created_at}` reference returned by lookup and create.
///
/// `created_at` is observable and monotonic per entity; together with the id
/// it forms the deterministic tie-break ordering used by check-create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

/// Body of `POST /entities`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEntityRequest {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub collection: String,
    pub properties: Map<String, JsonValue>,
    /// When true, the graph service indexes the new entity before responding,
    /// so it is visible to our own confirming lookup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_index: Option<bool>,
}

// =============================================================================
// OPERATIONS (LLM output)
// =============================================================================

/// An entity creation emitted by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOp {
    pub label: String,
    pub entity_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// A relationship between two labeled entities emitted by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipOp {
    pub subject: String,
    pub predicate: String,
    pub target: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote_start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote_end: Option<String>,
}

/// Legacy single-property assignment, still accepted by the parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyOp {
    pub entity: String,
    pub key: String,
    pub value: String,
}

/// Tagged operation variant as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Operation {
    Create(CreateOp),
    AddRelationship(RelationshipOp),
    AddProperty(PropertyOp),
}

/// Validated and classified model output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedOperations {
    pub creates: Vec<CreateOp>,
    pub properties: Vec<PropertyOp>,
    pub relationships: Vec<RelationshipOp>,
}

impl ParsedOperations {
    /// Total number of accepted operations.
    pub fn len(&self) -> usize {
        self.creates.len() + self.properties.len() + self.relationships.len()
    }

    /// True when no operation of any kind was accepted.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// CHECK-CREATE
// =============================================================================

/// A `(label, type)` pair to resolve-or-create in a collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntitySpec {
    pub label: String,
    pub entity_type: String,
}

/// Outcome of one check-create resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckCreateResult {
    pub entity_id: String,
    pub is_new: bool,
    /// Normalized label the entity was resolved under.
    pub label: String,
    pub entity_type: String,
    /// True when our create lost the tie-break and was deleted.
    #[serde(default)]
    pub raced: bool,
}

// =============================================================================
// ADDITIVE UPDATES
// =============================================================================

/// One relationship to upsert onto an entity.
///
/// The graph service upserts by `(entity, predicate, peer)` and deep-merges
/// the property bag, so re-posting the same edge is safe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipAdd {
    pub predicate: String,
    pub peer: String,
    pub direction: Direction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer_label: Option<String>,
    #[serde(default)]
    pub properties: Map<String, JsonValue>,
}

/// Wire shape for the graph service's batch additive-update ingress.
///
/// Strictly additive: properties are merged in, relationships are upserted,
/// nothing is ever removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdditiveUpdate {
    pub entity_id: String,
    #[serde(default)]
    pub properties: Map<String, JsonValue>,
    #[serde(default)]
    pub relationships_add: Vec<RelationshipAdd>,
}

impl AdditiveUpdate {
    /// An empty update for the given entity.
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            properties: Map::new(),
            relationships_add: Vec::new(),
        }
    }
}

// =============================================================================
// PROVENANCE
// =============================================================================

/// Identifies the source chunk; embedded in every provenance property block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub label: String,
}

// =============================================================================
// PROMPT CONTEXT
// =============================================================================

/// Prompt-facing view of the chunk entity being processed.
#[derive(Debug, Clone)]
pub struct EntityContext {
    pub id: String,
    pub entity_type: String,
    pub label: String,
    pub description: String,
    /// Remaining properties after label/description/text are pulled out.
    pub properties: Map<String, JsonValue>,
    pub relationships: Vec<EntityRelationship>,
}

impl EntityContext {
    /// Build the prompt context from a fetched entity.
    ///
    /// `label` and `description` are lifted out of the property bag; the bulk
    /// text fields (`text`, `content`) are dropped since the chunk text is
    /// supplied to the prompt separately.
    pub fn from_entity(entity: &GraphEntity) -> Self {
        let get = |key: &str| {
            entity
                .properties
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };

        let mut properties = entity.properties.clone();
        for key in ["label", "description", "text", "content"] {
            properties.remove(key);
        }

        Self {
            id: entity.id.clone(),
            entity_type: entity.entity_type.clone(),
            label: get("label"),
            description: get("description"),
            properties,
            relationships: entity.relationships.clone(),
        }
    }

    /// SourceRef identifying this chunk in provenance blocks.
    pub fn source_ref(&self) -> SourceRef {
        SourceRef {
            id: self.id.clone(),
            entity_type: self.entity_type.clone(),
            label: self.label.clone(),
        }
    }
}

// =============================================================================
// JOB CONTRACT
// =============================================================================

/// Host-delivered extraction job request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub job_id: Uuid,
    /// Collection the job bookkeeping lives in (receives the audit edge).
    pub job_collection: String,
    /// Id of the chunk entity to process.
    pub target_entity: String,
    /// Collection extracted entities are placed in.
    pub target_collection: String,
    /// Graph service base URL.
    pub api_base: String,
    /// Environment selector (e.g. "mainnet", "testnet").
    pub network: String,
    /// Host-specific workflow context, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rhiza: Option<JsonValue>,
}

// =============================================================================
// LLM
// =============================================================================

/// Token usage and informational cost for one model call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    /// USD, computed from per-million-token rates. Informational only.
    pub cost: f64,
}

/// Parsed model response: the content text plus usage accounting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LlmResponse {
    pub content: String,
    pub usage: LlmUsage,
}
