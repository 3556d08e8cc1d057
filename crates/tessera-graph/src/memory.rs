//! In-memory graph store for deterministic testing.
//!
//! Implements the full [`GraphStore`] surface against a process-local map:
//! strongly consistent lookups, monotonic `created_at` stamps, additive
//! upsert by `(entity, predicate, peer)`, call counters, and failure
//! injection knobs for exercising the check-create failure paths.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tessera_core::{
    AdditiveUpdate, CreateEntityRequest, EntityRef, EntityRelationship, Error, GraphEntity,
    GraphStore, RelationshipAdd, Result,
};

/// A stored entity, inspectable from tests.
#[derive(Debug, Clone)]
pub struct StoredEntity {
    pub id: String,
    pub entity_type: String,
    pub collection: String,
    pub properties: Map<String, JsonValue>,
    pub relationships: Vec<RelationshipAdd>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Clone, Copy)]
struct FailureKnobs {
    lookups: bool,
    creates: bool,
    deletes: bool,
}

struct Inner {
    entities: HashMap<String, StoredEntity>,
    contents: HashMap<String, String>,
    base: DateTime<Utc>,
    seq: u64,
    lookup_calls: usize,
    create_calls: usize,
    delete_calls: usize,
    update_batches: Vec<Vec<AdditiveUpdate>>,
    fail: FailureKnobs,
    /// Force the next N lookup calls to return empty, simulating index lag.
    lookup_misses_remaining: usize,
}

/// Deterministic in-memory [`GraphStore`].
#[derive(Clone)]
pub struct MemoryGraphStore {
    inner: Arc<Mutex<Inner>>,
}

impl Default for MemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                entities: HashMap::new(),
                contents: HashMap::new(),
                base: Utc::now(),
                seq: 0,
                lookup_calls: 0,
                create_calls: 0,
                delete_calls: 0,
                update_batches: Vec::new(),
                fail: FailureKnobs::default(),
                lookup_misses_remaining: 0,
            })),
        }
    }

    // ─── Seeding ───────────────────────────────────────────────────────────

    /// Insert an entity directly, bypassing the API surface.
    pub fn seed_entity(
        &self,
        id: impl Into<String>,
        entity_type: impl Into<String>,
        collection: impl Into<String>,
        properties: JsonValue,
    ) {
        let mut inner = self.inner.lock().unwrap();
        let created_at = next_created_at(&mut inner);
        let id = id.into();
        let properties = match properties {
            JsonValue::Object(map) => map,
            _ => Map::new(),
        };
        inner.entities.insert(
            id.clone(),
            StoredEntity {
                id,
                entity_type: entity_type.into(),
                collection: collection.into(),
                properties,
                relationships: Vec::new(),
                created_at,
            },
        );
    }

    /// Register an out-of-band content payload for an entity.
    pub fn seed_content(&self, id: impl Into<String>, text: impl Into<String>) {
        self.inner.lock().unwrap().contents.insert(id.into(), text.into());
    }

    // ─── Failure injection ─────────────────────────────────────────────────

    pub fn set_fail_lookups(&self, fail: bool) {
        self.inner.lock().unwrap().fail.lookups = fail;
    }

    pub fn set_fail_creates(&self, fail: bool) {
        self.inner.lock().unwrap().fail.creates = fail;
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.inner.lock().unwrap().fail.deletes = fail;
    }

    /// Force the next `n` lookup calls to return empty, as a lagging index
    /// would.
    pub fn miss_next_lookups(&self, n: usize) {
        self.inner.lock().unwrap().lookup_misses_remaining = n;
    }

    // ─── Inspection ────────────────────────────────────────────────────────

    pub fn entity(&self, id: &str) -> Option<StoredEntity> {
        self.inner.lock().unwrap().entities.get(id).cloned()
    }

    /// All live entities in a collection with the given label (exact,
    /// case-insensitive), in creation order.
    pub fn entities_with_label(&self, collection: &str, label: &str) -> Vec<StoredEntity> {
        let inner = self.inner.lock().unwrap();
        let mut matches: Vec<StoredEntity> = inner
            .entities
            .values()
            .filter(|e| e.collection == collection && label_matches(e, label))
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        matches
    }

    pub fn lookup_calls(&self) -> usize {
        self.inner.lock().unwrap().lookup_calls
    }

    pub fn create_calls(&self) -> usize {
        self.inner.lock().unwrap().create_calls
    }

    pub fn delete_calls(&self) -> usize {
        self.inner.lock().unwrap().delete_calls
    }

    /// Sizes and contents of every posted additive-update batch.
    pub fn update_batches(&self) -> Vec<Vec<AdditiveUpdate>> {
        self.inner.lock().unwrap().update_batches.clone()
    }

    /// Flattened view of all posted updates, in post order.
    pub fn all_updates(&self) -> Vec<AdditiveUpdate> {
        self.inner.lock().unwrap().update_batches.iter().flatten().cloned().collect()
    }
}

fn next_created_at(inner: &mut Inner) -> DateTime<Utc> {
    inner.seq += 1;
    inner.base + ChronoDuration::milliseconds(inner.seq as i64)
}

fn label_matches(entity: &StoredEntity, label: &str) -> bool {
    entity
        .properties
        .get("label")
        .and_then(|v| v.as_str())
        .map(|stored| stored.eq_ignore_ascii_case(label))
        .unwrap_or(false)
}

/// Deep-merge `incoming` into `target`: nested objects merge recursively,
/// everything else overwrites.
fn deep_merge(target: &mut Map<String, JsonValue>, incoming: &Map<String, JsonValue>) {
    for (key, value) in incoming {
        match (target.get_mut(key), value) {
            (Some(JsonValue::Object(existing)), JsonValue::Object(new)) => {
                deep_merge(existing, new);
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

fn apply_update(inner: &mut Inner, update: &AdditiveUpdate) {
    let created_at = next_created_at(inner);
    let entity = inner
        .entities
        .entry(update.entity_id.clone())
        .or_insert_with(|| StoredEntity {
            id: update.entity_id.clone(),
            entity_type: String::new(),
            collection: String::new(),
            properties: Map::new(),
            relationships: Vec::new(),
            created_at,
        });

    deep_merge(&mut entity.properties, &update.properties);

    for rel in &update.relationships_add {
        match entity
            .relationships
            .iter_mut()
            .find(|r| r.predicate == rel.predicate && r.peer == rel.peer)
        {
            Some(existing) => deep_merge(&mut existing.properties, &rel.properties),
            None => entity.relationships.push(rel.clone()),
        }
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn fetch_entity(&self, id: &str) -> Result<GraphEntity> {
        let inner = self.inner.lock().unwrap();
        let stored = inner
            .entities
            .get(id)
            .ok_or_else(|| Error::EntityNotFound(id.to_string()))?;
        Ok(GraphEntity {
            id: stored.id.clone(),
            entity_type: stored.entity_type.clone(),
            properties: stored.properties.clone(),
            relationships: stored
                .relationships
                .iter()
                .map(|r| EntityRelationship {
                    predicate: r.predicate.clone(),
                    peer: r.peer.clone(),
                    direction: r.direction,
                    peer_label: r.peer_label.clone(),
                    properties: r.properties.clone(),
                    peer_preview: None,
                })
                .collect(),
            created_at: Some(stored.created_at),
        })
    }

    async fn fetch_content(&self, id: &str, _key: &str) -> Result<String> {
        self.inner
            .lock()
            .unwrap()
            .contents
            .get(id)
            .cloned()
            .ok_or_else(|| Error::EntityNotFound(format!("content for {}", id)))
    }

    async fn lookup_entities(
        &self,
        collection: &str,
        label: &str,
        entity_type: &str,
        limit: usize,
    ) -> Result<Vec<EntityRef>> {
        let mut inner = self.inner.lock().unwrap();
        inner.lookup_calls += 1;

        if inner.fail.lookups {
            return Err(Error::Graph("lookup failed (injected)".to_string()));
        }
        if inner.lookup_misses_remaining > 0 {
            inner.lookup_misses_remaining -= 1;
            return Ok(Vec::new());
        }

        let mut matches: Vec<&StoredEntity> = inner
            .entities
            .values()
            .filter(|e| {
                e.collection == collection
                    && e.entity_type == entity_type
                    && label_matches(e, label)
            })
            .collect();
        matches.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(matches
            .into_iter()
            .take(limit)
            .map(|e| EntityRef {
                id: e.id.clone(),
                created_at: e.created_at,
            })
            .collect())
    }

    async fn create_entity(&self, req: &CreateEntityRequest) -> Result<EntityRef> {
        let mut inner = self.inner.lock().unwrap();
        inner.create_calls += 1;

        if inner.fail.creates {
            return Err(Error::Graph("create failed (injected)".to_string()));
        }

        let created_at = next_created_at(&mut inner);
        let id = format!("ent-{:08}", inner.seq);
        inner.entities.insert(
            id.clone(),
            StoredEntity {
                id: id.clone(),
                entity_type: req.entity_type.clone(),
                collection: req.collection.clone(),
                properties: req.properties.clone(),
                relationships: Vec::new(),
                created_at,
            },
        );
        Ok(EntityRef { id, created_at })
    }

    async fn delete_entity(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.delete_calls += 1;

        if inner.fail.deletes {
            return Err(Error::Graph("delete failed (injected)".to_string()));
        }
        inner.entities.remove(id);
        Ok(())
    }

    async fn post_additive_updates(&self, updates: &[AdditiveUpdate]) -> Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        for update in updates {
            apply_update(&mut inner, update);
        }
        inner.update_batches.push(updates.to_vec());
        Ok(updates.len())
    }
}
