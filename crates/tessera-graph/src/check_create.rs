//! Check-create: idempotent entity upsert with creation-race resolution.
//!
//! Many jobs extract overlapping entities from different chunks of the same
//! document concurrently, and the graph's lookup index is eventually
//! consistent, so a naive lookup-then-create races: two jobs both miss, both
//! create, both succeed. The protocol here closes that window with three
//! knobs that form a single contract:
//!
//! 1. `sync_index` on create - the service indexes our entity before
//!    responding, so the confirming lookup can see it;
//! 2. a jittered settle delay - peer writers in the race window get time to
//!    finish their own create+index, and the jitter desynchronizes cohorts
//!    of workers started at the same instant;
//! 3. a deterministic tie-break on `(created_at, id)` - every loser
//!    independently agrees on the same winner without coordination.
//!
//! Removing any one of the three reintroduces duplicates.

use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::sleep;
use std::time::Duration;
use tracing::{debug, warn};

use tessera_core::{
    defaults, normalize_label, CheckCreateResult, CreateEntityRequest, EntityRef, EntitySpec,
    Error, GraphStore, Result,
};

/// Tuning knobs for the check-create protocol. Tests shrink the delays.
#[derive(Debug, Clone)]
pub struct CheckCreateConfig {
    /// Delay after create before the confirming lookup (milliseconds).
    pub settle_delay_ms: u64,
    /// Exclusive upper bound of the jitter added to every delay.
    pub settle_jitter_ms: u64,
    /// Delay before each confirming-lookup retry (milliseconds).
    pub recheck_delay_ms: u64,
    /// Maximum confirming-lookup retries while only our entity is visible.
    pub lookup_max_retries: u32,
    /// Result cap for the confirming lookup.
    pub lookup_limit: usize,
    /// Concurrency ceiling for the batch wrapper.
    pub concurrency: usize,
}

impl Default for CheckCreateConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: defaults::SETTLE_DELAY_MS,
            settle_jitter_ms: defaults::SETTLE_JITTER_MS,
            recheck_delay_ms: defaults::RECHECK_DELAY_MS,
            lookup_max_retries: defaults::LOOKUP_MAX_RETRIES,
            lookup_limit: defaults::LOOKUP_LIMIT,
            concurrency: defaults::CHECK_CREATE_CONCURRENCY,
        }
    }
}

impl CheckCreateConfig {
    /// Set all protocol delays at once (milliseconds).
    pub fn with_delays(mut self, settle_ms: u64, jitter_ms: u64, recheck_ms: u64) -> Self {
        self.settle_delay_ms = settle_ms;
        self.settle_jitter_ms = jitter_ms;
        self.recheck_delay_ms = recheck_ms;
        self
    }

    /// Set the batch concurrency ceiling.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }
}

/// Race-resolving entity upsert engine over a [`GraphStore`].
#[derive(Clone)]
pub struct CheckCreateEngine {
    store: Arc<dyn GraphStore>,
    config: CheckCreateConfig,
    semaphore: Arc<Semaphore>,
}

impl CheckCreateEngine {
    pub fn new(store: Arc<dyn GraphStore>, config: CheckCreateConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
        Self {
            store,
            config,
            semaphore,
        }
    }

    /// Resolve-or-create one `(label, type)` in `collection`.
    ///
    /// Returns the surviving entity's id; `is_new` is true only when our own
    /// create won (or was uncontested), so across all concurrent callers at
    /// most one receives `is_new` for a given survivor.
    pub async fn check_create(
        &self,
        collection: &str,
        label: &str,
        entity_type: &str,
    ) -> Result<CheckCreateResult> {
        let normalized = normalize_label(label);
        if normalized.is_empty() {
            return Err(Error::InvalidInput(format!(
                "label {:?} normalizes to empty",
                label
            )));
        }

        // Lookup-1: the common case is that the entity already exists.
        let existing = self.lookup(collection, &normalized, entity_type, 1).await;
        if let Some(hit) = existing.first() {
            debug!(label = %normalized, entity_id = %hit.id, "Entity already present");
            return Ok(CheckCreateResult {
                entity_id: hit.id.clone(),
                is_new: false,
                label: normalized,
                entity_type: entity_type.to_string(),
                raced: false,
            });
        }

        // Create with sync_index so our own confirming lookup can see it.
        // A create failure is fatal to the job.
        let mut properties = serde_json::Map::new();
        properties.insert("label".to_string(), serde_json::Value::String(normalized.clone()));
        let created = self
            .store
            .create_entity(&CreateEntityRequest {
                entity_type: entity_type.to_string(),
                collection: collection.to_string(),
                properties,
                sync_index: Some(true),
            })
            .await?;

        // Settle: let peer writers in the race window finish create+index.
        self.pause(self.config.settle_delay_ms).await;

        // Lookup-N: confirm we are the sole creator. Seeing exactly one
        // entity that is our own may just mean the index is lagging behind a
        // concurrent peer, so re-check a bounded number of times.
        let mut matches = self
            .lookup(collection, &normalized, entity_type, self.config.lookup_limit)
            .await;
        let mut rechecks = 0;
        while matches.len() == 1
            && matches[0].id == created.id
            && rechecks < self.config.lookup_max_retries
        {
            self.pause(self.config.recheck_delay_ms).await;
            matches = self
                .lookup(collection, &normalized, entity_type, self.config.lookup_limit)
                .await;
            rechecks += 1;
        }

        if matches.len() <= 1 {
            debug!(label = %normalized, entity_id = %created.id, "Sole creator confirmed");
            return Ok(CheckCreateResult {
                entity_id: created.id,
                is_new: true,
                label: normalized,
                entity_type: entity_type.to_string(),
                raced: false,
            });
        }

        // Multiple entities: a race happened. Every racer sorts the same way
        // and independently agrees on the same winner.
        matches.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        let winner = matches[0].clone();

        if winner.id == created.id {
            debug!(
                label = %normalized,
                entity_id = %created.id,
                contenders = matches.len(),
                "Won creation race"
            );
            return Ok(CheckCreateResult {
                entity_id: created.id,
                is_new: true,
                label: normalized,
                entity_type: entity_type.to_string(),
                raced: false,
            });
        }

        warn!(
            label = %normalized,
            winner = %winner.id,
            loser = %created.id,
            "Lost creation race, deleting our duplicate"
        );
        if let Err(e) = self.store.delete_entity(&created.id).await {
            // Best effort only; eventual consistency resolves the leftover.
            warn!(
                entity_id = %created.id,
                error = %e,
                "Failed to delete losing duplicate"
            );
        }

        Ok(CheckCreateResult {
            entity_id: winner.id,
            is_new: false,
            label: normalized,
            entity_type: entity_type.to_string(),
            raced: true,
        })
    }

    /// Resolve-or-create a batch, deduplicated by `(type, normalized label)`,
    /// with at most `config.concurrency` protocol runs in flight. Result
    /// order is unspecified; callers key results by label.
    pub async fn batch_check_create(
        &self,
        collection: &str,
        specs: &[EntitySpec],
    ) -> Result<Vec<CheckCreateResult>> {
        let mut seen: HashSet<(String, String)> = HashSet::new();
        let mut unique: Vec<EntitySpec> = Vec::new();
        for spec in specs {
            let normalized = normalize_label(&spec.label);
            if normalized.is_empty() {
                warn!(label = %spec.label, "Skipping label that normalizes to empty");
                continue;
            }
            if seen.insert((spec.entity_type.clone(), normalized)) {
                unique.push(spec.clone());
            }
        }

        let mut tasks: JoinSet<Result<CheckCreateResult>> = JoinSet::new();
        for spec in unique {
            let engine = self.clone();
            let collection = collection.to_string();
            tasks.spawn(async move {
                let _permit = engine
                    .semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| Error::Internal("check-create semaphore closed".to_string()))?;
                engine
                    .check_create(&collection, &spec.label, &spec.entity_type)
                    .await
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let result = joined
                .map_err(|e| Error::Internal(format!("check-create task failed: {}", e)))??;
            results.push(result);
        }
        Ok(results)
    }

    /// Lookup that degrades to "not found" on failure: the protocol still
    /// completes, at worst deferring duplicate detection to the downstream
    /// resolver.
    async fn lookup(
        &self,
        collection: &str,
        label: &str,
        entity_type: &str,
        limit: usize,
    ) -> Vec<EntityRef> {
        match self
            .store
            .lookup_entities(collection, label, entity_type, limit)
            .await
        {
            Ok(entities) => entities,
            Err(e) => {
                warn!(label = %label, error = %e, "Lookup failed, treating as empty");
                Vec::new()
            }
        }
    }

    async fn pause(&self, base_ms: u64) {
        let jitter = if self.config.settle_jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..self.config.settle_jitter_ms)
        };
        sleep(Duration::from_millis(base_ms + jitter)).await;
    }
}
