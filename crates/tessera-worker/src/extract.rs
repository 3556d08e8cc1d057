//! The extraction pipeline: fetch → LLM → parse → dedupe → fire updates.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value as JsonValue};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use tessera_core::{
    defaults, normalize_label, CreateOp, EntityContext, EntitySpec, Error, GraphEntity,
    GraphStore, JobRequest, LlmBackend, Result,
};
use tessera_graph::{build_updates, CheckCreateConfig, CheckCreateEngine, GraphClient, UpdateBuilderInput};

use crate::handler::{JobContext, JobHandler, JobResult};
use crate::parser::{collect_referenced_labels, parse_operations};
use crate::prompt::{compose_user_prompt, SYSTEM_PROMPT};

/// Produces a [`GraphStore`] for a job request. The default factory builds an
/// HTTP client against the request's `api_base`; tests inject an in-memory
/// store.
pub type GraphStoreFactory = Box<dyn Fn(&JobRequest) -> Result<Arc<dyn GraphStore>> + Send + Sync>;

/// The extraction job handler.
pub struct ExtractHandler {
    llm: Arc<dyn LlmBackend>,
    graph_factory: GraphStoreFactory,
    check_create: CheckCreateConfig,
}

impl ExtractHandler {
    /// Create a handler using HTTP graph clients derived from each request.
    pub fn new(llm: Arc<dyn LlmBackend>) -> Self {
        Self {
            llm,
            graph_factory: Box::new(|request| {
                let client = GraphClient::for_base(&request.api_base)?;
                Ok(Arc::new(client) as Arc<dyn GraphStore>)
            }),
            check_create: CheckCreateConfig::default(),
        }
    }

    /// Replace the graph store factory.
    pub fn with_graph_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&JobRequest) -> Result<Arc<dyn GraphStore>> + Send + Sync + 'static,
    {
        self.graph_factory = Box::new(factory);
        self
    }

    /// Replace the check-create tuning (tests shrink the delays).
    pub fn with_check_create_config(mut self, config: CheckCreateConfig) -> Self {
        self.check_create = config;
        self
    }

    async fn run(&self, ctx: &JobContext) -> Result<JsonValue> {
        let request = &ctx.request;
        let started = Instant::now();

        // Step 1: fetch the target chunk with relationship previews.
        if request.target_entity.is_empty() {
            return Err(Error::InvalidInput("job has no target_entity".to_string()));
        }
        let graph = (self.graph_factory)(request)?;
        let entity = graph.fetch_entity(&request.target_entity).await?;
        ctx.report_progress(10, Some("Fetched target entity"));

        // Step 2: resolve and validate the chunk text.
        let text = resolve_text(graph.as_ref(), &entity).await?;
        let char_count = text.chars().count();
        if char_count < defaults::CHUNK_MIN_CHARS {
            return Err(Error::InvalidInput(format!(
                "chunk text too short: {} chars (minimum {})",
                char_count,
                defaults::CHUNK_MIN_CHARS
            )));
        }
        if text.len() > defaults::CHUNK_MAX_BYTES {
            return Err(Error::InvalidInput(format!(
                "chunk text too large: {} bytes (maximum {})",
                text.len(),
                defaults::CHUNK_MAX_BYTES
            )));
        }
        if text.len() > defaults::CHUNK_WARN_BYTES {
            warn!(
                job_id = %request.job_id,
                bytes = text.len(),
                "Unusually large chunk text"
            );
        }

        // Step 3: compose the prompt and call the model.
        let context = EntityContext::from_entity(&entity);
        let user_prompt = compose_user_prompt(&context, &text);
        let response = self.llm.generate(SYSTEM_PROMPT, &user_prompt).await?;
        info!(
            job_id = %request.job_id,
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            cost_usd = response.usage.cost,
            "Model call complete"
        );
        ctx.report_progress(40, Some("Model output received"));

        // Step 4: parse, then declare creates for every label the model
        // referenced but forgot to create, so relationship targets exist.
        let mut parsed = parse_operations(&response.content)?;
        let mut declared: HashSet<String> = parsed
            .creates
            .iter()
            .map(|op| normalize_label(&op.label))
            .collect();
        let mut auto_created = 0usize;
        for label in collect_referenced_labels(&parsed) {
            let normalized = normalize_label(&label);
            if normalized.is_empty() || declared.contains(&normalized) {
                continue;
            }
            debug!(label = %normalized, "Auto-creating undeclared referenced entity");
            declared.insert(normalized.clone());
            parsed.creates.push(CreateOp {
                label: normalized,
                entity_type: "entity".to_string(),
                description: String::new(),
                properties: Default::default(),
            });
            auto_created += 1;
        }
        info!(
            job_id = %request.job_id,
            operation_count = parsed.len(),
            create_count = parsed.creates.len(),
            relationship_count = parsed.relationships.len(),
            auto_created,
            "Operations parsed"
        );

        if parsed.creates.is_empty() {
            info!(job_id = %request.job_id, "Empty extraction, nothing to materialize");
            ctx.report_progress(100, Some("Done"));
            return Ok(json!({
                "status": "done",
                "new_entity_ids": [],
                "stats": {
                    "operations": 0,
                    "creates": 0,
                    "relationships": 0,
                    "auto_created": 0,
                    "races_lost": 0,
                    "updates": 0,
                    "usage": response.usage,
                }
            }));
        }

        // Step 5: resolve-or-create every entity.
        let engine = CheckCreateEngine::new(graph.clone(), self.check_create.clone());
        let specs: Vec<EntitySpec> = parsed
            .creates
            .iter()
            .map(|op| EntitySpec {
                label: op.label.clone(),
                entity_type: op.entity_type.clone(),
            })
            .collect();
        let results = engine
            .batch_check_create(&request.target_collection, &specs)
            .await?;
        let races_lost = results.iter().filter(|r| r.raced).count();
        if races_lost > 0 {
            info!(job_id = %request.job_id, races_lost, "Creation races detected and resolved");
        }
        ctx.report_progress(70, Some("Entities resolved"));

        // Step 6: build the additive updates and fire them without awaiting.
        // The endpoint upserts by (entity, predicate, peer), so a lost batch
        // delays data but never corrupts it.
        let source = context.source_ref();
        let updates = build_updates(&UpdateBuilderInput {
            parsed: &parsed,
            results: &results,
            source: &source,
            collection_id: &request.job_collection,
            chunk_text: &text,
            extracted_at: Utc::now(),
        });
        let update_count = updates.len();
        for (batch_index, batch) in updates.chunks(defaults::UPDATE_BATCH_MAX).enumerate() {
            let graph = graph.clone();
            let batch = batch.to_vec();
            let job_id = request.job_id;
            tokio::spawn(async move {
                match graph.post_additive_updates(&batch).await {
                    Ok(accepted) => {
                        debug!(%job_id, batch_index, accepted, "Additive update batch accepted");
                    }
                    Err(e) => {
                        warn!(%job_id, batch_index, error = %e, "Additive update batch failed");
                    }
                }
            });
        }
        ctx.report_progress(90, Some("Updates dispatched"));

        // Step 7: hand off only the ids this job created.
        let new_entity_ids: Vec<&str> = results
            .iter()
            .filter(|r| r.is_new)
            .map(|r| r.entity_id.as_str())
            .collect();
        info!(
            job_id = %request.job_id,
            duration_ms = started.elapsed().as_millis() as u64,
            create_count = results.len(),
            new_count = new_entity_ids.len(),
            update_count,
            races_lost,
            "Extraction job complete"
        );
        ctx.report_progress(100, Some("Done"));

        Ok(json!({
            "status": "done",
            "new_entity_ids": new_entity_ids,
            "stats": {
                "operations": parsed.len(),
                "creates": results.len(),
                "relationships": parsed.relationships.len(),
                "auto_created": auto_created,
                "races_lost": races_lost,
                "updates": update_count,
                "usage": response.usage,
            }
        }))
    }
}

/// Prefer `properties.text`, fall back to `properties.content`, else fetch
/// from the content endpoint.
async fn resolve_text(graph: &dyn GraphStore, entity: &GraphEntity) -> Result<String> {
    for key in ["text", "content"] {
        if let Some(text) = entity.properties.get(key).and_then(|v| v.as_str()) {
            return Ok(text.to_string());
        }
    }
    graph.fetch_content(&entity.id, "content").await
}

#[async_trait]
impl JobHandler for ExtractHandler {
    async fn execute(&self, ctx: JobContext) -> JobResult {
        let job_id = ctx.request.job_id;
        match self.run(&ctx).await {
            Ok(payload) => JobResult::Success(payload),
            Err(e) => {
                error!(%job_id, code = e.code(), error = %e, "Extraction job failed");
                JobResult::Failed {
                    code: e.code().to_string(),
                    message: e.to_string(),
                }
            }
        }
    }
}
