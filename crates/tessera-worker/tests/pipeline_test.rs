//! End-to-end pipeline tests against the in-process mock backends.
//!
//! Additive updates are fired without awaiting, so assertions on graph
//! contents poll until the detached posts land.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use uuid::Uuid;

use tessera_core::JobRequest;
use tessera_graph::{CheckCreateConfig, MemoryGraphStore};
use tessera_llm::MockLlmBackend;
use tessera_worker::{ExtractHandler, JobContext, JobHandler, JobResult};

const CHUNK_TEXT: &str =
    "Captain Ahab stood upon the quarter-deck of the Pequod, gazing seaward for the white whale.";

fn request_for(chunk_id: &str) -> JobRequest {
    JobRequest {
        job_id: Uuid::new_v4(),
        job_collection: "jobs".into(),
        target_entity: chunk_id.into(),
        target_collection: "extracted".into(),
        api_base: "http://graph.invalid".into(),
        network: "testnet".into(),
        rhiza: None,
    }
}

fn handler_for(store: &MemoryGraphStore, llm: &MockLlmBackend) -> ExtractHandler {
    let store = store.clone();
    ExtractHandler::new(Arc::new(llm.clone()))
        .with_graph_factory(move |_| Ok(Arc::new(store.clone()) as _))
        .with_check_create_config(CheckCreateConfig::default().with_delays(2, 1, 2))
}

fn seed_chunk(store: &MemoryGraphStore, id: &str, text: &str) {
    store.seed_entity(
        id,
        "chunk",
        "jobs",
        json!({"label": format!("{} label", id), "text": text}),
    );
}

/// Poll until the store has received at least `min_batches` update batches.
async fn wait_for_update_batches(store: &MemoryGraphStore, min_batches: usize) {
    for _ in 0..200 {
        if store.update_batches().len() >= min_batches {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "timed out waiting for {} update batches (got {})",
        min_batches,
        store.update_batches().len()
    );
}

fn success_payload(result: &JobResult) -> serde_json::Value {
    match result {
        JobResult::Success(payload) => payload.clone(),
        JobResult::Failed { code, message } => panic!("job failed: {} ({})", message, code),
    }
}

// ─── Scenario: single new entity ───────────────────────────────────────────

#[tokio::test]
async fn test_single_new_entity_with_full_provenance() {
    let store = MemoryGraphStore::new();
    let llm = MockLlmBackend::new();
    seed_chunk(&store, "chunk-1", CHUNK_TEXT);
    llm.push_content(
        json!([{
            "operation": "create",
            "label": "Captain Ahab",
            "entity_type": "person",
            "description": "Captain of the Pequod",
            "properties": {"role": "captain", "ship": "Pequod"}
        }])
        .to_string(),
    );

    let handler = handler_for(&store, &llm);
    let result = handler.execute(JobContext::new(request_for("chunk-1"))).await;
    let payload = success_payload(&result);

    // Exactly one normalized entity in the target collection.
    let survivors = store.entities_with_label("extracted", "captain ahab");
    assert_eq!(survivors.len(), 1);
    let entity_id = survivors[0].id.clone();
    assert_eq!(payload["new_entity_ids"], json!([entity_id]));
    assert_eq!(payload["stats"]["creates"], 1);

    wait_for_update_batches(&store, 1).await;

    // extracted_from edge on the entity.
    let entity = store.entity(&entity_id).unwrap();
    let provenance: Vec<_> = entity
        .relationships
        .iter()
        .filter(|r| r.predicate == "extracted_from" && r.peer == "chunk-1")
        .collect();
    assert_eq!(provenance.len(), 1);

    // extracted_entity backlink on the chunk.
    let chunk = store.entity("chunk-1").unwrap();
    assert!(chunk
        .relationships
        .iter()
        .any(|r| r.predicate == "extracted_entity" && r.peer == entity_id));

    // contains audit edge on the collection.
    let collection = store.entity("jobs").unwrap();
    let audit: Vec<_> = collection
        .relationships
        .iter()
        .filter(|r| r.predicate == "contains" && r.peer == "chunk-1")
        .collect();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].properties["relationship_type"], "processed_chunk");
}

// ─── Scenario: two parallel jobs, same target label ────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_jobs_one_survivor_one_handoff() {
    let store = MemoryGraphStore::new();
    let llm = MockLlmBackend::new();
    seed_chunk(&store, "chunk-1", CHUNK_TEXT);
    seed_chunk(&store, "chunk-2", CHUNK_TEXT);

    let queequeg = json!([{
        "operation": "create",
        "label": "Queequeg",
        "entity_type": "person",
        "description": "Harpooneer from Kokovoko",
        "properties": {"role": "harpooneer", "origin": "Kokovoko"}
    }])
    .to_string();
    llm.push_content(queequeg.clone());
    llm.push_content(queequeg);

    let handler = handler_for(&store, &llm);
    let (first, second) = tokio::join!(
        handler.execute(JobContext::new(request_for("chunk-1"))),
        handler.execute(JobContext::new(request_for("chunk-2"))),
    );

    // Exactly one surviving entity.
    let survivors = store.entities_with_label("extracted", "queequeg");
    assert_eq!(survivors.len(), 1);
    let survivor_id = survivors[0].id.clone();

    // At most one job hands the id off; the loser's duplicate was deleted
    // and never appears in any handoff.
    let mut handed_off = first.new_entity_ids();
    handed_off.extend(second.new_entity_ids());
    assert_eq!(handed_off, vec![survivor_id]);
}

// ─── Scenario: relationship with orphan target ─────────────────────────────

#[tokio::test]
async fn test_relationship_and_orphan_back_edge() {
    let store = MemoryGraphStore::new();
    let llm = MockLlmBackend::new();
    seed_chunk(&store, "chunk-1", CHUNK_TEXT);
    llm.push_content(
        json!([
            {"operation": "create", "label": "Ahab", "entity_type": "person",
             "description": "the captain", "properties": {"role": "captain", "ship": "Pequod"}},
            {"operation": "create", "label": "Moby Dick", "entity_type": "whale",
             "description": "the white whale", "properties": {"color": "white", "species": "sperm whale"}},
            {"operation": "add_relationship", "subject": "Ahab", "predicate": "hunts",
             "target": "Moby Dick", "description": "the chase",
             "quote_start": "gazing seaward", "quote_end": "white whale"}
        ])
        .to_string(),
    );

    let handler = handler_for(&store, &llm);
    let result = handler.execute(JobContext::new(request_for("chunk-1"))).await;
    let payload = success_payload(&result);
    assert_eq!(payload["new_entity_ids"].as_array().unwrap().len(), 2);

    wait_for_update_batches(&store, 1).await;

    let ahab_id = store.entities_with_label("extracted", "ahab")[0].id.clone();
    let whale_id = store.entities_with_label("extracted", "moby dick")[0].id.clone();

    // Subject edge with quote provenance.
    let ahab = store.entity(&ahab_id).unwrap();
    let hunts: Vec<_> = ahab.relationships.iter().filter(|r| r.predicate == "hunts").collect();
    assert_eq!(hunts.len(), 1);
    assert_eq!(hunts[0].peer, whale_id);
    assert_eq!(
        hunts[0].properties["source_text"],
        "gazing seaward for the white whale"
    );
    assert_eq!(hunts[0].properties["source"]["id"], "chunk-1");

    // Orphan back-edge with originating predicate as context.
    let whale = store.entity(&whale_id).unwrap();
    let back: Vec<_> = whale
        .relationships
        .iter()
        .filter(|r| r.predicate == "referenced_by")
        .collect();
    assert_eq!(back.len(), 1);
    assert_eq!(back[0].peer, ahab_id);
    assert_eq!(back[0].properties["context"], "hunts");

    // Both carry extracted_from to the chunk.
    for entity in [&ahab, &whale] {
        assert!(entity
            .relationships
            .iter()
            .any(|r| r.predicate == "extracted_from" && r.peer == "chunk-1"));
    }
}

// ─── Scenario: forgotten create is auto-declared ───────────────────────────

#[tokio::test]
async fn test_referenced_target_without_create_is_auto_created() {
    let store = MemoryGraphStore::new();
    let llm = MockLlmBackend::new();
    seed_chunk(&store, "chunk-1", CHUNK_TEXT);
    llm.push_content(
        json!([
            {"operation": "create", "label": "Ahab", "entity_type": "person",
             "description": "the captain", "properties": {"role": "captain", "ship": "Pequod"}},
            {"operation": "add_relationship", "subject": "Ahab", "predicate": "commands",
             "target": "The Pequod", "description": "his ship"}
        ])
        .to_string(),
    );

    let handler = handler_for(&store, &llm);
    let result = handler.execute(JobContext::new(request_for("chunk-1"))).await;
    let payload = success_payload(&result);

    assert_eq!(payload["stats"]["auto_created"], 1);
    // The forgotten target exists with a generic type and normalized label.
    let pequod = store.entities_with_label("extracted", "the pequod");
    assert_eq!(pequod.len(), 1);
    assert_eq!(pequod[0].entity_type, "entity");
}

// ─── Scenario: oversize and undersize inputs ───────────────────────────────

#[tokio::test]
async fn test_oversize_chunk_rejected_before_llm() {
    let store = MemoryGraphStore::new();
    let llm = MockLlmBackend::new();
    seed_chunk(&store, "chunk-1", &"x".repeat(600 * 1024));

    let handler = handler_for(&store, &llm);
    let result = handler.execute(JobContext::new(request_for("chunk-1"))).await;

    match result {
        JobResult::Failed { code, message } => {
            assert_eq!(code, "invalid_input");
            assert!(message.contains("too large"));
        }
        JobResult::Success(_) => panic!("oversize chunk must fail"),
    }
    // No model call, no entity created.
    assert_eq!(llm.call_count(), 0);
    assert_eq!(store.create_calls(), 0);
}

#[tokio::test]
async fn test_text_length_boundaries() {
    let store = MemoryGraphStore::new();
    let llm = MockLlmBackend::new();
    seed_chunk(&store, "chunk-49", &"a".repeat(49));
    seed_chunk(&store, "chunk-50", &"a".repeat(50));

    let handler = handler_for(&store, &llm);

    let rejected = handler.execute(JobContext::new(request_for("chunk-49"))).await;
    assert!(matches!(rejected, JobResult::Failed { ref code, .. } if code == "invalid_input"));
    assert_eq!(llm.call_count(), 0);

    // 50 chars is accepted; the default mock reply is an empty extraction.
    let accepted = handler.execute(JobContext::new(request_for("chunk-50"))).await;
    let payload = success_payload(&accepted);
    assert_eq!(payload["new_entity_ids"], json!([]));
    assert_eq!(llm.call_count(), 1);
}

// ─── Scenario: empty extraction ────────────────────────────────────────────

#[tokio::test]
async fn test_empty_extraction_is_success_with_no_handoff() {
    let store = MemoryGraphStore::new();
    let llm = MockLlmBackend::new();
    seed_chunk(&store, "chunk-1", CHUNK_TEXT);
    llm.push_content("[]");

    let handler = handler_for(&store, &llm);
    let result = handler.execute(JobContext::new(request_for("chunk-1"))).await;
    let payload = success_payload(&result);

    assert_eq!(payload["status"], "done");
    assert_eq!(payload["new_entity_ids"], json!([]));
    assert_eq!(store.create_calls(), 0);
    assert!(store.update_batches().is_empty());
}

// ─── Input validation and text fallbacks ───────────────────────────────────

#[tokio::test]
async fn test_missing_target_entity_rejected() {
    let store = MemoryGraphStore::new();
    let llm = MockLlmBackend::new();
    let handler = handler_for(&store, &llm);

    let mut request = request_for("");
    request.target_entity = String::new();
    let result = handler.execute(JobContext::new(request)).await;
    assert!(matches!(result, JobResult::Failed { ref code, .. } if code == "invalid_input"));
}

#[tokio::test]
async fn test_unknown_target_entity_rejected() {
    let store = MemoryGraphStore::new();
    let llm = MockLlmBackend::new();
    let handler = handler_for(&store, &llm);

    let result = handler.execute(JobContext::new(request_for("chunk-missing"))).await;
    assert!(matches!(result, JobResult::Failed { ref code, .. } if code == "entity_not_found"));
}

#[tokio::test]
async fn test_content_property_fallback() {
    let store = MemoryGraphStore::new();
    let llm = MockLlmBackend::new();
    store.seed_entity("chunk-1", "chunk", "jobs", json!({"label": "p", "content": CHUNK_TEXT}));

    let handler = handler_for(&store, &llm);
    let result = handler.execute(JobContext::new(request_for("chunk-1"))).await;
    assert!(matches!(result, JobResult::Success(_)));
    assert_eq!(llm.call_count(), 1);
}

#[tokio::test]
async fn test_content_endpoint_fallback() {
    let store = MemoryGraphStore::new();
    let llm = MockLlmBackend::new();
    store.seed_entity("chunk-1", "chunk", "jobs", json!({"label": "p"}));
    store.seed_content("chunk-1", CHUNK_TEXT);

    let handler = handler_for(&store, &llm);
    let result = handler.execute(JobContext::new(request_for("chunk-1"))).await;
    assert!(matches!(result, JobResult::Success(_)));

    // The chunk text reached the prompt via the content endpoint.
    let calls = llm.calls();
    assert!(calls[0].user_prompt.contains("gazing seaward"));
}

#[tokio::test]
async fn test_llm_failure_fails_job() {
    let store = MemoryGraphStore::new();
    let llm = MockLlmBackend::new();
    seed_chunk(&store, "chunk-1", CHUNK_TEXT);
    llm.push_error("model unavailable");

    let handler = handler_for(&store, &llm);
    let result = handler.execute(JobContext::new(request_for("chunk-1"))).await;
    assert!(matches!(result, JobResult::Failed { ref code, .. } if code == "llm_error"));
    assert_eq!(store.create_calls(), 0);
}

#[tokio::test]
async fn test_unparseable_model_output_fails_job() {
    let store = MemoryGraphStore::new();
    let llm = MockLlmBackend::new();
    seed_chunk(&store, "chunk-1", CHUNK_TEXT);
    llm.push_content("the model rambled instead of emitting JSON");

    let handler = handler_for(&store, &llm);
    let result = handler.execute(JobContext::new(request_for("chunk-1"))).await;
    match result {
        JobResult::Failed { code, message } => {
            assert_eq!(code, "parse_error");
            assert!(message.contains("rambled"));
        }
        JobResult::Success(_) => panic!("unparseable output must fail"),
    }
}
