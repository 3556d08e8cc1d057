//! Consolidates parsed operations into additive-update batches.
//!
//! One [`AdditiveUpdate`] per touched entity, augmented with connectivity
//! (`referenced_by` back-edges for orphan targets) and provenance
//! (`extracted_from` edges, `extracted_entity` backlinks on the chunk, and a
//! `contains` audit edge on the collection). Everything emitted here is
//! additive; the graph service upserts relationships by
//! `(entity, predicate, peer)` so re-posting is safe.

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value as JsonValue};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::debug;

use tessera_core::{
    extract_quote, normalize_label, AdditiveUpdate, CheckCreateResult, Direction,
    ParsedOperations, RelationshipAdd, SourceRef,
};

/// Inputs for one build pass over a job's parsed operations.
#[derive(Debug, Clone)]
pub struct UpdateBuilderInput<'a> {
    pub parsed: &'a ParsedOperations,
    /// Check-create outcomes; the label→id map is derived from these.
    pub results: &'a [CheckCreateResult],
    /// The chunk the operations were extracted from.
    pub source: &'a SourceRef,
    /// Collection receiving the `processed_chunk` audit edge.
    pub collection_id: &'a str,
    /// Chunk text, used for marker-based quote extraction.
    pub chunk_text: &'a str,
    pub extracted_at: DateTime<Utc>,
}

/// Build the consolidated additive updates for one job.
///
/// The returned list is ordered: per-entity updates (sorted by entity id),
/// then the source-chunk backlink update, then the collection audit update.
/// The caller splits the list into wire batches.
pub fn build_updates(input: &UpdateBuilderInput<'_>) -> Vec<AdditiveUpdate> {
    let ids_by_label: HashMap<&str, &str> = input
        .results
        .iter()
        .map(|r| (r.label.as_str(), r.entity_id.as_str()))
        .collect();
    let resolve = |label: &str| -> Option<&str> {
        ids_by_label.get(normalize_label(label).as_str()).copied()
    };

    let extracted_at = input.extracted_at.to_rfc3339();
    let source_json = json!({
        "id": input.source.id,
        "type": input.source.entity_type,
        "label": input.source.label,
    });

    let mut by_entity: BTreeMap<String, AdditiveUpdate> = BTreeMap::new();

    // Legacy single-property assignments.
    for op in &input.parsed.properties {
        let Some(id) = resolve(&op.entity) else {
            debug!(entity = %op.entity, key = %op.key, "Skipping property for unknown entity");
            continue;
        };
        by_entity
            .entry(id.to_string())
            .or_insert_with(|| AdditiveUpdate::new(id))
            .properties
            .insert(op.key.clone(), JsonValue::String(op.value.clone()));
    }

    // Relationships, tracking which entities appear as subjects and which
    // targets were referenced (for orphan attachment below).
    let mut subjects: HashSet<String> = HashSet::new();
    let mut referenced_targets: BTreeMap<String, (String, String, String)> = BTreeMap::new();

    for op in &input.parsed.relationships {
        let (Some(subject_id), Some(target_id)) = (resolve(&op.subject), resolve(&op.target))
        else {
            debug!(
                subject = %op.subject,
                target = %op.target,
                predicate = %op.predicate,
                "Skipping relationship with unresolved endpoint"
            );
            continue;
        };
        let (subject_id, target_id) = (subject_id.to_string(), target_id.to_string());

        let mut properties = Map::new();
        properties.insert("description".to_string(), JsonValue::String(op.description.clone()));
        properties.insert("source".to_string(), source_json.clone());
        if let (Some(start), Some(end)) = (op.quote_start.as_deref(), op.quote_end.as_deref()) {
            if let Some(quote) = extract_quote(input.chunk_text, start, end) {
                properties.insert("source_text".to_string(), JsonValue::String(quote));
            }
        }
        properties.insert(
            "context".to_string(),
            JsonValue::String(format!("{} {} {}", op.subject, op.predicate, op.target)),
        );
        properties.insert("confidence".to_string(), json!(1.0));

        subjects.insert(subject_id.clone());
        referenced_targets
            .entry(target_id.clone())
            .or_insert_with(|| (subject_id.clone(), op.predicate.clone(), op.subject.clone()));

        by_entity
            .entry(subject_id.clone())
            .or_insert_with(|| AdditiveUpdate::new(&subject_id))
            .relationships_add
            .push(RelationshipAdd {
                predicate: op.predicate.clone(),
                peer: target_id,
                direction: Direction::Outgoing,
                peer_label: Some(op.target.clone()),
                properties,
            });
    }

    // Orphan attachment: a target that never appears as a subject gets an
    // outgoing back-edge to the first subject that referenced it, so every
    // extracted entity has at least one outgoing edge.
    for (target_id, (subject_id, predicate, subject_label)) in &referenced_targets {
        if subjects.contains(target_id) {
            continue;
        }
        let mut properties = Map::new();
        properties.insert("context".to_string(), JsonValue::String(predicate.clone()));
        properties.insert("source".to_string(), source_json.clone());

        by_entity
            .entry(target_id.clone())
            .or_insert_with(|| AdditiveUpdate::new(target_id))
            .relationships_add
            .push(RelationshipAdd {
                predicate: "referenced_by".to_string(),
                peer: subject_id.clone(),
                direction: Direction::Outgoing,
                peer_label: Some(subject_label.clone()),
                properties,
            });
    }

    // Provenance: every entity this pass touches, plus every check-create
    // result, points back at the chunk it was extracted from.
    let touched: BTreeSet<String> = by_entity
        .keys()
        .cloned()
        .chain(input.results.iter().map(|r| r.entity_id.clone()))
        .collect();
    for id in touched {
        let mut properties = Map::new();
        properties.insert("extracted_at".to_string(), JsonValue::String(extracted_at.clone()));
        properties.insert("source".to_string(), source_json.clone());

        by_entity
            .entry(id.clone())
            .or_insert_with(|| AdditiveUpdate::new(&id))
            .relationships_add
            .push(RelationshipAdd {
                predicate: "extracted_from".to_string(),
                peer: input.source.id.clone(),
                direction: Direction::Outgoing,
                peer_label: Some(input.source.label.clone()),
                properties,
            });
    }

    let mut updates: Vec<AdditiveUpdate> = by_entity.into_values().collect();

    // Source backlinks: the chunk records each entity extracted from it.
    if !input.results.is_empty() {
        let mut source_update = AdditiveUpdate::new(&input.source.id);
        for result in input.results {
            let mut properties = Map::new();
            properties.insert("extracted_at".to_string(), JsonValue::String(extracted_at.clone()));
            properties.insert(
                "entity_type".to_string(),
                JsonValue::String(result.entity_type.clone()),
            );
            source_update.relationships_add.push(RelationshipAdd {
                predicate: "extracted_entity".to_string(),
                peer: result.entity_id.clone(),
                direction: Direction::Outgoing,
                peer_label: Some(result.label.clone()),
                properties,
            });
        }
        updates.push(source_update);
    }

    // Collection audit: the collection records that this chunk was processed.
    let mut audit = AdditiveUpdate::new(input.collection_id);
    let mut audit_properties = Map::new();
    audit_properties.insert(
        "relationship_type".to_string(),
        JsonValue::String("processed_chunk".to_string()),
    );
    audit_properties.insert("processed_at".to_string(), JsonValue::String(extracted_at));
    audit.relationships_add.push(RelationshipAdd {
        predicate: "contains".to_string(),
        peer: input.source.id.clone(),
        direction: Direction::Outgoing,
        peer_label: Some(input.source.label.clone()),
        properties: audit_properties,
    });
    updates.push(audit);

    updates
}
