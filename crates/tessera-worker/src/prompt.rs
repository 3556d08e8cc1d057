//! Prompt composition for the extraction call.

use std::fmt::Write as _;

use tessera_core::{Direction, EntityContext};

/// System instructions: the operation format the parser expects.
pub const SYSTEM_PROMPT: &str = r#"You are a knowledge-graph extraction engine. Given one chunk of a document, emit the entities, properties, and relationships it contains as a JSON array of operations. Output ONLY the JSON array, no prose.

Operation shapes:

{"operation": "create", "label": "<entity name>", "entity_type": "<person|place|organization|ship|event|concept|...>", "description": "<one sentence>", "properties": {"<key>": "<value>", ...}}
{"operation": "add_relationship", "subject": "<entity label>", "predicate": "<verb phrase, snake_case>", "target": "<entity label>", "description": "<one sentence>", "quote_start": "<first few words of the supporting passage>", "quote_end": "<last few words of the supporting passage>"}

Rules:
- Emit a create for every entity of lasting significance in the chunk. Include at least two properties per create when the text supports them.
- Use the same label spelling for an entity everywhere it appears in your output.
- Relationship subjects and targets must refer to entities by label; prefer entities you also created.
- quote_start and quote_end must be short phrases copied verbatim from the chunk, bracketing the passage that supports the relationship.
- Do not invent facts that are not in the chunk.
- If the chunk contains nothing worth extracting, emit []."#;

/// Compose the user prompt: the chunk's graph context followed by its text.
pub fn compose_user_prompt(context: &EntityContext, chunk_text: &str) -> String {
    let mut prompt = String::with_capacity(chunk_text.len() + 512);

    prompt.push_str("## Source chunk\n");
    let _ = writeln!(prompt, "- id: {}", context.id);
    let _ = writeln!(prompt, "- type: {}", context.entity_type);
    if !context.label.is_empty() {
        let _ = writeln!(prompt, "- label: {}", context.label);
    }
    if !context.description.is_empty() {
        let _ = writeln!(prompt, "- description: {}", context.description);
    }
    for (key, value) in &context.properties {
        let _ = writeln!(prompt, "- {}: {}", key, value);
    }

    if !context.relationships.is_empty() {
        prompt.push_str("\n## Existing relationships\n");
        for rel in &context.relationships {
            let arrow = match rel.direction {
                Direction::Outgoing => "->",
                Direction::Incoming => "<-",
            };
            let peer = rel.peer_label.as_deref().unwrap_or(&rel.peer);
            let _ = writeln!(prompt, "- {} {} {}", rel.predicate, arrow, peer);
        }
    }

    prompt.push_str("\n## Chunk text\n");
    prompt.push_str(chunk_text);
    prompt
}
