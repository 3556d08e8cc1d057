//! Structured logging schema and field name constants for tessera.
//!
//! All crates use these constants for consistent structured logging fields so
//! log aggregation tools can query by standardized names across subsystems.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events, job/step completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration (per-operation, per-lookup) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Job UUID being processed.
pub const JOB_ID: &str = "job_id";

/// Graph entity id being operated on.
pub const ENTITY_ID: &str = "entity_id";

/// Graph collection id scoping the operation.
pub const COLLECTION_ID: &str = "collection_id";

/// Normalized entity label.
pub const LABEL: &str = "label";

/// Entity type tag.
pub const ENTITY_TYPE: &str = "entity_type";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Prompt token count reported by the model.
pub const PROMPT_TOKENS: &str = "prompt_tokens";

/// Completion token count reported by the model.
pub const COMPLETION_TOKENS: &str = "completion_tokens";

/// Informational request cost in USD.
pub const COST_USD: &str = "cost_usd";

// ─── Pipeline fields ───────────────────────────────────────────────────────

/// Number of operations parsed from the model output.
pub const OPERATION_COUNT: &str = "operation_count";

/// Number of entity create operations.
pub const CREATE_COUNT: &str = "create_count";

/// Number of relationship operations.
pub const RELATIONSHIP_COUNT: &str = "relationship_count";

/// Number of additive updates produced for a job.
pub const UPDATE_COUNT: &str = "update_count";

/// Index of an additive-update batch within a job.
pub const BATCH_INDEX: &str = "batch_index";

/// Number of creation races lost during check-create.
pub const RACES_LOST: &str = "races_lost";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
