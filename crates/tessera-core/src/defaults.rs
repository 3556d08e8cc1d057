//! Centralized default constants for tessera.
//!
//! **This module is the single source of truth** for shared default values.
//! All crates reference these constants instead of defining their own magic
//! numbers. When adding new constants, place them in the appropriate section
//! and document the rationale for the chosen value.

// =============================================================================
// CHUNK TEXT
// =============================================================================

/// Minimum chunk text length in characters; shorter inputs are rejected.
pub const CHUNK_MIN_CHARS: usize = 50;

/// Maximum chunk text size in bytes; larger inputs are rejected.
pub const CHUNK_MAX_BYTES: usize = 500 * 1024;

/// Chunk size above which a warning is logged (processing continues).
pub const CHUNK_WARN_BYTES: usize = 100 * 1024;

// =============================================================================
// QUOTES
// =============================================================================

/// Maximum extracted quote length in characters. Longer spans almost always
/// mean the end marker matched far past the intended sentence.
pub const QUOTE_MAX_CHARS: usize = 500;

// =============================================================================
// LLM
// =============================================================================

/// Default model endpoint base URL.
pub const LLM_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default generation model.
pub const LLM_MODEL: &str = "gemini-2.0-flash";

/// Per-attempt request timeout in seconds.
pub const LLM_TIMEOUT_SECS: u64 = 120;

/// Maximum retries on transient failures (429, 5xx, network, timeout).
/// Total HTTP requests per call is therefore at most `LLM_MAX_RETRIES + 1`.
pub const LLM_MAX_RETRIES: u32 = 3;

/// Exponential backoff base delay in milliseconds.
pub const LLM_BACKOFF_BASE_MS: u64 = 15_000;

/// Exponential backoff delay cap in milliseconds.
pub const LLM_BACKOFF_CAP_MS: u64 = 120_000;

/// Generation temperature. Extraction wants near-deterministic output.
pub const LLM_TEMPERATURE: f32 = 0.2;

/// Output token cap. Generous: a dense chunk can emit hundreds of operations.
pub const LLM_MAX_OUTPUT_TOKENS: u32 = 65_536;

/// Prompt token rate in USD per million tokens (informational cost accounting).
pub const LLM_PROMPT_RATE_PER_MILLION: f64 = 0.10;

/// Completion token rate in USD per million tokens.
pub const LLM_COMPLETION_RATE_PER_MILLION: f64 = 0.40;

// =============================================================================
// CHECK-CREATE
// =============================================================================

/// Settle delay after create, before the confirming lookup (milliseconds).
/// Lets peer writers in the race window finish their own create+index.
pub const SETTLE_DELAY_MS: u64 = 100;

/// Upper bound (exclusive) of the jitter added to each settle/re-check delay.
/// Desynchronizes cohorts of workers that started at the same instant.
pub const SETTLE_JITTER_MS: u64 = 100;

/// Delay before each confirming-lookup retry (milliseconds).
pub const RECHECK_DELAY_MS: u64 = 150;

/// Maximum confirming-lookup retries when only our own entity is visible.
pub const LOOKUP_MAX_RETRIES: u32 = 2;

/// Result cap for the confirming lookup.
pub const LOOKUP_LIMIT: usize = 10;

/// Concurrency ceiling for batch check-create. Unbounded parallelism trips
/// graph-service rate limits and widens the race window.
pub const CHECK_CREATE_CONCURRENCY: usize = 20;

// =============================================================================
// UPDATES
// =============================================================================

/// Maximum entries per additive-update batch request.
pub const UPDATE_BATCH_MAX: usize = 1000;

// =============================================================================
// GRAPH SERVICE
// =============================================================================

/// Graph service request timeout in seconds.
pub const GRAPH_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// WORKER
// =============================================================================

/// Maximum concurrent jobs per worker.
pub const JOB_MAX_CONCURRENT: usize = 4;

/// Job queue depth before the host's submissions start to backpressure.
pub const JOB_QUEUE_CAPACITY: usize = 64;

/// Event bus broadcast channel capacity.
pub const EVENT_BUS_CAPACITY: usize = 256;
