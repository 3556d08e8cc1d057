//! Error types for tessera.

use thiserror::Error;

/// Result type alias using tessera's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for tessera operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Job input rejected before any work was done
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Entity not found in the graph service
    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    /// LLM call failed after exhausting retries, or was rejected outright
    #[error("LLM error: {0}")]
    Llm(String),

    /// Non-retryable LLM response (4xx other than 429)
    #[error("LLM rejected request: HTTP {status}: {body}")]
    LlmRejected { status: u16, body: String },

    /// Model output could not be parsed as JSON
    #[error("Parse error: {0}")]
    Parse(String),

    /// Graph service returned a failure
    #[error("Graph error: {0}")]
    Graph(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable code for the host's `{error: {code, message}}`
    /// log entry.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "invalid_input",
            Error::EntityNotFound(_) => "entity_not_found",
            Error::Llm(_) => "llm_error",
            Error::LlmRejected { .. } => "llm_rejected",
            Error::Parse(_) => "parse_error",
            Error::Graph(_) => "graph_error",
            Error::Request(_) => "request_error",
            Error::Config(_) => "config_error",
            Error::Serialization(_) => "serialization_error",
            Error::Internal(_) => "internal_error",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
