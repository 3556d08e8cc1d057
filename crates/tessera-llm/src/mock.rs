//! Mock LLM backend for deterministic testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tessera_core::{Error, LlmBackend, LlmResponse, LlmUsage, Result};

/// One recorded call to the mock backend.
#[derive(Debug, Clone)]
pub struct MockLlmCall {
    pub system_prompt: String,
    pub user_prompt: String,
}

#[derive(Default)]
struct MockState {
    /// Scripted responses, consumed front-to-back. When empty, the default
    /// response is returned.
    scripted: VecDeque<Result<LlmResponse>>,
    calls: Vec<MockLlmCall>,
}

/// Mock LLM backend returning scripted responses and logging calls.
#[derive(Clone)]
pub struct MockLlmBackend {
    state: Arc<Mutex<MockState>>,
    default_content: Arc<str>,
}

impl Default for MockLlmBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLlmBackend {
    /// Create a mock whose default response is an empty operations array.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            default_content: Arc::from("[]"),
        }
    }

    /// Set the content returned when no scripted response remains.
    pub fn with_default_content(mut self, content: impl Into<String>) -> Self {
        let content: String = content.into();
        self.default_content = Arc::from(content.as_str());
        self
    }

    /// Queue a successful response with the given content.
    pub fn push_content(&self, content: impl Into<String>) {
        self.state
            .lock()
            .unwrap()
            .scripted
            .push_back(Ok(LlmResponse {
                content: content.into(),
                usage: LlmUsage {
                    prompt_tokens: 100,
                    completion_tokens: 50,
                    total_tokens: 150,
                    cost: 0.0001,
                },
            }));
    }

    /// Queue a failure.
    pub fn push_error(&self, message: impl Into<String>) {
        self.state
            .lock()
            .unwrap()
            .scripted
            .push_back(Err(Error::Llm(message.into())));
    }

    /// All calls made so far.
    pub fn calls(&self) -> Vec<MockLlmCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Number of calls made so far.
    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }
}

#[async_trait]
impl LlmBackend for MockLlmBackend {
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<LlmResponse> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(MockLlmCall {
            system_prompt: system_prompt.to_string(),
            user_prompt: user_prompt.to_string(),
        });
        match state.scripted.pop_front() {
            Some(response) => response,
            None => Ok(LlmResponse {
                content: self.default_content.to_string(),
                usage: LlmUsage::default(),
            }),
        }
    }
}
