//! A scripted provider for tests.
//!
//! Replays a fixed queue of responses, records every request it receives,
//! and can be told to fail the next call. `&self` methods only, so tests
//! can share it behind a trait object.

use async_trait::async_trait;
use braid_core::error::ProviderError;
use braid_core::message::{ChatMessage, Role};
use braid_core::provider::{CompletionRequest, CompletionResponse, Provider, Usage};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Replies with "scripted reply" once its queue is drained.
const DEFAULT_REPLY: &str = "scripted reply";

struct ScriptState {
    queue: VecDeque<String>,
    pending_failure: Option<String>,
    requests: Vec<CompletionRequest>,
}

/// A provider that replays canned responses.
pub struct ScriptedProvider {
    state: Mutex<ScriptState>,
}

impl ScriptedProvider {
    /// A provider with an empty queue; every call gets the default reply.
    pub fn new() -> Self {
        Self::with_responses(Vec::<String>::new())
    }

    /// A provider that replays `responses` in order, then falls back to
    /// the default reply.
    pub fn with_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            state: Mutex::new(ScriptState {
                queue: responses.into_iter().map(Into::into).collect(),
                pending_failure: None,
                requests: Vec::new(),
            }),
        }
    }

    /// Make the next `complete()` call fail with a network error.
    pub fn fail_next(&self, message: impl Into<String>) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.pending_failure = Some(message.into());
    }

    /// How many times `complete()` has been called.
    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).requests.len()
    }

    /// Every request received so far, in call order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).requests.clone()
    }
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<CompletionResponse, ProviderError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.requests.push(request.clone());

        if let Some(message) = state.pending_failure.take() {
            return Err(ProviderError::Network(message));
        }

        let content = state
            .queue
            .pop_front()
            .unwrap_or_else(|| DEFAULT_REPLY.to_string());

        Ok(CompletionResponse {
            message: ChatMessage {
                role: Role::Assistant,
                content,
            },
            usage: Some(Usage {
                prompt_tokens: 0,
                completion_tokens: 0,
                total_tokens: 0,
            }),
            model: request.model,
        })
    }
}
