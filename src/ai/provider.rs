//! The chat provider trait and its error model.

use async_trait::async_trait;
use thiserror::Error;

use super::types::{CompletionRequest, CompletionResponse};

/// Errors surfaced by a chat provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transient transport/API failure (HTTP 429, 5xx); eligible for retry.
    #[error("transient provider error (status {status}): {message}")]
    Transient { status: u16, message: String },

    /// Non-transient API failure; surfaces to the run.
    #[error("provider error: {0}")]
    Api(String),

    /// The run context was cancelled mid-call.
    #[error("provider call cancelled")]
    Cancelled,
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient { .. })
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// A model backend capable of tool-calling chat completions.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Provider identifier recorded in traces (`gen_ai.system`).
    fn name(&self) -> &str;

    /// Complete a conversation.  Implementations must round-trip tool-use
    /// blocks: tool calls out on assistant turns, tool results back in on
    /// user turns keyed by call id.
    async fn complete(&self, request: CompletionRequest) -> ProviderResult<CompletionResponse>;
}
