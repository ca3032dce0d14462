//! LLM provider contract.
//!
//! Concrete wire formats (Anthropic, OpenAI) live in adapter crates; the
//! orchestrator depends only on the request/response contract here, which
//! must round-trip tool-use blocks.

pub mod anthropic;
pub mod provider;
pub mod retry;
pub mod types;

pub use anthropic::AnthropicProvider;
pub use provider::{ChatProvider, ProviderError, ProviderResult};
pub use retry::RetryingProvider;
pub use types::{
    ChatMessage, CompletionRequest, CompletionResponse, MessageRole, StopReason, TokenUsage,
    ToolCall, ToolResultBlock,
};
