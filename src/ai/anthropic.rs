//! Anthropic Messages API adapter.
//!
//! Translates the provider contract to the Messages wire format, including
//! tool-use round-tripping: tool definitions out, `tool_use` blocks back as
//! [`ToolCall`]s, and `tool_result` blocks on user turns keyed by call id.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use super::provider::{ChatProvider, ProviderError, ProviderResult};
use super::types::{
    ChatMessage, CompletionRequest, CompletionResponse, MessageRole, StopReason, TokenUsage,
    ToolCall,
};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

// ─── Wire types ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    max_tokens: u64,
    system: String,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: Vec<ApiBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

#[derive(Debug, Serialize)]
struct ApiTool {
    name: String,
    description: String,
    input_schema: Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ResponseBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: ApiUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: Value },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

// ─── Provider ────────────────────────────────────────────────────────────────

pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(DEFAULT_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn to_wire(request: &CompletionRequest) -> ApiRequest {
        let messages = request.messages.iter().map(to_api_message).collect();
        ApiRequest {
            model: request.model.clone(),
            max_tokens: request.max_tokens.max(1),
            system: request.system_prompt.clone(),
            messages,
            tools: request
                .tools
                .iter()
                .map(|t| ApiTool {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    input_schema: t.parameters.clone(),
                })
                .collect(),
        }
    }
}

fn to_api_message(message: &ChatMessage) -> ApiMessage {
    let mut content = Vec::new();
    if !message.content.is_empty() {
        content.push(ApiBlock::Text {
            text: message.content.clone(),
        });
    }
    for call in &message.tool_calls {
        content.push(ApiBlock::ToolUse {
            id: call.id.clone(),
            name: call.name.clone(),
            input: call.args.clone(),
        });
    }
    for result in &message.tool_results {
        content.push(ApiBlock::ToolResult {
            tool_use_id: result.tool_call_id.clone(),
            content: result.content.clone(),
            is_error: result.is_error,
        });
    }
    ApiMessage {
        role: match message.role {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        },
        content,
    }
}

fn from_wire(response: ApiResponse) -> CompletionResponse {
    let mut content = String::new();
    let mut tool_calls = Vec::new();
    for block in response.content {
        match block {
            ResponseBlock::Text { text } => {
                if !content.is_empty() {
                    content.push('\n');
                }
                content.push_str(&text);
            }
            ResponseBlock::ToolUse { id, name, input } => {
                tool_calls.push(ToolCall {
                    id,
                    name,
                    args: input,
                });
            }
            ResponseBlock::Other => {}
        }
    }
    let stop_reason = match response.stop_reason.as_deref() {
        Some("end_turn") => StopReason::EndTurn,
        Some("tool_use") => StopReason::ToolUse,
        Some("max_tokens") => StopReason::MaxTokens,
        _ => StopReason::Other,
    };
    CompletionResponse {
        content,
        tool_calls,
        usage: TokenUsage {
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
        },
        stop_reason,
    }
}

#[async_trait]
impl ChatProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, request: CompletionRequest) -> ProviderResult<CompletionResponse> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = Self::to_wire(&request);
        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Cancelled
                } else {
                    ProviderError::Transient {
                        status: 0,
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(ProviderError::Transient {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        if !status.is_success() {
            return Err(ProviderError::Api(format!(
                "anthropic returned {status}: {}",
                response.text().await.unwrap_or_default()
            )));
        }

        let parsed: ApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Api(format!("malformed response: {e}")))?;
        Ok(from_wire(parsed))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::types::ToolResultBlock;
    use crate::tools::ToolDefinition;
    use serde_json::json;

    #[test]
    fn tool_use_serializes_on_assistant_turns() {
        let request = CompletionRequest {
            system_prompt: "sys".to_string(),
            messages: vec![
                ChatMessage::user("go"),
                ChatMessage::assistant_with_calls(
                    "checking",
                    vec![ToolCall {
                        id: "t1".to_string(),
                        name: "kubectl.get".to_string(),
                        args: json!({"resource": "pods"}),
                    }],
                ),
                ChatMessage::tool_results(vec![ToolResultBlock {
                    tool_call_id: "t1".to_string(),
                    content: "ok".to_string(),
                    is_error: false,
                }]),
            ],
            tools: vec![ToolDefinition {
                name: "kubectl.get".to_string(),
                description: "read".to_string(),
                parameters: json!({"type": "object"}),
            }],
            model: "claude-sonnet-4-5".to_string(),
            max_tokens: 1024,
        };

        let wire = serde_json::to_value(AnthropicProvider::to_wire(&request)).unwrap();
        assert_eq!(wire["system"], "sys");
        assert_eq!(wire["messages"][1]["content"][1]["type"], "tool_use");
        assert_eq!(wire["messages"][2]["content"][0]["type"], "tool_result");
        assert_eq!(wire["messages"][2]["content"][0]["tool_use_id"], "t1");
        assert_eq!(wire["tools"][0]["name"], "kubectl.get");
    }

    #[test]
    fn empty_tools_are_omitted_from_the_wire() {
        let request = CompletionRequest {
            system_prompt: String::new(),
            messages: vec![ChatMessage::user("report now")],
            tools: vec![],
            model: "m".to_string(),
            max_tokens: 64,
        };
        let wire = serde_json::to_value(AnthropicProvider::to_wire(&request)).unwrap();
        assert!(wire.get("tools").is_none());
    }

    #[test]
    fn response_parses_text_and_tool_use() {
        let raw = json!({
            "content": [
                {"type": "text", "text": "let me check"},
                {"type": "tool_use", "id": "t9", "name": "kubectl.get", "input": {"resource": "pods"}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 12, "output_tokens": 34}
        });
        let parsed: ApiResponse = serde_json::from_value(raw).unwrap();
        let response = from_wire(parsed);
        assert_eq!(response.content, "let me check");
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].id, "t9");
        assert_eq!(response.stop_reason, StopReason::ToolUse);
        assert_eq!(response.usage.total(), 46);
    }

    #[test]
    fn unknown_blocks_are_ignored() {
        let raw = json!({
            "content": [
                {"type": "thinking", "thinking": "hmm"},
                {"type": "text", "text": "done"}
            ],
            "stop_reason": "end_turn"
        });
        let parsed: ApiResponse = serde_json::from_value(raw).unwrap();
        let response = from_wire(parsed);
        assert_eq!(response.content, "done");
        assert!(response.tool_calls.is_empty());
    }
}
