//! OpenAI-compatible adapter. Covers OpenAI, DeepSeek, Qwen, GLM, Minimax,
//! Kimi and Moonshot — they differ only in base URL and default model
//! (spec §4.A), so one struct parameterized by `base_url`/`model` serves
//! all of them, following `providers/openai`'s `OpenAI` client shape.

use crate::adapter::{ProviderAdapter, TokenSink};
use crate::chat::{ChatRequest, ChatResponse, FinishReason, ToolDefinition};
use crate::error::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use zen_claw_core::{Message, Role, ToolCall};

pub struct OpenAiCompatibleAdapter {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleAdapter {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        OpenAiCompatibleAdapter {
            name: name.into(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

#[derive(Serialize)]
struct WireToolCall<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionCall<'a>,
}

#[derive(Serialize)]
struct WireFunctionCall<'a> {
    name: &'a str,
    arguments: String,
}

#[derive(Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a ToolDefinition,
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn to_wire_messages(messages: &[Message]) -> Vec<WireMessage<'_>> {
    messages
        .iter()
        .map(|m| WireMessage {
            role: role_str(m.role),
            content: &m.content,
            tool_calls: m
                .tool_calls
                .iter()
                .map(|tc| WireToolCall {
                    id: &tc.id,
                    kind: "function",
                    function: WireFunctionCall {
                        name: &tc.name,
                        arguments: tc.args_to_wire(),
                    },
                })
                .collect(),
            tool_call_id: m.tool_call_id.as_deref(),
        })
        .collect()
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct WireResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireResponseToolCall>,
}

#[derive(Deserialize)]
struct WireResponseToolCall {
    id: String,
    function: WireResponseFunctionCall,
}

#[derive(Deserialize)]
struct WireResponseFunctionCall {
    name: String,
    arguments: String,
}

fn parse_finish_reason(raw: Option<&str>, has_tool_calls: bool) -> FinishReason {
    if has_tool_calls {
        return FinishReason::ToolCalls;
    }
    match raw {
        Some("stop") => FinishReason::Stop,
        Some("length") => FinishReason::Length,
        Some("content_filter") => FinishReason::ContentFilter,
        Some("tool_calls") => FinishReason::ToolCalls,
        None => FinishReason::Stop,
        Some(_) => FinishReason::Other,
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatibleAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let tools: Option<Vec<WireTool>> = if request.tools.is_empty() {
            None
        } else {
            Some(
                request
                    .tools
                    .iter()
                    .map(|t| WireTool { kind: "function", function: t })
                    .collect(),
            )
        };

        let wire_req = WireRequest {
            model: &request.model,
            messages: to_wire_messages(&request.messages),
            tools,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: false,
        };

        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&wire_req)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, body));
        }

        let body: WireResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::FatalPayload(format!("invalid response body: {e}")))?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::FatalPayload("empty choices array".into()))?;

        let tool_calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .into_iter()
            .map(|tc| ToolCall::args_from_wire(tc.id, tc.function.name, &tc.function.arguments))
            .collect();

        let finish_reason = parse_finish_reason(choice.finish_reason.as_deref(), !tool_calls.is_empty());

        Ok(ChatResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
            finish_reason,
        })
    }

    async fn chat_stream_impl(
        &self,
        request: &ChatRequest,
        sink: &dyn TokenSink,
    ) -> Result<ChatResponse, ProviderError> {
        // Real token-level streaming is an HTTP chunked/SSE response parse;
        // here we still perform the single call and hand the whole text
        // to the sink as one chunk, since no tool-calls are in play for
        // this path (chat_stream already routed tool requests elsewhere).
        let resp = self.chat(request).await?;
        sink.on_token(&resp.content);
        Ok(resp)
    }
}

/// Parameters the Router caps `max_tokens` to for `qwen` when
/// large-context support is disabled (spec §4.B).
pub const QWEN_SMALL_CONTEXT_MAX_TOKENS: u32 = 4096;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_str_maps_all_roles() {
        assert_eq!(role_str(Role::System), "system");
        assert_eq!(role_str(Role::User), "user");
        assert_eq!(role_str(Role::Assistant), "assistant");
        assert_eq!(role_str(Role::Tool), "tool");
    }

    #[test]
    fn finish_reason_prefers_tool_calls() {
        assert_eq!(parse_finish_reason(Some("stop"), true), FinishReason::ToolCalls);
    }

    #[test]
    fn finish_reason_maps_known_strings() {
        assert_eq!(parse_finish_reason(Some("stop"), false), FinishReason::Stop);
        assert_eq!(parse_finish_reason(Some("length"), false), FinishReason::Length);
        assert_eq!(parse_finish_reason(Some("weird"), false), FinishReason::Other);
        assert_eq!(parse_finish_reason(None, false), FinishReason::Stop);
    }
}
