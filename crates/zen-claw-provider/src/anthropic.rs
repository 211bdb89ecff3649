//! Anthropic adapter. Distinct request shape from the OpenAI-compatible
//! family: `system` is a top-level field rather than a message row, and
//! the last content block can carry a prompt-caching marker (spec §4.A),
//! following `providers/anthropic`'s request builder.

use crate::adapter::{ProviderAdapter, TokenSink};
use crate::chat::{ChatRequest, ChatResponse, FinishReason, ToolDefinition};
use crate::error::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use zen_claw_core::{Message, Role, ToolCall};

pub struct AnthropicAdapter {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicAdapter {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        AnthropicAdapter {
            base_url: base_url.into(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/messages", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Serialize)]
struct CacheControl {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ContentBlock<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "id")]
    tool_use_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "name")]
    tool_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "input")]
    tool_input: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "tool_use_id")]
    tool_result_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "content")]
    tool_result_content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "cache_control")]
    cache_control: Option<CacheControl>,
}

#[derive(Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: Vec<ContentBlock<'a>>,
}

#[derive(Serialize)]
struct AnthropicTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a serde_json::Value,
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<AnthropicTool<'a>>>,
    stream: bool,
}

/// Splits a leading system row out of `messages` (Anthropic wants it as a
/// top-level field, not a message row) and converts the rest, marking the
/// final content block of the final message with a cache_control marker
/// (prompt caching, spec §4.A) so repeated long-context calls are cheaper.
fn build_request<'a>(request: &'a ChatRequest, tools: Option<Vec<AnthropicTool<'a>>>) -> WireRequest<'a> {
    let mut system: Option<&str> = None;
    let mut rows: Vec<&Message> = Vec::with_capacity(request.messages.len());
    for (i, m) in request.messages.iter().enumerate() {
        if i == 0 && m.role == Role::System {
            system = Some(&m.content);
        } else {
            rows.push(m);
        }
    }

    let last_idx = rows.len().saturating_sub(1);
    let messages = rows
        .into_iter()
        .enumerate()
        .map(|(i, m)| {
            let mark_cache = i == last_idx;
            AnthropicMessage {
                role: if m.role == Role::Tool { "user" } else { role_str(m.role) },
                content: to_content_blocks(m, mark_cache),
            }
        })
        .collect();

    WireRequest {
        model: &request.model,
        messages,
        system,
        max_tokens: request.max_tokens,
        temperature: request.temperature,
        tools,
        stream: false,
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::User | Role::Tool => "user",
        Role::Assistant => "assistant",
        Role::System => "user",
    }
}

fn to_content_blocks(m: &Message, mark_cache: bool) -> Vec<ContentBlock<'_>> {
    let cache = |is_last_block: bool| {
        if mark_cache && is_last_block {
            Some(CacheControl { kind: "ephemeral" })
        } else {
            None
        }
    };

    if m.role == Role::Tool {
        return vec![ContentBlock {
            kind: "tool_result",
            text: None,
            tool_use_id: None,
            tool_name: None,
            tool_input: None,
            tool_result_id: m.tool_call_id.as_deref(),
            tool_result_content: Some(&m.content),
            cache_control: cache(true),
        }];
    }

    if !m.tool_calls.is_empty() {
        return m
            .tool_calls
            .iter()
            .enumerate()
            .map(|(i, tc)| ContentBlock {
                kind: "tool_use",
                text: None,
                tool_use_id: Some(&tc.id),
                tool_name: Some(&tc.name),
                tool_input: Some(tc.args.clone()),
                tool_result_id: None,
                tool_result_content: None,
                cache_control: cache(i == m.tool_calls.len() - 1),
            })
            .collect();
    }

    vec![ContentBlock {
        kind: "text",
        text: Some(&m.content),
        tool_use_id: None,
        tool_name: None,
        tool_input: None,
        tool_result_id: None,
        tool_result_content: None,
        cache_control: cache(true),
    }]
}

#[derive(Deserialize)]
struct WireResponse {
    content: Vec<ResponseBlock>,
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: serde_json::Value },
    #[serde(other)]
    Other,
}

fn parse_finish_reason(raw: Option<&str>, has_tool_calls: bool) -> FinishReason {
    if has_tool_calls {
        return FinishReason::ToolCalls;
    }
    match raw {
        Some("end_turn") | Some("stop_sequence") => FinishReason::Stop,
        Some("max_tokens") => FinishReason::Length,
        Some("tool_use") => FinishReason::ToolCalls,
        None => FinishReason::Stop,
        Some(_) => FinishReason::Other,
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let tools: Option<Vec<AnthropicTool>> = if request.tools.is_empty() {
            None
        } else {
            Some(
                request
                    .tools
                    .iter()
                    .map(|t: &ToolDefinition| AnthropicTool {
                        name: &t.name,
                        description: &t.description,
                        input_schema: &t.parameters,
                    })
                    .collect(),
            )
        };

        let wire_req = build_request(request, tools);

        let resp = self
            .client
            .post(self.endpoint())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
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

        let mut content = String::new();
        let mut tool_calls: Vec<ToolCall> = Vec::new();
        for block in body.content {
            match block {
                ResponseBlock::Text { text } => content.push_str(&text),
                ResponseBlock::ToolUse { id, name, input } => {
                    tool_calls.push(ToolCall { id, name, args: input })
                }
                ResponseBlock::Other => {}
            }
        }

        let finish_reason = parse_finish_reason(body.stop_reason.as_deref(), !tool_calls.is_empty());

        Ok(ChatResponse { content, tool_calls, finish_reason })
    }

    async fn chat_stream_impl(
        &self,
        request: &ChatRequest,
        sink: &dyn TokenSink,
    ) -> Result<ChatResponse, ProviderError> {
        let resp = self.chat(request).await?;
        sink.on_token(&resp.content);
        Ok(resp)
    }
}
