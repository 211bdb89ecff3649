//! Uniform LLM call surface over OpenAI-compatible and Anthropic wire
//! shapes (spec §4.A Provider Adapter).

use crate::chat::{ChatRequest, ChatResponse};
use crate::error::ProviderError;
use async_trait::async_trait;

/// Invoked once per streamed token when `chat_stream` is actually
/// streaming (spec §4.A).
pub trait TokenSink: Send + Sync {
    fn on_token(&self, token: &str);
}

impl<F: Fn(&str) + Send + Sync> TokenSink for F {
    fn on_token(&self, token: &str) {
        self(token)
    }
}

/// One adapter variant per wire protocol (spec §4.A: two variants
/// suffice, `openai-compatible` and `anthropic`).
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Adapter/provider name, used for logging and chain construction.
    fn name(&self) -> &str;

    fn supports_tools(&self) -> bool {
        true
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError>;

    /// Streams tokens to `sink` when possible. Falls back to a single
    /// non-streaming call when `request.tools` is non-empty, because
    /// tool-call extraction requires the complete response (spec §4.A).
    async fn chat_stream(
        &self,
        request: &ChatRequest,
        sink: &dyn TokenSink,
    ) -> Result<ChatResponse, ProviderError> {
        if !request.tools.is_empty() || !self.supports_streaming() {
            let resp = self.chat(request).await?;
            sink.on_token(&resp.content);
            return Ok(resp);
        }
        self.chat_stream_impl(request, sink).await
    }

    /// Adapter-specific streaming implementation. The default falls back
    /// to a non-streaming call, mirroring the contract in `chat_stream`.
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
