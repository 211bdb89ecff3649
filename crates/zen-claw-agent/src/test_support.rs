//! Deterministic mock providers for Agent Loop / Consensus Engine tests.
//! Grounded on the idea of a scripted adapter instead of hitting a
//! network — no test in this crate makes an HTTP call.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use zen_claw_core::ToolCall;
use zen_claw_provider::{ChatRequest, ChatResponse, FinishReason, ProviderAdapter, ProviderError};

/// One scripted response (or error) a [`MockProvider`] returns in sequence
/// across successive calls. The last entry repeats once exhausted.
pub enum Scripted {
    Text(&'static str),
    ToolCalls(Vec<ToolCall>),
    Err(ProviderError),
}

pub struct MockProvider {
    name: String,
    script: Mutex<Vec<Scripted>>,
    calls: AtomicUsize,
}

impl MockProvider {
    pub fn new(name: impl Into<String>, script: Vec<Scripted>) -> Self {
        MockProvider { name: name.into(), script: Mutex::new(script), calls: AtomicUsize::new(0) }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderAdapter for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn chat(&self, _request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let idx = self.calls.fetch_add(1, Ordering::SeqCst);
        let script = self.script.lock().unwrap();
        let step = script.get(idx).unwrap_or_else(|| script.last().expect("non-empty script"));
        match step {
            Scripted::Text(s) => {
                Ok(ChatResponse { content: s.to_string(), tool_calls: Vec::new(), finish_reason: FinishReason::Stop })
            }
            Scripted::ToolCalls(calls) => Ok(ChatResponse {
                content: String::new(),
                tool_calls: calls.clone(),
                finish_reason: FinishReason::ToolCalls,
            }),
            Scripted::Err(e) => Err(e.clone()),
        }
    }
}

pub fn provider_descriptor(name: &str) -> zen_claw_core::ProviderDescriptor {
    zen_claw_core::ProviderDescriptor {
        name: name.to_string(),
        base_url: "https://example.invalid".to_string(),
        default_model: "mock-model".to_string(),
        auth_key: Some("test-key".to_string()),
        context_tier: zen_claw_core::ContextTier::Medium,
        supports_tools: true,
        supports_streaming: true,
    }
}
