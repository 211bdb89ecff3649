//! Provider Adapter (spec §4.A) and Provider Router (spec §4.B).

pub mod adapter;
pub mod anthropic;
pub mod chat;
pub mod context;
pub mod error;
pub mod openai;
pub mod router;

pub use adapter::{ProviderAdapter, TokenSink};
pub use anthropic::AnthropicAdapter;
pub use chat::{ChatRequest, ChatResponse, FinishReason, ReasoningEffort, ToolDefinition};
pub use context::adapt_window;
pub use error::ProviderError;
pub use openai::OpenAiCompatibleAdapter;
pub use router::ProviderRouter;
