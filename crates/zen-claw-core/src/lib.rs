//! Shared data model, wire alphabet and error types for the zen-claw
//! agentic gateway (spec §3, §7).

pub mod error;
pub mod events;
pub mod message;
pub mod provider;
pub mod session;
pub mod tool;

pub use error::GatewayError;
pub use events::StepEvent;
pub use message::{check_tool_call_closure, Message, Role, ToolCall};
pub use provider::{ContextTier, ProviderDescriptor};
pub use session::{ReasoningDepth, Session, SessionState, SessionStats, Task};
pub use tool::{SafetyClass, ToolDescriptor, ToolOutcome};
