//! Tool-local error type (spec §7: tool errors stay inside the loop).

use thiserror::Error;

/// Error surfaced from validating or invoking a tool.
///
/// Never propagated to the client as an HTTP error — the Agent Loop turns
/// this into a `tool` transcript row so the LLM can see it and retry or
/// give up (spec §4.C, §7).
#[derive(Debug, Error, Clone)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("schema validation failed: {0}")]
    SchemaValidation(String),

    #[error("confirmation required but denied: {0}")]
    ConfirmationDenied(String),

    #[error("execution error: {0}")]
    Execution(String),

    #[error("tool invocation timed out after {0:?}")]
    Timeout(std::time::Duration),
}
