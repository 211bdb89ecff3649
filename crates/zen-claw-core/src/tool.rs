//! Tool descriptor data model (spec §3 ToolDescriptor, §4.C Tool Registry).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Safety classification consulted by the Agent Loop before invoking a
/// tool that mutates state or reaches outside the process (spec §4.C, §5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyClass {
    Read,
    Write,
    Exec,
    Network,
}

impl SafetyClass {
    /// Whether a `Confirmer` should be consulted before invoking a tool
    /// with this classification (spec §4.C).
    pub fn requires_confirmation(&self) -> bool {
        matches!(self, SafetyClass::Write | SafetyClass::Exec | SafetyClass::Network)
    }
}

/// `{name, description, json-schema-of-parameters, safety-class}` presented
/// to LLMs as a tool definition (spec §3 ToolDescriptor).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters_schema: Value,
    pub safety_class: SafetyClass,
}

/// Outcome of invoking a tool: always surfaced to the LLM, never bubbled
/// up as a client-facing error (spec §7: tool errors stay inside the loop).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub ok: bool,
    pub text: String,
}

impl ToolOutcome {
    pub fn ok(text: impl Into<String>) -> Self {
        ToolOutcome { ok: true, text: text.into() }
    }

    pub fn error(text: impl Into<String>) -> Self {
        ToolOutcome { ok: false, text: text.into() }
    }
}
