//! Tool Registry: name -> descriptor + executor (spec §4.C).

use crate::error::ToolError;
use crate::tool::Tool;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use zen_claw_core::{ToolDescriptor, ToolOutcome};

/// Per-step deadline for a tool invocation (spec §4.C default).
pub const DEFAULT_STEP_DEADLINE: Duration = Duration::from_secs(5 * 60);

/// Registry of available tools, keyed by name. A process-lifetime
/// singleton in production (spec §3 Lifecycle: "Tool descriptors are
/// process-lifetime constants").
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Arc<RwLock<HashMap<String, Arc<dyn Tool>>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        ToolRegistry::default()
    }

    /// A registry pre-populated with the built-in filesystem tools.
    pub fn with_builtins() -> Self {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(crate::builtins::ListDirTool));
        registry.register(Arc::new(crate::builtins::ReadFileTool));
        registry.register(Arc::new(crate::builtins::WriteFileTool));
        registry
    }

    pub fn register(&self, tool: Arc<dyn Tool>) {
        self.tools.write().unwrap().insert(tool.name().to_string(), tool);
    }

    /// Presented to LLMs as JSON-schema tool definitions (spec §4.C).
    pub fn list(&self) -> Vec<ToolDescriptor> {
        self.tools.read().unwrap().values().map(|t| t.descriptor()).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.read().unwrap().keys().cloned().collect()
    }

    pub fn find(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().unwrap().get(name).cloned()
    }

    /// Validates `args` against the tool's schema, then invokes it with a
    /// per-step deadline. Schema failure and execution failure are both
    /// returned as a `ToolOutcome { ok: false, .. }` rather than an `Err`,
    /// so the caller (Agent Loop) can always append a `tool` row — the
    /// only hard `Err` is an unknown tool name (spec §4.C: "schema failure
    /// is an error result (not a fatal), so the LLM sees the error and may
    /// self-correct").
    pub async fn invoke(
        &self,
        name: &str,
        args: Value,
        working_dir: &Path,
        deadline: Duration,
    ) -> Result<ToolOutcome, ToolError> {
        let tool = self.find(name).ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        if let Err(reason) = validate_required_fields(&tool.parameters_schema(), &args) {
            return Ok(ToolOutcome::error(format!("invalid arguments: {reason}")));
        }

        match tokio::time::timeout(deadline, tool.invoke(args, working_dir)).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(e)) => Ok(ToolOutcome::error(e.to_string())),
            Err(_elapsed) => Ok(ToolOutcome::error(format!(
                "tool '{name}' exceeded its {deadline:?} deadline"
            ))),
        }
    }
}

/// Minimal structural check: every name in the schema's top-level
/// `required` array must be present in `args`. Deliberately not a full
/// JSON-Schema validator — the schemas emitted by `schemars` for this
/// gateway's built-in tools are flat objects, and a full validator isn't
/// warranted for them.
fn validate_required_fields(schema: &Value, args: &Value) -> Result<(), String> {
    let Some(required) = schema.get("required").and_then(|r| r.as_array()) else {
        return Ok(());
    };
    let obj = args.as_object();
    for field in required {
        let Some(field) = field.as_str() else { continue };
        let present = obj.is_some_and(|o| o.contains_key(field));
        if !present {
            return Err(format!("missing required field '{field}'"));
        }
    }
    Ok(())
}
