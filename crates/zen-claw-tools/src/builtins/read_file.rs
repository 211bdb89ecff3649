use crate::builtins::schema_value;
use crate::error::ToolError;
use crate::tool::{resolve_path, Tool};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use zen_claw_core::{SafetyClass, ToolOutcome};

/// Files larger than this are rejected rather than dumped whole into the
/// transcript, where they'd blow out the context window.
const MAX_READ_BYTES: u64 = 256 * 1024;

#[derive(Debug, Deserialize, JsonSchema)]
struct Args {
    /// File to read, resolved against the session's working_dir.
    path: String,
}

/// Reads a UTF-8 text file in full.
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a text file"
    }

    fn parameters_schema(&self) -> Value {
        schema_value::<Args>()
    }

    fn safety_class(&self) -> SafetyClass {
        SafetyClass::Read
    }

    async fn invoke(&self, args: Value, working_dir: &Path) -> Result<ToolOutcome, ToolError> {
        let args: Args = serde_json::from_value(args)
            .map_err(|e| ToolError::SchemaValidation(e.to_string()))?;
        let target = resolve_path(working_dir, &args.path);

        let meta = tokio::fs::metadata(&target)
            .await
            .map_err(|e| ToolError::Execution(format!("{}: {e}", target.display())))?;
        if meta.len() > MAX_READ_BYTES {
            return Ok(ToolOutcome::error(format!(
                "{} is {} bytes, exceeds the {MAX_READ_BYTES} byte limit",
                target.display(),
                meta.len()
            )));
        }

        let bytes = tokio::fs::read(&target)
            .await
            .map_err(|e| ToolError::Execution(e.to_string()))?;
        match String::from_utf8(bytes) {
            Ok(text) => Ok(ToolOutcome::ok(text)),
            Err(_) => Ok(ToolOutcome::error(format!("{} is not valid UTF-8", target.display()))),
        }
    }
}
