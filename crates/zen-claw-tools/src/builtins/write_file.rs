use crate::builtins::schema_value;
use crate::error::ToolError;
use crate::tool::{resolve_path, Tool};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use zen_claw_core::{SafetyClass, ToolOutcome};

#[derive(Debug, Deserialize, JsonSchema)]
struct Args {
    /// File to write, resolved against the session's working_dir. Parent
    /// directories are not created.
    path: String,
    /// Full replacement contents of the file.
    content: String,
}

/// Overwrites (or creates) a text file with new contents. `SafetyClass::Write`
/// means the Agent Loop consults the `Confirmer` before this ever runs.
pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Overwrite a text file with new contents"
    }

    fn parameters_schema(&self) -> Value {
        schema_value::<Args>()
    }

    fn safety_class(&self) -> SafetyClass {
        SafetyClass::Write
    }

    async fn invoke(&self, args: Value, working_dir: &Path) -> Result<ToolOutcome, ToolError> {
        let args: Args = serde_json::from_value(args)
            .map_err(|e| ToolError::SchemaValidation(e.to_string()))?;
        let target = resolve_path(working_dir, &args.path);

        match tokio::fs::write(&target, args.content.as_bytes()).await {
            Ok(()) => Ok(ToolOutcome::ok(format!("wrote {} bytes to {}", args.content.len(), target.display()))),
            Err(e) => Ok(ToolOutcome::error(format!("{}: {e}", target.display()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let tool = WriteFileTool;
        let outcome = tool
            .invoke(
                serde_json::json!({"path": "out.txt", "content": "data"}),
                dir.path(),
            )
            .await
            .unwrap();
        assert!(outcome.ok);
        assert_eq!(std::fs::read_to_string(dir.path().join("out.txt")).unwrap(), "data");
    }

    #[tokio::test]
    async fn missing_parent_directory_is_a_soft_error() {
        let dir = tempfile::tempdir().unwrap();
        let tool = WriteFileTool;
        let outcome = tool
            .invoke(
                serde_json::json!({"path": "no/such/dir/out.txt", "content": "data"}),
                dir.path(),
            )
            .await
            .unwrap();
        assert!(!outcome.ok);
    }

    #[test]
    fn safety_class_is_write() {
        assert_eq!(WriteFileTool.safety_class(), SafetyClass::Write);
    }
}
