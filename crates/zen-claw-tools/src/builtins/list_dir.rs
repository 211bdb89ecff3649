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
    /// Directory to list, resolved against the session's working_dir.
    path: String,
}

/// Lists the immediate entries of a directory.
pub struct ListDirTool;

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List the entries of a directory"
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

        let mut entries = tokio::fs::read_dir(&target)
            .await
            .map_err(|e| ToolError::Execution(format!("{}: {e}", target.display())))?;

        let mut names = Vec::new();
        loop {
            let next = entries
                .next_entry()
                .await
                .map_err(|e| ToolError::Execution(e.to_string()))?;
            match next {
                Some(entry) => names.push(entry.file_name().to_string_lossy().into_owned()),
                None => break,
            }
        }
        names.sort();
        Ok(ToolOutcome::ok(names.join("\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_entries_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "").unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();

        let tool = ListDirTool;
        let outcome = tool
            .invoke(serde_json::json!({"path": "."}), dir.path())
            .await
            .unwrap();
        assert!(outcome.ok);
        assert_eq!(outcome.text, "a.txt\nb.txt");
    }

    #[tokio::test]
    async fn missing_directory_is_an_execution_error() {
        let tool = ListDirTool;
        let err = tool
            .invoke(serde_json::json!({"path": "does-not-exist"}), Path::new("/tmp"))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Execution(_)));
    }
}
