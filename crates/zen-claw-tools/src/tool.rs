//! The `Tool` trait: a registry of descriptors each carrying an executor
//! capability, not an inheritance hierarchy (spec §9 Dynamic tool dispatch).

use crate::error::ToolError;
use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use zen_claw_core::{SafetyClass, ToolDescriptor, ToolOutcome};

/// A single invocable tool.
///
/// `invoke` resolves relative paths against `working_dir` (spec §3
/// ToolDescriptor: "All path-accepting tools resolve relative paths
/// against the session's working_dir").
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;
    fn safety_class(&self) -> SafetyClass;

    async fn invoke(&self, args: Value, working_dir: &Path) -> Result<ToolOutcome, ToolError>;

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters_schema: self.parameters_schema(),
            safety_class: self.safety_class(),
        }
    }
}

/// Resolves `path` against `working_dir` when relative, per the
/// path-resolution rule all path-accepting tools share.
pub fn resolve_path(working_dir: &Path, path: &str) -> std::path::PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        working_dir.join(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_paths_are_unchanged() {
        let resolved = resolve_path(Path::new("/home/user/project"), "/etc/hosts");
        assert_eq!(resolved, Path::new("/etc/hosts"));
    }

    #[test]
    fn relative_paths_are_joined_to_working_dir() {
        let resolved = resolve_path(Path::new("/home/user/project"), "src/main.rs");
        assert_eq!(resolved, Path::new("/home/user/project/src/main.rs"));
    }
}
