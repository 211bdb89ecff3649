//! Built-in tools: the handful of read/write filesystem primitives needed
//! to drive the end-to-end scenarios (spec §8). No outline indexing, no
//! patch application, no shell execution, no MCP, no remote tools.

mod list_dir;
mod read_file;
mod write_file;

pub use list_dir::ListDirTool;
pub use read_file::ReadFileTool;
pub use write_file::WriteFileTool;

/// Converts a `schemars` schema into the `Value` the `Tool` trait expects.
pub(crate) fn schema_value<T: schemars::JsonSchema>() -> serde_json::Value {
    serde_json::to_value(schemars::schema_for!(T)).expect("schema serializes")
}
