//! Tool Registry and built-in tools (spec §4.C).

pub mod builtins;
pub mod confirmer;
pub mod error;
pub mod registry;
pub mod tool;

pub use confirmer::{AlwaysConfirm, Confirmer, NeverConfirm};
pub use error::ToolError;
pub use registry::{ToolRegistry, DEFAULT_STEP_DEADLINE};
pub use tool::{resolve_path, Tool};
