//! Provider descriptor data model (spec §3 ProviderDescriptor, §4.A/§4.B).

use serde::{Deserialize, Serialize};

/// Context-window tier used by the Router's adaptation policy (spec §4.B).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextTier {
    /// <= 32k tokens
    Small,
    /// <= 200k tokens
    Medium,
    /// > 200k tokens
    Large,
}

/// Static metadata describing one configured LLM provider.
///
/// `auth_key` holds the resolved credential (never logged; `Debug` is
/// hand-rolled to redact it) or `None` when no usable credential was
/// found, in which case the provider does not appear in any chain
/// (spec §4.B: "Only providers with a usable credential appear").
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub name: String,
    pub base_url: String,
    pub default_model: String,
    #[serde(skip_serializing)]
    pub auth_key: Option<String>,
    pub context_tier: ContextTier,
    pub supports_tools: bool,
    pub supports_streaming: bool,
}

impl std::fmt::Debug for ProviderDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderDescriptor")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .field("auth_key", &self.auth_key.as_ref().map(|_| "<redacted>"))
            .field("context_tier", &self.context_tier)
            .field("supports_tools", &self.supports_tools)
            .field("supports_streaming", &self.supports_streaming)
            .finish()
    }
}

impl ProviderDescriptor {
    pub fn has_credential(&self) -> bool {
        self.auth_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    /// Placeholder values of the form `${...}` are treated as absent
    /// credentials (spec §6 Credentials).
    pub fn resolve_credential(raw: Option<String>) -> Option<String> {
        raw.filter(|v| !(v.starts_with("${") && v.ends_with('}')))
    }
}
