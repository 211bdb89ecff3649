//! Ambient configuration: a code-level `GatewayConfig` built from CLI args
//! and environment credentials. YAML config loading is an external
//! collaborator this gateway doesn't implement.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use zen_claw_core::{ContextTier, ProviderDescriptor};

/// Process entry-point arguments. No subcommands, task management, or
/// REPL — those belong to the out-of-scope CLI front-end.
#[derive(Parser, Debug)]
#[command(author, version, about = "zen-claw agentic gateway")]
pub struct Args {
    /// Address to bind the HTTP service to.
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub addr: String,

    /// Directory holding session and consensus-stats state.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Maximum number of concurrently-active sessions.
    #[arg(long, default_value_t = 5)]
    pub max_sessions: usize,
}

/// Static, code-constructed configuration (spec §6 persisted state,
/// §3 ProviderDescriptor). `serde`-derived so a future config-file loader
/// can deserialize into this shape without a type change, even though no
/// such loader is implemented here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub bind_addr: String,
    pub data_dir: PathBuf,
    pub max_sessions: usize,
    pub default_provider: String,
    pub fallback_order: Vec<String>,
    pub providers: Vec<ProviderDescriptor>,
}

impl GatewayConfig {
    pub fn from_args(args: Args) -> Self {
        let data_dir = args.data_dir.unwrap_or_else(default_data_dir);
        GatewayConfig {
            bind_addr: args.addr,
            data_dir,
            max_sessions: args.max_sessions,
            default_provider: "deepseek".to_string(),
            fallback_order: vec!["kimi".to_string(), "openai".to_string()],
            providers: default_provider_descriptors(),
        }
    }
}

/// `~/.zen/zen-claw/` per spec §6's persisted state layout.
fn default_data_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".zen").join("zen-claw")
}

/// Credential resolution order per spec §6: environment
/// `<PROVIDER>_API_KEY` (upper-case) first, then `None` (no config-file
/// fallback is implemented). Placeholder `${...}` values are treated as
/// absent by `ProviderDescriptor::resolve_credential`.
fn credential_for(name: &str) -> Option<String> {
    let var = format!("{}_API_KEY", name.to_uppercase());
    ProviderDescriptor::resolve_credential(std::env::var(var).ok())
}

fn default_provider_descriptors() -> Vec<ProviderDescriptor> {
    vec![
        ProviderDescriptor {
            name: "deepseek".to_string(),
            base_url: "https://api.deepseek.com".to_string(),
            default_model: "deepseek-chat".to_string(),
            auth_key: credential_for("deepseek"),
            context_tier: ContextTier::Medium,
            supports_tools: true,
            supports_streaming: true,
        },
        ProviderDescriptor {
            name: "kimi".to_string(),
            base_url: "https://api.moonshot.cn/v1".to_string(),
            default_model: "moonshot-v1-32k".to_string(),
            auth_key: credential_for("kimi"),
            context_tier: ContextTier::Medium,
            supports_tools: true,
            supports_streaming: true,
        },
        ProviderDescriptor {
            name: "qwen".to_string(),
            base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1".to_string(),
            default_model: "qwen-plus".to_string(),
            auth_key: credential_for("qwen"),
            context_tier: ContextTier::Large,
            supports_tools: true,
            supports_streaming: true,
        },
        ProviderDescriptor {
            name: "openai".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            default_model: "gpt-4o-mini".to_string(),
            auth_key: credential_for("openai"),
            context_tier: ContextTier::Medium,
            supports_tools: true,
            supports_streaming: true,
        },
        ProviderDescriptor {
            name: "anthropic".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            default_model: "claude-3-5-sonnet-latest".to_string(),
            auth_key: credential_for("anthropic"),
            context_tier: ContextTier::Medium,
            supports_tools: true,
            supports_streaming: true,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_args_defaults_data_dir_under_home() {
        let args = Args { addr: "127.0.0.1:9000".to_string(), data_dir: None, max_sessions: 3 };
        let config = GatewayConfig::from_args(args);
        assert_eq!(config.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.max_sessions, 3);
        assert!(config.data_dir.ends_with("zen-claw"));
    }

    #[test]
    fn provider_descriptors_cover_the_configured_fallback_chain() {
        let names: Vec<&str> = default_provider_descriptors().iter().map(|p| p.name.as_str()).collect();
        assert!(names.contains(&"deepseek"));
        assert!(names.contains(&"kimi"));
        assert!(names.contains(&"qwen"));
    }
}
