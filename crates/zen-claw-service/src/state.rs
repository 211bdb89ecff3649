//! Process-wide global state: Config, Tool Registry, Provider Router,
//! Session Store, Streaming Plane, Consensus Engine — each constructed at
//! process start, lifetime = process lifetime (spec §5, §9).

use crate::client_registry::ClientRegistry;
use crate::config::GatewayConfig;
use std::collections::HashMap;
use std::sync::Arc;
use zen_claw_agent::{AgentLoop, ConsensusEngine, SessionStore};
use zen_claw_core::GatewayError;
use zen_claw_provider::{AnthropicAdapter, OpenAiCompatibleAdapter, ProviderAdapter, ProviderRouter};
use zen_claw_tools::{AlwaysConfirm, ToolRegistry};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub store: Arc<SessionStore>,
    pub router: Arc<ProviderRouter>,
    pub agent: Arc<AgentLoop>,
    pub consensus: Arc<ConsensusEngine>,
    pub clients: Arc<ClientRegistry>,
}

impl AppState {
    pub async fn build(config: GatewayConfig) -> Result<Self, GatewayError> {
        let mut router = ProviderRouter::new(config.default_provider.clone(), config.fallback_order.clone());
        let mut adapters: HashMap<String, Arc<dyn ProviderAdapter>> = HashMap::new();

        for descriptor in &config.providers {
            let adapter: Arc<dyn ProviderAdapter> = if descriptor.name == "anthropic" {
                Arc::new(AnthropicAdapter::new(
                    descriptor.base_url.clone(),
                    descriptor.auth_key.clone().unwrap_or_default(),
                ))
            } else {
                Arc::new(OpenAiCompatibleAdapter::new(
                    descriptor.name.clone(),
                    descriptor.base_url.clone(),
                    descriptor.auth_key.clone().unwrap_or_default(),
                ))
            };
            adapters.insert(descriptor.name.clone(), adapter.clone());
            router.register(adapter, descriptor.clone());
        }

        let tools = Arc::new(ToolRegistry::with_builtins());
        let store = Arc::new(
            SessionStore::open(config.data_dir.clone(), config.max_sessions).await.map_err(GatewayError::from)?,
        );
        let router = Arc::new(router);
        let agent = Arc::new(AgentLoop::new(router.clone(), tools.clone(), Arc::new(AlwaysConfirm)));

        let mut preference_order = vec![config.default_provider.clone()];
        preference_order.extend(config.fallback_order.clone());
        let consensus = Arc::new(ConsensusEngine::new(
            adapters,
            preference_order.clone(),
            preference_order,
            config.data_dir.clone(),
        ));

        Ok(AppState {
            config: Arc::new(config),
            store,
            router,
            agent,
            consensus,
            clients: Arc::new(ClientRegistry::new()),
        })
    }
}
