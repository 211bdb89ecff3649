//! Cost-ordered provider selection with cascading fallback and
//! context-window adaptation (spec §4.B).

use crate::adapter::ProviderAdapter;
use crate::chat::ChatRequest;
use crate::context::adapt_window;
use crate::error::ProviderError;
use crate::openai::QWEN_SMALL_CONTEXT_MAX_TOKENS;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use zen_claw_core::ProviderDescriptor;

/// Maximum number of transcript messages sent to `qwen` when large-context
/// support is disabled (spec §4.B).
const QWEN_SMALL_CONTEXT_LIMIT: usize = 20;

struct RegisteredProvider {
    adapter: Arc<dyn ProviderAdapter>,
    descriptor: ProviderDescriptor,
}

/// Builds an ordered provider chain and executes `chat` against it with
/// cascading fallback, matching spec §4.B's execution policy and §8 P6's
/// determinism requirement.
pub struct ProviderRouter {
    providers: Vec<RegisteredProvider>,
    default_name: String,
    fallback_order: Vec<String>,
    /// Providers disabled for the rest of the process lifetime after a
    /// 401/403 (spec §4.A).
    permanently_disabled: Mutex<HashSet<String>>,
}

impl ProviderRouter {
    pub fn new(default_name: impl Into<String>, fallback_order: Vec<String>) -> Self {
        ProviderRouter {
            providers: Vec::new(),
            default_name: default_name.into(),
            fallback_order,
            permanently_disabled: Mutex::new(HashSet::new()),
        }
    }

    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>, descriptor: ProviderDescriptor) {
        self.providers.push(RegisteredProvider { adapter, descriptor });
    }

    fn loaded_names(&self) -> HashSet<String> {
        let disabled = self.permanently_disabled.lock().unwrap();
        self.providers
            .iter()
            .filter(|p| p.descriptor.has_credential() && !disabled.contains(&p.descriptor.name))
            .map(|p| p.descriptor.name.clone())
            .collect()
    }

    fn find(&self, name: &str) -> Option<&RegisteredProvider> {
        self.providers.iter().find(|p| p.descriptor.name == name)
    }

    /// Pure chain-construction rule, exposed standalone so §8 P6 (router
    /// determinism) can be tested without any network or adapter state.
    pub fn build_chain(
        preferred: Option<&str>,
        default: &str,
        fallback_order: &[String],
        loaded: &HashSet<String>,
    ) -> Vec<String> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();

        if let Some(p) = preferred {
            if loaded.contains(p) && seen.insert(p.to_string()) {
                chain.push(p.to_string());
            }
        }
        if loaded.contains(default) && seen.insert(default.to_string()) {
            chain.push(default.to_string());
        }
        for f in fallback_order {
            if loaded.contains(f) && seen.insert(f.clone()) {
                chain.push(f.clone());
            }
        }
        chain
    }

    /// Applies context-window adaptation (spec §4.B) for the given
    /// provider and session settings, then runs the request through the
    /// fallback chain.
    ///
    /// `session_unavailable` accumulates providers marked unavailable by a
    /// fatal error *for this session only* (distinct from the process-
    /// lifetime `permanently_disabled` set); callers should reuse the same
    /// set across calls within a session.
    pub async fn chat(
        &self,
        request: ChatRequest,
        preferred: Option<&str>,
        context_limit: usize,
        qwen_large_context_enabled: bool,
        session_unavailable: &mut HashSet<String>,
        cancel: &CancellationToken,
    ) -> Result<(String, crate::chat::ChatResponse), ProviderError> {
        let loaded = self.loaded_names();
        let chain = Self::build_chain(preferred, &self.default_name, &self.fallback_order, &loaded);

        let mut last_error: Option<ProviderError> = None;

        for name in chain {
            if session_unavailable.contains(&name) {
                continue;
            }
            let Some(provider) = self.find(&name) else { continue };

            if cancel.is_cancelled() {
                return Err(ProviderError::Cancelled);
            }

            let adapted = self.adapt_for_provider(&request, &name, context_limit, qwen_large_context_enabled);

            info!(provider = %name, model = %adapted.model, "attempting provider");

            let call = provider.adapter.chat(&adapted);
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(ProviderError::Cancelled),
                result = call => result,
            };

            match outcome {
                Ok(resp) => return Ok((name, resp)),
                Err(ProviderError::Cancelled) => return Err(ProviderError::Cancelled),
                Err(e) if e.disables_provider() => {
                    warn!(provider = %name, error = %e, "provider disabled for process lifetime");
                    self.permanently_disabled.lock().unwrap().insert(name.clone());
                    session_unavailable.insert(name.clone());
                    last_error = Some(e);
                }
                Err(e) if e.is_retryable() => {
                    warn!(provider = %name, error = %e, "retryable error, advancing to next provider");
                    last_error = Some(e);
                }
                Err(e) => {
                    warn!(provider = %name, error = %e, "fatal error for this session, advancing");
                    session_unavailable.insert(name.clone());
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ProviderError::Retryable("no usable provider".into())))
    }

    fn adapt_for_provider(
        &self,
        request: &ChatRequest,
        provider_name: &str,
        context_limit: usize,
        qwen_large_context_enabled: bool,
    ) -> ChatRequest {
        let mut adapted = request.clone();

        let is_qwen = provider_name == "qwen";
        let effective_limit = if is_qwen && !qwen_large_context_enabled {
            QWEN_SMALL_CONTEXT_LIMIT
        } else {
            context_limit
        };

        adapted.messages = adapt_window(&request.messages, effective_limit);

        if is_qwen && !qwen_large_context_enabled {
            adapted.max_tokens = Some(
                adapted
                    .max_tokens
                    .map(|m| m.min(QWEN_SMALL_CONTEXT_MAX_TOKENS))
                    .unwrap_or(QWEN_SMALL_CONTEXT_MAX_TOKENS),
            );
        }

        adapted
    }
}
