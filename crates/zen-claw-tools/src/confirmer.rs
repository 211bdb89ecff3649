//! Confirmation gate consulted before `write`/`exec`/`network` tools run
//! (spec §4.C, §4.D).

use async_trait::async_trait;
use zen_claw_core::SafetyClass;

/// Decides whether a tool invocation that needs confirmation (per its
/// `SafetyClass`) may proceed.
#[async_trait]
pub trait Confirmer: Send + Sync {
    async fn confirm(&self, tool_name: &str, safety_class: SafetyClass) -> bool;
}

/// Confirms every request unconditionally. Suitable for non-interactive
/// deployments or tests; production front-ends supply their own
/// `Confirmer` that prompts the attached client.
pub struct AlwaysConfirm;

#[async_trait]
impl Confirmer for AlwaysConfirm {
    async fn confirm(&self, _tool_name: &str, _safety_class: SafetyClass) -> bool {
        true
    }
}

/// Denies every confirmation request. Useful for read-only deployments.
pub struct NeverConfirm;

#[async_trait]
impl Confirmer for NeverConfirm {
    async fn confirm(&self, _tool_name: &str, _safety_class: SafetyClass) -> bool {
        false
    }
}
