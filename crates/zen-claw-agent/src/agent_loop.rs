//! The Agent Loop: the bounded reason-act-observe driver (spec §4.D).

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zen_claw_core::{GatewayError, Message, ReasoningDepth, Session, StepEvent};
use zen_claw_provider::{ChatRequest, ProviderRouter};
use zen_claw_tools::{Confirmer, ToolRegistry, DEFAULT_STEP_DEADLINE};

/// Characters kept in an `ai_response`/`tool_result` preview (spec §4.D).
const PREVIEW_CHARS: usize = 200;

/// Per-task plumbing the Streaming Plane wires up: where events go, and
/// how the task is told to stop.
pub struct TaskContext {
    pub cancel: CancellationToken,
    pub events: mpsc::Sender<StepEvent>,
}

impl TaskContext {
    pub fn new(events: mpsc::Sender<StepEvent>) -> Self {
        TaskContext { cancel: CancellationToken::new(), events }
    }

    async fn emit(&self, event: StepEvent) {
        if self.events.send(event).await.is_err() {
            debug!("event receiver dropped, task continues without a listener");
        }
    }
}

/// Result of one `AgentLoop::run` invocation (spec §4.D contract: `run(ctx,
/// session, user_input) -> (updated_session, final_text, error)`, expressed
/// as a `Result` since the session mutation always happens in place).
pub struct TaskOutcome {
    pub final_text: String,
}

pub struct AgentLoop {
    router: Arc<ProviderRouter>,
    tools: Arc<ToolRegistry>,
    confirmer: Arc<dyn Confirmer>,
}

impl AgentLoop {
    pub fn new(router: Arc<ProviderRouter>, tools: Arc<ToolRegistry>, confirmer: Arc<dyn Confirmer>) -> Self {
        AgentLoop { router, tools, confirmer }
    }

    pub async fn run(
        &self,
        ctx: &TaskContext,
        session: &mut Session,
        task_id: &str,
        user_input: &str,
        max_steps: usize,
    ) -> Result<TaskOutcome, GatewayError> {
        if let Some(reply) = self.handle_slash_command(session, user_input).await {
            return reply;
        }

        session.messages.push(Message::user(user_input));
        ctx.emit(StepEvent::Start { session_id: session.id.clone(), task_id: task_id.to_string() }).await;

        let mut session_unavailable = HashSet::new();
        let mut last_assistant_text = String::new();

        for step in 1..=max_steps {
            if ctx.cancel.is_cancelled() {
                ctx.emit(StepEvent::Cancelled { step }).await;
                ctx.emit(StepEvent::Done { result: None, stats: session.stats() }).await;
                return Err(GatewayError::Cancelled);
            }

            ctx.emit(StepEvent::StepBegin { step }).await;

            let tool_defs = self
                .tools
                .list()
                .into_iter()
                .map(|d| zen_claw_provider::ToolDefinition {
                    name: d.name,
                    description: d.description,
                    parameters: d.parameters_schema,
                })
                .collect::<Vec<_>>();

            let request = ChatRequest::new(session.model.clone(), session.messages.clone()).with_tools(tool_defs);

            ctx.emit(StepEvent::Thinking { step }).await;

            let outcome = self
                .router
                .chat(
                    request,
                    Some(session.provider.as_str()),
                    session.context_limit,
                    session.qwen_large_context_enabled,
                    &mut session_unavailable,
                    &ctx.cancel,
                )
                .await;

            let (provider_name, response) = match outcome {
                Ok(v) => v,
                Err(e) if matches!(e, zen_claw_provider::ProviderError::Cancelled) => {
                    ctx.emit(StepEvent::Cancelled { step }).await;
                    ctx.emit(StepEvent::Done { result: None, stats: session.stats() }).await;
                    return Err(GatewayError::Cancelled);
                }
                Err(e) => {
                    warn!(error = %e, step, "provider chain exhausted");
                    ctx.emit(StepEvent::Error { message: e.to_string() }).await;
                    ctx.emit(StepEvent::Done { result: None, stats: session.stats() }).await;
                    return Err(e.into());
                }
            };
            debug!(provider = %provider_name, step, "provider responded");

            ctx.emit(StepEvent::AiResponse {
                step,
                preview: StepEvent::truncate_preview(&response.content, PREVIEW_CHARS),
            })
            .await;

            if response.has_tool_calls() {
                session.messages.push(Message::assistant_with_tool_calls(response.tool_calls.clone()));

                for tool_call in &response.tool_calls {
                    ctx.emit(StepEvent::ToolCall {
                        step,
                        tool_call_id: tool_call.id.clone(),
                        name: tool_call.name.clone(),
                        args: tool_call.args.clone(),
                    })
                    .await;

                    let outcome = self.invoke_tool(session, tool_call).await;

                    ctx.emit(StepEvent::ToolResult {
                        step,
                        tool_call_id: tool_call.id.clone(),
                        ok: outcome.ok,
                        preview: StepEvent::truncate_preview(&outcome.text, PREVIEW_CHARS),
                    })
                    .await;

                    session.messages.push(Message::tool_result(tool_call.id.clone(), outcome.text));
                }
                session.touch();
                continue;
            }

            // finish_reason = stop (or anything else with no tool-calls): complete.
            session.messages.push(Message::assistant(response.content.clone()));
            session.touch();
            last_assistant_text = response.content;
            ctx.emit(StepEvent::Complete { step, reason: "stop".to_string() }).await;
            ctx.emit(StepEvent::Done { result: Some(last_assistant_text.clone()), stats: session.stats() }).await;
            return Ok(TaskOutcome { final_text: last_assistant_text });
        }

        // Halt condition: max_steps reached. Per the documented resolution
        // of spec §9's open ambiguity, this is `complete`, not `error`.
        let final_text = if last_assistant_text.is_empty() {
            "step budget exhausted".to_string()
        } else {
            last_assistant_text
        };
        ctx.emit(StepEvent::Complete { step: max_steps, reason: "step budget exhausted".to_string() }).await;
        ctx.emit(StepEvent::Done { result: Some(final_text.clone()), stats: session.stats() }).await;
        Ok(TaskOutcome { final_text })
    }

    async fn invoke_tool(&self, session: &Session, tool_call: &zen_claw_core::ToolCall) -> zen_claw_core::ToolOutcome {
        if let Some(tool) = self.tools.find(&tool_call.name) {
            let safety_class = tool.safety_class();
            if safety_class.requires_confirmation() && !self.confirmer.confirm(&tool_call.name, safety_class).await {
                return zen_claw_core::ToolOutcome::error(format!(
                    "confirmation denied for tool '{}'",
                    tool_call.name
                ));
            }
        }

        match self
            .tools
            .invoke(&tool_call.name, tool_call.args.clone(), &session.working_dir, DEFAULT_STEP_DEADLINE)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => zen_claw_core::ToolOutcome::error(e.to_string()),
        }
    }

    /// Short-circuits the loop for `/`-prefixed input: mutates session
    /// config, makes no LLM call, and returns a descriptive response
    /// without emitting any `StepEvent` (spec §4.D Slash-commands).
    ///
    /// A slash-command issued mid-task only ever reaches this function
    /// between tasks (a session admits one task at a time), so it applies
    /// to the *next* task by construction — resolving spec §9's open
    /// question (a) without needing to special-case an in-flight request.
    async fn handle_slash_command(
        &self,
        session: &mut Session,
        user_input: &str,
    ) -> Option<Result<TaskOutcome, GatewayError>> {
        if !user_input.starts_with('/') {
            return None;
        }
        let mut parts = user_input[1..].splitn(2, ' ');
        let command = parts.next().unwrap_or_default();
        let arg = parts.next().unwrap_or("").trim();

        let reply = match command {
            "provider" if !arg.is_empty() => {
                session.provider = arg.to_string();
                format!("provider set to {arg}")
            }
            "model" if !arg.is_empty() => {
                session.model = arg.to_string();
                format!("model set to {arg}")
            }
            "context-limit" => match arg.parse::<usize>() {
                Ok(n) => {
                    session.context_limit = n;
                    format!("context limit set to {n}")
                }
                Err(_) => return Some(Err(GatewayError::User(format!("invalid context-limit: {arg}")))),
            },
            "models" => format!("current provider: {}, model: {}", session.provider, session.model),
            "stats" => {
                let stats = session.stats();
                format!(
                    "system={} user={} assistant={} tool={}",
                    stats.system, stats.user, stats.assistant, stats.tool
                )
            }
            "clear" => {
                session.messages.clear();
                "transcript cleared".to_string()
            }
            "think" => match ReasoningDepth::parse(arg) {
                Some(depth) => {
                    session.reasoning_depth = depth;
                    format!("reasoning depth set to {arg}")
                }
                None => return Some(Err(GatewayError::User(format!("unknown reasoning depth: {arg}")))),
            },
            "qwen-large-context" => match arg {
                "on" => {
                    session.qwen_large_context_enabled = true;
                    "qwen large-context enabled".to_string()
                }
                "off" => {
                    session.qwen_large_context_enabled = false;
                    "qwen large-context disabled".to_string()
                }
                _ => return Some(Err(GatewayError::User(format!("expected on/off, got {arg}")))),
            },
            other => return Some(Err(GatewayError::User(format!("unknown command: /{other}")))),
        };

        session.touch();
        info!(session_id = %session.id, command = %command, "handled slash command");
        Some(Ok(TaskOutcome { final_text: reply }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{provider_descriptor, MockProvider, Scripted};
    use std::path::PathBuf;
    use zen_claw_core::{SafetyClass, ToolCall, ToolOutcome};
    use zen_claw_tools::{AlwaysConfirm, Tool, ToolError};

    fn loop_with(router: ProviderRouter, tools: ToolRegistry) -> AgentLoop {
        AgentLoop::new(Arc::new(router), Arc::new(tools), Arc::new(AlwaysConfirm))
    }

    fn new_session() -> Session {
        Session::new("s1", PathBuf::from("."), "mock".into(), "mock-model".into())
    }

    async fn drain(mut rx: mpsc::Receiver<StepEvent>) -> Vec<StepEvent> {
        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            let is_done = ev.is_done();
            events.push(ev);
            if is_done {
                break;
            }
        }
        events
    }

    #[tokio::test]
    async fn single_step_terminal_scenario() {
        let mut router = ProviderRouter::new("mock", vec![]);
        router.register(Arc::new(MockProvider::new("mock", vec![Scripted::Text("4")])), provider_descriptor("mock"));

        let agent = loop_with(router, ToolRegistry::new());
        let mut session = new_session();
        let (tx, rx) = mpsc::channel(32);
        let ctx = TaskContext::new(tx);

        let outcome = agent.run(&ctx, &mut session, "task-1", "what is 2+2?", 10).await.unwrap();
        assert_eq!(outcome.final_text, "4");
        assert_eq!(session.messages.len(), 2);
        zen_claw_core::check_tool_call_closure(&session.messages).unwrap();

        let events = drain(rx).await;
        let kinds: Vec<&str> = events
            .iter()
            .map(|e| match e {
                StepEvent::Start { .. } => "start",
                StepEvent::StepBegin { .. } => "step_begin",
                StepEvent::Thinking { .. } => "thinking",
                StepEvent::AiResponse { .. } => "ai_response",
                StepEvent::Complete { .. } => "complete",
                StepEvent::Done { .. } => "done",
                _ => "other",
            })
            .collect();
        assert_eq!(kinds, vec!["start", "step_begin", "thinking", "ai_response", "complete", "done"]);
    }

    struct EchoListDir;

    #[async_trait::async_trait]
    impl Tool for EchoListDir {
        fn name(&self) -> &str {
            "list_dir"
        }
        fn description(&self) -> &str {
            "lists a directory"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {"path": {"type": "string"}}})
        }
        fn safety_class(&self) -> SafetyClass {
            SafetyClass::Read
        }
        async fn invoke(&self, _args: serde_json::Value, _working_dir: &std::path::Path) -> Result<ToolOutcome, ToolError> {
            Ok(ToolOutcome::ok("3 items"))
        }
    }

    #[tokio::test]
    async fn two_step_with_one_tool_scenario() {
        let mut router = ProviderRouter::new("mock", vec![]);
        router.register(
            Arc::new(MockProvider::new(
                "mock",
                vec![
                    Scripted::ToolCalls(vec![ToolCall {
                        id: "c1".to_string(),
                        name: "list_dir".to_string(),
                        args: serde_json::json!({"path": "."}),
                    }]),
                    Scripted::Text("3 items"),
                ],
            )),
            provider_descriptor("mock"),
        );

        let tools = ToolRegistry::new();
        tools.register(Arc::new(EchoListDir));
        let agent = loop_with(router, tools);
        let mut session = new_session();
        let (tx, rx) = mpsc::channel(32);
        let ctx = TaskContext::new(tx);

        let outcome = agent.run(&ctx, &mut session, "task-1", "list the dir", 10).await.unwrap();
        assert_eq!(outcome.final_text, "3 items");

        // [user, assistant(tool_calls=[c1]), tool(tool_call_id=c1), assistant]
        assert_eq!(session.messages.len(), 4);
        assert_eq!(session.messages[1].tool_calls[0].id, "c1");
        assert_eq!(session.messages[2].tool_call_id.as_deref(), Some("c1"));
        zen_claw_core::check_tool_call_closure(&session.messages).unwrap();

        let events = drain(rx).await;
        assert!(events.iter().any(|e| matches!(e, StepEvent::ToolCall { .. })));
        assert!(events.iter().any(|e| matches!(e, StepEvent::ToolResult { ok: true, .. })));
    }

    #[tokio::test]
    async fn max_steps_exceeded_completes_instead_of_erroring() {
        let mut router = ProviderRouter::new("mock", vec![]);
        router.register(
            Arc::new(MockProvider::new(
                "mock",
                vec![Scripted::ToolCalls(vec![ToolCall {
                    id: "c1".to_string(),
                    name: "list_dir".to_string(),
                    args: serde_json::json!({}),
                }])],
            )),
            provider_descriptor("mock"),
        );
        let tools = ToolRegistry::new();
        tools.register(Arc::new(EchoListDir));
        let agent = loop_with(router, tools);
        let mut session = new_session();
        let (tx, rx) = mpsc::channel(64);
        let ctx = TaskContext::new(tx);

        let outcome = agent.run(&ctx, &mut session, "task-1", "loop forever", 2).await.unwrap();
        assert_eq!(outcome.final_text, "step budget exhausted");

        let events = drain(rx).await;
        let last_outcome = events.iter().rev().find(|e| e.is_terminal_outcome());
        assert!(matches!(last_outcome, Some(StepEvent::Complete { reason, .. }) if reason == "step budget exhausted"));
    }

    #[tokio::test]
    async fn slash_command_short_circuits_without_llm_call() {
        let router = ProviderRouter::new("mock", vec![]);
        let agent = loop_with(router, ToolRegistry::new());
        let mut session = new_session();
        let (tx, rx) = mpsc::channel(8);
        let ctx = TaskContext::new(tx);

        let outcome = agent.run(&ctx, &mut session, "task-1", "/provider kimi", 10).await.unwrap();
        assert_eq!(session.provider, "kimi");
        assert!(outcome.final_text.contains("kimi"));
        assert!(matches!(rx.try_recv(), Err(mpsc::error::TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn unknown_slash_command_is_a_user_error() {
        let router = ProviderRouter::new("mock", vec![]);
        let agent = loop_with(router, ToolRegistry::new());
        let mut session = new_session();
        let (tx, _rx) = mpsc::channel(8);
        let ctx = TaskContext::new(tx);

        let err = agent.run(&ctx, &mut session, "task-1", "/nonsense", 10).await.unwrap_err();
        assert!(matches!(err, GatewayError::User(_)));
    }
}
