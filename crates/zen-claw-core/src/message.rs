//! Transcript data model (spec §3: Message, Invariant T1).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

/// Role of a transcript row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by an assistant row, or replayed on a tool row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub args: Value,
}

impl ToolCall {
    /// Parse `args` back from its wire JSON-string form. Malformed JSON
    /// falls back to `{"_raw": <string>}` per spec §4.A.
    pub fn args_from_wire(id: impl Into<String>, name: impl Into<String>, raw_args: &str) -> Self {
        let args = serde_json::from_str(raw_args)
            .unwrap_or_else(|_| serde_json::json!({ "_raw": raw_args }));
        ToolCall {
            id: id.into(),
            name: name.into(),
            args,
        }
    }

    /// Serialize `args` to its wire JSON-string form.
    pub fn args_to_wire(&self) -> String {
        serde_json::to_string(&self.args).unwrap_or_default()
    }
}

/// One transcript entry.
///
/// `content` is always a string, never a structured object — even for an
/// assistant row that only carries tool calls, in which case it is empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Message::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Message::new(Role::User, content)
    }

    /// An assistant row with plain text content and no tool calls.
    pub fn assistant(content: impl Into<String>) -> Self {
        Message::new(Role::Assistant, content)
    }

    /// An assistant row that issued tool calls. Per spec §4.A/§4.D this row
    /// must be appended with empty content even when the model returned
    /// accompanying prose — callers that want to preserve prose alongside
    /// tool calls should append a separate assistant row first.
    pub fn assistant_with_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Message {
            role: Role::Assistant,
            content: String::new(),
            tool_calls,
            tool_call_id: None,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    /// A tool-result row answering `tool_call_id`.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Message {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    fn new(role: Role, content: impl Into<String>) -> Self {
        Message {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// Checks Invariant T1 (tool-call closure) over a full transcript.
///
/// For every tool row, the nearest preceding assistant row must contain a
/// tool-call with matching id. For every tool-call id issued by an
/// assistant row, a matching tool row must follow before the next
/// assistant/user row, unless the transcript ends there (the agent
/// halted mid-step — a partial transcript is still valid, see spec §4.D
/// halt conditions).
pub fn check_tool_call_closure(messages: &[Message]) -> Result<(), String> {
    let mut open: Vec<String> = Vec::new();

    for (idx, msg) in messages.iter().enumerate() {
        match msg.role {
            Role::Assistant => {
                // Entering a new assistant turn without answering the
                // previous one's tool calls (when more transcript follows)
                // is a violation; partial trailing opens are allowed.
                if !open.is_empty() {
                    return Err(format!(
                        "message {idx}: assistant row opened before prior tool calls {open:?} were closed"
                    ));
                }
                for tc in &msg.tool_calls {
                    open.push(tc.id.clone());
                }
            }
            Role::Tool => {
                let id = msg.tool_call_id.as_deref().unwrap_or_default();
                match open.iter().position(|o| o == id) {
                    Some(pos) => {
                        open.remove(pos);
                    }
                    None => {
                        return Err(format!(
                            "message {idx}: tool row tool_call_id={id:?} has no matching preceding assistant tool-call"
                        ));
                    }
                }
            }
            Role::User => {
                if !open.is_empty() {
                    return Err(format!(
                        "message {idx}: user row opened before prior tool calls {open:?} were closed"
                    ));
                }
            }
            Role::System => {}
        }
    }
    Ok(())
}
