//! Session and task data model (spec §3: Session, Task, Lifecycle).

use crate::message::{Message, Role};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::OffsetDateTime;

/// Lifecycle state of a session (spec §3, §4.F).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    Background,
    Terminated,
}

/// Derived counts by role, recomputed from the transcript rather than
/// tracked incrementally (spec §3: "Stats are derived").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub system: usize,
    pub user: usize,
    pub assistant: usize,
    pub tool: usize,
}

impl SessionStats {
    pub fn from_messages(messages: &[Message]) -> Self {
        let mut stats = SessionStats::default();
        for m in messages {
            match m.role {
                Role::System => stats.system += 1,
                Role::User => stats.user += 1,
                Role::Assistant => stats.assistant += 1,
                Role::Tool => stats.tool += 1,
            }
        }
        stats
    }

    pub fn total(&self) -> usize {
        self.system + self.user + self.assistant + self.tool
    }
}

/// The durable per-conversation record (spec §3 Session, §4.F Session Store).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    /// Scopes all tool path resolution for this session.
    pub working_dir: PathBuf,
    pub provider: String,
    pub model: String,
    pub messages: Vec<Message>,
    pub state: SessionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Reasoning/thinking depth set via `/think`.
    pub reasoning_depth: ReasoningDepth,
    /// `0` means unlimited (spec §4.B).
    pub context_limit: usize,
    pub qwen_large_context_enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningDepth {
    Off,
    #[default]
    Low,
    Medium,
    High,
}

impl ReasoningDepth {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "off" => Some(Self::Off),
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

impl Session {
    pub fn new(id: impl Into<String>, working_dir: PathBuf, provider: String, model: String) -> Self {
        let now = OffsetDateTime::now_utc();
        Session {
            id: id.into(),
            created_at: now,
            updated_at: now,
            working_dir,
            provider,
            model,
            messages: Vec::new(),
            state: SessionState::Active,
            client_id: None,
            reasoning_depth: ReasoningDepth::default(),
            context_limit: 0,
            qwen_large_context_enabled: false,
        }
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats::from_messages(&self.messages)
    }

    pub fn touch(&mut self) {
        self.updated_at = OffsetDateTime::now_utc();
    }
}

/// One user input pumped through the Agent Loop (spec §3 Task).
#[derive(Debug, Clone)]
pub struct Task {
    pub id: String,
    pub session_id: String,
    pub user_input: String,
    pub max_steps: usize,
}

impl Task {
    pub fn new(session_id: impl Into<String>, user_input: impl Into<String>, max_steps: usize) -> Self {
        Task {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            user_input: user_input.into(),
            max_steps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_are_derived_from_messages() {
        let mut s = Session::new("s1", PathBuf::from("."), "openai".into(), "gpt".into());
        s.messages.push(Message::user("hi"));
        s.messages.push(Message::assistant("hello"));
        let stats = s.stats();
        assert_eq!(stats.user, 1);
        assert_eq!(stats.assistant, 1);
        assert_eq!(stats.total(), 2);
    }

    #[test]
    fn reasoning_depth_parses_known_values() {
        assert_eq!(ReasoningDepth::parse("high"), Some(ReasoningDepth::High));
        assert_eq!(ReasoningDepth::parse("nonsense"), None);
    }
}
