//! The wire alphabet emitted during a task (spec §3 StepEvent, §4.D event
//! ordering guarantee, §8 P4).

use crate::session::SessionStats;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One element of the event stream for a task. Consumed by the Streaming
/// Plane and broadcast to every client attached to the owning session.
///
/// Total order within one task:
/// `start -> [step_begin -> thinking -> ai_response -> (tool_call ->
/// tool_result)*]* -> (complete|error|cancelled) -> done`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepEvent {
    Start {
        session_id: String,
        task_id: String,
    },
    StepBegin {
        step: usize,
    },
    Thinking {
        step: usize,
    },
    AiResponse {
        step: usize,
        /// Truncated preview of the assistant's response content.
        preview: String,
    },
    ToolCall {
        step: usize,
        tool_call_id: String,
        name: String,
        args: Value,
    },
    ToolResult {
        step: usize,
        tool_call_id: String,
        ok: bool,
        /// Truncated preview of the tool's output.
        preview: String,
    },
    /// Terminal: the task finished normally (including step-budget
    /// exhaustion, per the §9 resolution documented in DESIGN.md).
    Complete {
        step: usize,
        reason: String,
    },
    /// Terminal: an irrecoverable error ended the task.
    Error {
        message: String,
    },
    /// Terminal: the task was cancelled; distinct from `error` per spec §7.
    Cancelled {
        step: usize,
    },
    /// Always the last event of a task; carries the final text and stats
    /// so clients can deterministically release resources (spec §7).
    Done {
        result: Option<String>,
        stats: SessionStats,
    },
}

impl StepEvent {
    /// Truncate a string for use in a preview field, matching the
    /// `ai_response`/`tool_result` truncated-preview contract in spec §4.D.
    pub fn truncate_preview(s: &str, max_chars: usize) -> String {
        if s.chars().count() <= max_chars {
            return s.to_string();
        }
        let truncated: String = s.chars().take(max_chars).collect();
        format!("{truncated}…")
    }

    /// Whether this variant is one of the three terminal "outcome" events
    /// that must immediately precede `done` (spec §4.D, §7).
    pub fn is_terminal_outcome(&self) -> bool {
        matches!(
            self,
            StepEvent::Complete { .. } | StepEvent::Error { .. } | StepEvent::Cancelled { .. }
        )
    }

    pub fn is_done(&self) -> bool {
        matches!(self, StepEvent::Done { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_preview_is_unchanged() {
        assert_eq!(StepEvent::truncate_preview("hi", 10), "hi");
    }

    #[test]
    fn long_preview_is_truncated_with_ellipsis() {
        let preview = StepEvent::truncate_preview("abcdefghij", 4);
        assert_eq!(preview, "abcd…");
    }

    #[test]
    fn serializes_with_snake_case_tag() {
        let ev = StepEvent::StepBegin { step: 1 };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "step_begin");
        assert_eq!(json["step"], 1);
    }

    #[test]
    fn terminal_outcome_classification() {
        assert!(StepEvent::Complete { step: 1, reason: "ok".into() }.is_terminal_outcome());
        assert!(StepEvent::Error { message: "x".into() }.is_terminal_outcome());
        assert!(StepEvent::Cancelled { step: 1 }.is_terminal_outcome());
        assert!(!StepEvent::Thinking { step: 1 }.is_terminal_outcome());
        assert!(StepEvent::Done { result: None, stats: SessionStats::default() }.is_done());
    }
}
