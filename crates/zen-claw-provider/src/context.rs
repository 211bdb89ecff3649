//! Context-window adaptation (spec §4.B, §8 P2 Truncation safety).

use zen_claw_core::{Message, Role};

/// Adapts `messages` to at most `limit` entries (after any leading system
/// row), preserving Invariant T1.
///
/// `limit == 0` means unlimited. The window is a naive tail window; if the
/// first kept row is a `tool` row, the window is extended backward to
/// include the assistant row that issued its `tool_call_id` and any
/// sibling tool rows answering that same assistant turn. A leading
/// `system` row is always preserved outside the window.
pub fn adapt_window(messages: &[Message], limit: usize) -> Vec<Message> {
    if limit == 0 {
        return messages.to_vec();
    }

    let mut result = Vec::new();
    let rest: &[Message] = if let Some(first) = messages.first() {
        if first.role == Role::System {
            result.push(first.clone());
            &messages[1..]
        } else {
            messages
        }
    } else {
        messages
    };

    if rest.len() <= limit {
        result.extend(rest.iter().cloned());
        return result;
    }

    let mut window_start = rest.len() - limit;
    if rest[window_start].role == Role::Tool {
        // Walk backward through sibling tool rows until the assistant row
        // that issued them, then include the assistant row itself.
        let mut i = window_start;
        while i > 0 && rest[i - 1].role != Role::Assistant {
            i -= 1;
        }
        if i > 0 {
            i -= 1;
        }
        window_start = i;
    }

    result.extend(rest[window_start..].iter().cloned());
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use zen_claw_core::{check_tool_call_closure, ToolCall};

    fn tc(id: &str) -> ToolCall {
        ToolCall { id: id.into(), name: "t".into(), args: serde_json::json!({}) }
    }

    #[test]
    fn zero_limit_means_unlimited() {
        let msgs = vec![Message::user("a"), Message::assistant("b")];
        assert_eq!(adapt_window(&msgs, 0).len(), 2);
    }

    #[test]
    fn short_history_is_untouched() {
        let msgs = vec![Message::system("sys"), Message::user("a")];
        let adapted = adapt_window(&msgs, 5);
        assert_eq!(adapted.len(), 2);
    }

    #[test]
    fn leading_system_row_always_preserved_outside_window() {
        let mut msgs = vec![Message::system("sys")];
        for i in 0..10 {
            msgs.push(Message::user(format!("u{i}")));
        }
        let adapted = adapt_window(&msgs, 3);
        assert_eq!(adapted[0].role, Role::System);
        assert_eq!(adapted.len(), 4); // system + 3
    }

    #[test]
    fn truncation_around_tool_call_keeps_pair_intact() {
        // 40 messages ending in assistant-with-tool-calls + its tool row.
        let mut msgs = vec![Message::system("sys")];
        for i in 0..18 {
            msgs.push(Message::user(format!("u{i}")));
            msgs.push(Message::assistant(format!("a{i}")));
        }
        msgs.push(Message::assistant_with_tool_calls(vec![tc("c1")]));
        msgs.push(Message::tool_result("c1", "result"));

        let adapted = adapt_window(&msgs, 5);
        check_tool_call_closure(&adapted).expect("adapted window must satisfy Invariant T1");

        // The assistant+tool pair must both be present.
        let has_assistant_with_c1 = adapted
            .iter()
            .any(|m| m.tool_calls.iter().any(|t| t.id == "c1"));
        let has_tool_row = adapted
            .iter()
            .any(|m| m.tool_call_id.as_deref() == Some("c1"));
        assert!(has_assistant_with_c1 && has_tool_row);
    }

    #[test]
    fn multiple_sibling_tool_rows_are_all_retained() {
        let mut msgs = vec![Message::system("sys")];
        for i in 0..10 {
            msgs.push(Message::user(format!("u{i}")));
        }
        msgs.push(Message::assistant_with_tool_calls(vec![tc("a"), tc("b"), tc("c")]));
        msgs.push(Message::tool_result("a", "1"));
        msgs.push(Message::tool_result("b", "2"));
        msgs.push(Message::tool_result("c", "3"));

        // limit lands inside the sibling tool rows.
        let adapted = adapt_window(&msgs, 2);
        check_tool_call_closure(&adapted).expect("must hold T1");
    }

    #[test]
    fn exhaustive_limits_hold_invariant_on_mixed_transcript() {
        let mut msgs = vec![Message::system("sys")];
        for i in 0..8 {
            msgs.push(Message::user(format!("u{i}")));
            if i % 2 == 0 {
                msgs.push(Message::assistant_with_tool_calls(vec![tc(&format!("t{i}"))]));
                msgs.push(Message::tool_result(format!("t{i}"), "ok"));
            } else {
                msgs.push(Message::assistant(format!("a{i}")));
            }
        }
        for limit in 1..msgs.len() {
            let adapted = adapt_window(&msgs, limit);
            check_tool_call_closure(&adapted)
                .unwrap_or_else(|e| panic!("limit={limit} violated T1: {e}"));
        }
    }
}
