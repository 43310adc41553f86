//! Per-round context construction.
//!
//! Keeps the message list sent to the model under a message budget: the two
//! seed messages and the most recent `tail_window` messages survive verbatim,
//! the middle is replaced by one summary. A regenerated status message is
//! appended last each round.

use std::collections::HashSet;

use crate::domain::models::{ChatMessage, Role, ToolSpec};

/// Approximate characters per token (conservative heuristic).
const CHARS_PER_TOKEN: usize = 4;

/// Seed messages preserved at the head (system prompt + user query).
pub const PRESERVE_HEAD: usize = 2;

/// Evidence references listed in a compression summary.
const SUMMARY_EVIDENCE: usize = 12;

/// Estimate the number of tokens in a string using the chars/token heuristic.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(CHARS_PER_TOKEN)
}

/// Estimated prompt tokens for a message list, including tool call arguments.
pub fn estimate_messages_tokens(messages: &[ChatMessage]) -> usize {
    messages
        .iter()
        .map(|message| {
            estimate_tokens(&message.content)
                + message
                    .tool_calls
                    .iter()
                    .map(|call| estimate_tokens(&call.name) + estimate_tokens(&call.arguments))
                    .sum::<usize>()
        })
        .sum()
}

/// Figures rendered into the per-round status message.
#[derive(Debug, Clone)]
pub struct RoundStatus<'a> {
    /// 1-based round number.
    pub round: u32,
    pub max_rounds: u32,
    pub tokens_used: u64,
    pub token_budget: u64,
    pub deep_reads: usize,
    pub tools: &'a [ToolSpec],
    /// Tool names called in the previous round.
    pub previous_tools: &'a [String],
}

impl RoundStatus<'_> {
    pub fn render(&self) -> String {
        let remaining_rounds = self.max_rounds.saturating_sub(self.round);
        let remaining_tokens = self.token_budget.saturating_sub(self.tokens_used);
        let mut text = format!(
            "[research status]\nround: {}/{} ({} remaining after this one)\ntokens: {} used / {} budget ({} remaining)\nfiles deeply read: {}\n",
            self.round,
            self.max_rounds,
            remaining_rounds,
            self.tokens_used,
            self.token_budget,
            remaining_tokens,
            self.deep_reads,
        );

        if self.tools.is_empty() {
            text.push_str("tools: none available; answer with the structured JSON report now\n");
        } else {
            text.push_str("tools:\n");
            for tool in self.tools {
                text.push_str(&format!("- {}: {}\n", tool.name, tool.description));
            }
        }

        if self.previous_tools.is_empty() {
            text.push_str("previous round: no tool calls\n");
        } else {
            text.push_str(&format!(
                "previous round: {}\n",
                self.previous_tools.join(", ")
            ));
            if self.previous_tools.iter().all(|tool| tool == "list_dir") {
                text.push_str(
                    "warning: the previous round only listed directories; read source files next\n",
                );
            }
        }
        text
    }

    pub fn to_message(&self) -> ChatMessage {
        ChatMessage::system(self.render())
    }
}

/// Replace the middle of a long history with one summary message.
///
/// `recent_evidence` lists evidence references, most recent last.
pub fn compact_history(
    history: &[ChatMessage],
    tail_window: usize,
    recent_evidence: &[String],
) -> Vec<ChatMessage> {
    if history.len() <= PRESERVE_HEAD + tail_window {
        return history.to_vec();
    }

    let tail_start = history.len() - tail_window;
    let middle = &history[PRESERVE_HEAD..tail_start];
    let assistant_count = middle.iter().filter(|m| m.role == Role::Assistant).count();
    let tool_count = middle.iter().filter(|m| m.role == Role::Tool).count();

    let mut summary = format!(
        "[context compressed] {assistant_count} assistant messages and {tool_count} tool results from earlier rounds were removed."
    );
    let evidence: Vec<&str> = recent_evidence
        .iter()
        .rev()
        .take(SUMMARY_EVIDENCE)
        .map(String::as_str)
        .collect();
    if !evidence.is_empty() {
        summary.push_str(" Most recent evidence: ");
        summary.push_str(&evidence.join(", "));
        summary.push('.');
    }

    let mut compacted = Vec::with_capacity(PRESERVE_HEAD + 1 + tail_window);
    compacted.extend_from_slice(&history[..PRESERVE_HEAD]);
    compacted.push(ChatMessage::system(summary));
    compacted.extend_from_slice(&history[tail_start..]);
    compacted
}

/// Drop tool results whose call id was not emitted by a surviving assistant
/// message earlier in the list.
pub fn sanitize_tool_messages(messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
    let mut known_ids: HashSet<String> = HashSet::new();
    let mut sanitized = Vec::with_capacity(messages.len());
    for message in messages {
        match message.role {
            Role::Assistant => {
                known_ids.extend(message.tool_calls.iter().map(|call| call.id.clone()));
                sanitized.push(message);
            }
            Role::Tool => {
                let known = message
                    .tool_call_id
                    .as_ref()
                    .is_some_and(|id| known_ids.contains(id));
                if known {
                    sanitized.push(message);
                } else {
                    tracing::debug!(
                        tool_call_id = ?message.tool_call_id,
                        "Dropping dangling tool result"
                    );
                }
            }
            _ => sanitized.push(message),
        }
    }
    sanitized
}

/// Assemble the message list for one round.
pub fn build_round_messages(
    history: &[ChatMessage],
    tail_window: usize,
    recent_evidence: &[String],
    status: &RoundStatus<'_>,
) -> Vec<ChatMessage> {
    let compacted = compact_history(history, tail_window, recent_evidence);
    let mut messages = sanitize_tool_messages(compacted);
    messages.push(status.to_message());
    messages
}

/// Head/tail-retained view of long file content.
///
/// Returns `None` when the content is at or below `threshold_lines`.
pub fn compress_file_content(
    text: &str,
    threshold_lines: usize,
    head_lines: usize,
    tail_lines: usize,
) -> Option<String> {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() <= threshold_lines || head_lines + tail_lines >= lines.len() {
        return None;
    }
    let omitted = lines.len() - head_lines - tail_lines;
    let mut compressed = lines[..head_lines].join("\n");
    compressed.push_str(&format!("\n[... {omitted} lines omitted ...]\n"));
    compressed.push_str(&lines[lines.len() - tail_lines..].join("\n"));
    Some(compressed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ToolCall;

    fn history_with_rounds(rounds: usize) -> Vec<ChatMessage> {
        let mut history = vec![ChatMessage::system("prompt"), ChatMessage::user("query")];
        for i in 0..rounds {
            let id = format!("call_{i}");
            history.push(ChatMessage::assistant_tool_calls(
                "",
                vec![ToolCall::new(&id, "list_dir", r#"{"targetPath":"."}"#)],
            ));
            history.push(ChatMessage::tool_result(&id, "entries"));
        }
        history
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_short_history_untouched() {
        let history = history_with_rounds(2);
        assert_eq!(compact_history(&history, 8, &[]), history);
    }

    #[test]
    fn test_compaction_preserves_head_and_tail() {
        let history = history_with_rounds(10);
        let evidence = vec!["src/a.ts".to_string(), "src/b.ts".to_string()];
        let compacted = compact_history(&history, 4, &evidence);
        assert_eq!(compacted.len(), 2 + 1 + 4);
        assert_eq!(compacted[0].content, "prompt");
        assert_eq!(compacted[1].content, "query");
        assert!(compacted[2].content.contains("8 assistant messages and 8 tool results"));
        assert!(compacted[2].content.contains("src/b.ts, src/a.ts"));
        assert_eq!(compacted.last(), history.last());
    }

    #[test]
    fn test_sanitize_drops_dangling_tool_results() {
        let history = history_with_rounds(10);
        // Odd tail: starts on a tool result whose assistant was compressed away.
        let compacted = compact_history(&history, 3, &[]);
        assert_eq!(compacted[3].role, Role::Tool);
        let sanitized = sanitize_tool_messages(compacted);
        assert_eq!(sanitized.len(), 5);
        let mut ids = HashSet::new();
        for message in &sanitized {
            if message.role == Role::Assistant {
                ids.extend(message.tool_calls.iter().map(|c| c.id.clone()));
            }
            if message.role == Role::Tool {
                assert!(ids.contains(message.tool_call_id.as_ref().unwrap()));
            }
        }
    }

    #[test]
    fn test_status_message_is_last_and_warns_on_list_dir_rounds() {
        let tools = vec![ToolSpec {
            name: "read_skeleton".into(),
            description: "Outline a file".into(),
            parameters: serde_json::json!({}),
        }];
        let previous = vec!["list_dir".to_string(), "list_dir".to_string()];
        let status = RoundStatus {
            round: 3,
            max_rounds: 10,
            tokens_used: 1200,
            token_budget: 5000,
            deep_reads: 1,
            tools: &tools,
            previous_tools: &previous,
        };
        let messages = build_round_messages(&history_with_rounds(1), 8, &[], &status);
        let last = messages.last().unwrap();
        assert_eq!(last.role, Role::System);
        assert!(last.content.contains("round: 3/10 (7 remaining"));
        assert!(last.content.contains("3800 remaining"));
        assert!(last.content.contains("- read_skeleton: Outline a file"));
        assert!(last.content.contains("warning: the previous round only listed directories"));
    }

    #[test]
    fn test_compress_file_content() {
        let text = (1..=100).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        assert!(compress_file_content(&text, 100, 10, 10).is_none());
        let compressed = compress_file_content(&text, 50, 10, 5).unwrap();
        assert!(compressed.starts_with("line 1\n"));
        assert!(compressed.contains("[... 85 lines omitted ...]"));
        assert!(compressed.ends_with("line 100"));
    }
}
