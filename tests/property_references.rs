use corawiki::domain::models::{ChatMessage, ToolCall};
use corawiki::services::context_window::{
    compact_history, compress_file_content, sanitize_tool_messages, PRESERVE_HEAD,
};
use corawiki::services::references::{classify_reference, has_excluded_segment, split_reference};
use proptest::prelude::*;
use std::collections::HashSet;

fn source_path() -> impl Strategy<Value = String> {
    "[a-z]{1,8}(/[a-z]{1,8}){0,3}\\.(ts|py|rs|go)"
}

proptest! {
    /// Property: a line suffix is split off and the path kept intact
    #[test]
    fn prop_split_reference_strips_line_range(
        path in source_path(),
        start in 1usize..5000,
        len in 0usize..500
    ) {
        let reference = format!("{path}:{start}-{}", start + len);
        let (split_path, suffix) = split_reference(&reference);
        prop_assert_eq!(split_path, path.as_str());
        let expected_suffix = format!(":{start}-{}", start + len);
        prop_assert_eq!(suffix, Some(expected_suffix.as_str()));
    }

    /// Property: the tier depends on the path only, never the line suffix
    #[test]
    fn prop_tier_ignores_line_suffix(path in source_path(), line in 1usize..10_000) {
        prop_assert_eq!(
            classify_reference(&path),
            classify_reference(&format!("{path}:{line}"))
        );
    }

    /// Property: anything under a tests directory is excluded material
    #[test]
    fn prop_tests_directory_is_excluded(path in source_path()) {
        let reference = format!("tests/{path}");
        prop_assert!(has_excluded_segment(&reference));
    }

    /// Property: compaction keeps the seed messages and bounds the length
    #[test]
    fn prop_compaction_is_bounded(rounds in 0usize..40, tail in 1usize..20) {
        let mut history = vec![ChatMessage::system("prompt"), ChatMessage::user("query")];
        for i in 0..rounds {
            let id = format!("call_{i}");
            history.push(ChatMessage::assistant_tool_calls(
                "",
                vec![ToolCall::new(&id, "list_dir", "{}")],
            ));
            history.push(ChatMessage::tool_result(&id, "entries"));
        }

        let compacted = sanitize_tool_messages(compact_history(&history, tail, &[]));
        prop_assert!(compacted.len() <= PRESERVE_HEAD + 1 + tail);
        prop_assert_eq!(&compacted[0].content, "prompt");
        prop_assert_eq!(&compacted[1].content, "query");

        let mut ids = HashSet::new();
        for message in &compacted {
            ids.extend(message.tool_calls.iter().map(|call| call.id.clone()));
            if let Some(id) = &message.tool_call_id {
                prop_assert!(ids.contains(id));
            }
        }
    }

    /// Property: compressed content keeps exactly head plus tail lines and a marker
    #[test]
    fn prop_compression_keeps_head_and_tail(
        lines in 1usize..600,
        head in 1usize..50,
        tail in 1usize..50
    ) {
        let text = (1..=lines).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        match compress_file_content(&text, 100, head, tail) {
            Some(compressed) => {
                prop_assert!(lines > 100);
                prop_assert_eq!(compressed.lines().count(), head + tail + 1);
                prop_assert!(compressed.starts_with("line 1\n"));
                let last_line = format!("line {lines}");
                prop_assert!(compressed.ends_with(&last_line));
            }
            None => prop_assert!(lines <= 100 || head + tail >= lines),
        }
    }
}
