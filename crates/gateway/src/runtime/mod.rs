//! Core runtime — the orchestrator that ties the store, event bus,
//! permission gate, tool registry, and LLM streaming into one
//! deterministic loop.
//!
//! Entry point: [`scheduler::SessionScheduler::start_turn`] admits a user
//! message and spawns [`turn::run_turn`] as a background task.

pub mod bus;
pub mod cancel;
pub mod context;
pub mod gate;
pub mod scheduler;
pub mod subagent;
pub mod title;
pub mod turn;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Truncate at a UTF-8 boundary, appending `...` when shortened.
pub(crate) fn truncate_str(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) && end > 0 {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

/// Unified diff between two file states, with `a/`/`b/` headers.
pub(crate) fn unified_diff(path: &str, before: &str, after: &str) -> String {
    similar::TextDiff::from_lines(before, after)
        .unified_diff()
        .context_radius(3)
        .header(&format!("a/{path}"), &format!("b/{path}"))
        .to_string()
}

/// Read a file, returning an empty string for anything unreadable. Used
/// for pre-mutation snapshots where "missing" and "empty" are equivalent.
pub(crate) fn read_file_best_effort(path: &std::path::Path) -> String {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => std::fs::read_to_string(path).unwrap_or_default(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_str_within_limit() {
        assert_eq!(truncate_str("hello", 10), "hello");
        assert_eq!(truncate_str("hello", 5), "hello");
    }

    #[test]
    fn truncate_str_over_limit() {
        assert_eq!(truncate_str("hello world", 5), "hello...");
    }

    #[test]
    fn truncate_str_multibyte_no_split() {
        // Truncating at byte 2 would land inside the 2-byte 'é'.
        let result = truncate_str("h\u{00e9}llo", 2);
        assert_eq!(result, "h...");
    }

    #[test]
    fn unified_diff_new_file() {
        let diff = unified_diff("notes.txt", "", "x\n");
        assert!(diff.contains("a/notes.txt"), "{diff}");
        assert!(diff.contains("b/notes.txt"));
        assert!(diff.contains("+x"));
    }

    #[test]
    fn unified_diff_line_change() {
        let diff = unified_diff("f.txt", "old\nsame\n", "new\nsame\n");
        assert!(diff.contains("-old"));
        assert!(diff.contains("+new"));
        assert!(!diff.contains("-same"));
    }

    #[test]
    fn read_best_effort_missing_is_empty() {
        assert_eq!(
            read_file_best_effort(std::path::Path::new("/nonexistent/x")),
            ""
        );
    }
}
