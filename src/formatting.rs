// src/formatting.rs

use crate::core::LogEntry;
use crate::serializer::{truncate_chars, ErrorNode};

/// A trait for formatting a log entry into a single alert string.
pub trait EntryFormatter: Send + Sync {
    fn format(&self, entry: &LogEntry) -> String;
}

/// The default formatter: a compact multi-line text block with a fixed
/// header line, truncated as a whole so the header always survives.
pub struct AlertFormatter {
    max_length: usize,
}

impl AlertFormatter {
    pub fn new(max_length: usize) -> Self {
        Self { max_length }
    }

    fn format_error(node: &ErrorNode) -> String {
        let name = node.name.as_deref().unwrap_or("Error");
        let mut block = format!("error: {}: {}", name, node.message);
        if let Some(code) = &node.code {
            block.push_str(&format!(" (code {code})"));
        }
        if let Some(stack) = &node.stack {
            block.push('\n');
            block.push_str(stack);
        }
        block
    }
}

impl EntryFormatter for AlertFormatter {
    fn format(&self, entry: &LogEntry) -> String {
        let mut lines = vec![format!(
            "[{}] {} ({}) {}",
            entry.level, entry.origin, entry.entry_id, entry.message
        )];

        let ids: Vec<&str> = [entry.correlation_id.as_deref(), entry.session_id.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        if !ids.is_empty() {
            lines.push(format!("ids: {}", ids.join(" / ")));
        }

        if let Some(comment) = &entry.comment {
            lines.push(format!("note: {comment}"));
        }

        if let Some(error) = &entry.error {
            lines.push(Self::format_error(error));
        }

        // Tail is discarded, never the head.
        truncate_chars(&lines.join("\n"), self.max_length).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Level;
    use crate::serializer::{ErrorCode, TRUNCATION_MARKER};

    fn entry() -> LogEntry {
        LogEntry {
            timestamp: "2025-07-08T21:03:52+02:00".to_string(),
            level: Level::Error,
            origin: "payments".to_string(),
            entry_id: "a1b2c3".to_string(),
            message: "charge failed".to_string(),
            notify: true,
            ..Default::default()
        }
    }

    #[test]
    fn header_carries_level_origin_and_id() {
        let formatter = AlertFormatter::new(2000);
        let text = formatter.format(&entry());
        assert_eq!(text, "[ERROR] payments (a1b2c3) charge failed");
    }

    #[test]
    fn optional_fields_each_get_a_line() {
        let mut e = entry();
        e.correlation_id = Some("req-123".to_string());
        e.session_id = Some("sess-9".to_string());
        e.comment = Some("second retry".to_string());

        let text = AlertFormatter::new(2000).format(&e);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[1], "ids: req-123 / sess-9");
        assert_eq!(lines[2], "note: second retry");
    }

    #[test]
    fn single_correlation_id_has_no_separator() {
        let mut e = entry();
        e.session_id = Some("sess-9".to_string());
        let text = AlertFormatter::new(2000).format(&e);
        assert!(text.lines().any(|l| l == "ids: sess-9"));
    }

    #[test]
    fn error_summary_includes_name_message_code_and_stack() {
        let mut e = entry();
        e.error = Some(ErrorNode {
            name: Some("TimeoutError".to_string()),
            message: "upstream timed out".to_string(),
            code: Some(ErrorCode::Text("ETIMEDOUT".to_string())),
            stack: Some("at gateway.rs:42".to_string()),
            ..Default::default()
        });

        let text = AlertFormatter::new(2000).format(&e);
        assert!(text.contains("error: TimeoutError: upstream timed out (code ETIMEDOUT)"));
        assert!(text.contains("at gateway.rs:42"));
    }

    #[test]
    fn long_messages_are_cut_from_the_tail() {
        let mut e = entry();
        e.error = Some(ErrorNode {
            message: "x".repeat(500),
            ..Default::default()
        });

        let text = AlertFormatter::new(80).format(&e);
        assert_eq!(text.chars().count(), 80);
        assert!(text.starts_with("[ERROR] payments (a1b2c3)"));
        assert!(text.ends_with(TRUNCATION_MARKER));
    }
}
