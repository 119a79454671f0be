//! Bounded serialization of arbitrary error values
//!
//! Errors attached to log entries can be arbitrarily deep (long `cause`
//! chains) and arbitrarily large (stack traces, HTTP response bodies).
//! This module folds any input value into an [`ErrorNode`] tree whose depth
//! and text fields are bounded by explicit limits, so an entry is always
//! safe to format and ship regardless of what was thrown at the facade.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::fmt;

/// Marker appended to any text field cut down by [`truncate_chars`].
pub const TRUNCATION_MARKER: &str = "...";

/// Message carried by the sentinel node that terminates an over-deep
/// cause chain.
pub const CAUSE_DEPTH_MESSAGE: &str = "[cause depth limit reached]";

/// Name given to nodes synthesized from values that are not error-like.
const UNKNOWN_ERROR_NAME: &str = "UnknownError";

/// Fallback message for error-like values with an empty message.
const EMPTY_MESSAGE: &str = "Unknown error";

/// Bounds applied while serializing an error value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SerializeLimits {
    /// Maximum characters kept from a stack trace.
    pub stack_limit: usize,
    /// Maximum characters kept from an HTTP response body.
    pub response_data_limit: usize,
    /// Maximum depth of the serialized cause chain. Chains that would go
    /// deeper terminate in a sentinel node.
    pub cause_max_depth: usize,
}

impl Default for SerializeLimits {
    fn default() -> Self {
        Self {
            stack_limit: 1500,
            response_data_limit: 600,
            cause_max_depth: 4,
        }
    }
}

/// An error code, which upstream systems report as either text or a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorCode {
    Number(i64),
    Text(String),
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::Number(n) => write!(f, "{n}"),
            ErrorCode::Text(s) => f.write_str(s),
        }
    }
}

/// HTTP response details carried by an error, when present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct HttpDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_text: Option<String>,
    /// Response body, stringified and truncated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// A bounded, serializable rendition of an error value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ErrorNode {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<ErrorNode>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpDetails>,
}

impl ErrorNode {
    fn depth_sentinel() -> Self {
        Self {
            message: CAUSE_DEPTH_MESSAGE.to_string(),
            ..Default::default()
        }
    }

    /// Number of nodes in the cause chain, this node included.
    pub fn chain_len(&self) -> usize {
        let mut len = 1;
        let mut node = self;
        while let Some(cause) = &node.cause {
            len += 1;
            node = cause;
        }
        len
    }
}

/// Serializes an arbitrary decoded value into a bounded [`ErrorNode`] tree.
///
/// Never fails and never panics; values that do not look like errors become
/// a single `UnknownError` node carrying their string form. The cause chain
/// of the result is at most `cause_max_depth + 1` nodes long, counting the
/// sentinel that replaces any deeper cause.
pub fn serialize(value: &Value, limits: &SerializeLimits) -> ErrorNode {
    serialize_at(value, limits, 1)
}

fn serialize_at(value: &Value, limits: &SerializeLimits, depth: usize) -> ErrorNode {
    if depth > limits.cause_max_depth {
        // Do not descend into the subtree at all.
        return ErrorNode::depth_sentinel();
    }

    // Error-like means "has a string message field".
    let Some(message) = value.get("message").and_then(Value::as_str) else {
        return ErrorNode {
            name: Some(UNKNOWN_ERROR_NAME.to_string()),
            message: string_form(value),
            ..Default::default()
        };
    };

    let message = if message.is_empty() {
        EMPTY_MESSAGE.to_string()
    } else {
        message.to_string()
    };

    let name = value
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_owned);

    let stack = value
        .get("stack")
        .and_then(Value::as_str)
        .map(|s| truncate_chars(s, limits.stack_limit).into_owned());

    let code = match value.get("code") {
        Some(Value::String(s)) => Some(ErrorCode::Text(s.clone())),
        // Non-integer numbers are kept in their string form rather than
        // dropped.
        Some(Value::Number(n)) => Some(
            n.as_i64()
                .map(ErrorCode::Number)
                .unwrap_or_else(|| ErrorCode::Text(n.to_string())),
        ),
        _ => None,
    };

    let cause = value
        .get("cause")
        .filter(|c| !c.is_null())
        .map(|c| Box::new(serialize_at(c, limits, depth + 1)));

    ErrorNode {
        name,
        message,
        stack,
        code,
        cause,
        http: http_details(value, limits),
    }
}

fn http_details(value: &Value, limits: &SerializeLimits) -> Option<HttpDetails> {
    let response = value.get("response")?.as_object()?;

    let data = response.get("data").map(|d| {
        let text = string_form(d);
        truncate_chars(&text, limits.response_data_limit).into_owned()
    });

    Some(HttpDetails {
        status: response
            .get("status")
            .and_then(Value::as_u64)
            .and_then(|s| u16::try_from(s).ok()),
        status_text: response
            .get("statusText")
            .and_then(Value::as_str)
            .map(str::to_owned),
        data,
    })
}

/// The string form of a value: the raw text for strings, the JSON encoding
/// for everything else.
fn string_form(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Serializes a standard error by walking its `source()` chain, under the
/// same depth bound as [`serialize`].
pub fn from_std_error(
    err: &(dyn std::error::Error + 'static),
    limits: &SerializeLimits,
) -> ErrorNode {
    fn node_at(
        err: &(dyn std::error::Error + 'static),
        limits: &SerializeLimits,
        depth: usize,
    ) -> ErrorNode {
        if depth > limits.cause_max_depth {
            return ErrorNode::depth_sentinel();
        }
        ErrorNode {
            message: err.to_string(),
            cause: err
                .source()
                .map(|source| Box::new(node_at(source, limits, depth + 1))),
            ..Default::default()
        }
    }
    node_at(err, limits, 1)
}

/// Truncates `text` to at most `limit` characters, ending in
/// [`TRUNCATION_MARKER`] when anything was cut.
///
/// When truncation occurs the result is exactly `limit` characters long, so
/// truncating an already-truncated string at the same limit is a no-op.
/// Operates on characters, never splitting a multi-byte sequence.
pub fn truncate_chars(text: &str, limit: usize) -> Cow<'_, str> {
    let marker_len = TRUNCATION_MARKER.chars().count();
    if text.chars().count() <= limit {
        return Cow::Borrowed(text);
    }
    if limit <= marker_len {
        return Cow::Owned(TRUNCATION_MARKER.chars().take(limit).collect());
    }
    let kept: String = text.chars().take(limit - marker_len).collect();
    Cow::Owned(format!("{kept}{TRUNCATION_MARKER}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn limits(cause_max_depth: usize) -> SerializeLimits {
        SerializeLimits {
            cause_max_depth,
            ..Default::default()
        }
    }

    #[test]
    fn serializes_a_plain_error() {
        let input = json!({
            "name": "Error",
            "message": "boom",
            "stack": "Error: boom\n  at main",
        });
        let node = serialize(&input, &SerializeLimits::default());
        assert_eq!(node.name.as_deref(), Some("Error"));
        assert_eq!(node.message, "boom");
        assert_eq!(node.stack.as_deref(), Some("Error: boom\n  at main"));
        assert!(node.cause.is_none());
        assert!(node.http.is_none());
    }

    #[test]
    fn non_error_values_become_unknown_error_nodes() {
        for input in [json!(42), json!("it broke"), json!(["a", "b"]), json!(null)] {
            let node = serialize(&input, &SerializeLimits::default());
            assert_eq!(node.name.as_deref(), Some("UnknownError"));
            assert!(node.cause.is_none());
            assert!(node.stack.is_none());
        }
        let node = serialize(&json!("it broke"), &SerializeLimits::default());
        assert_eq!(node.message, "it broke");
        let node = serialize(&json!({"detail": "no message"}), &SerializeLimits::default());
        assert_eq!(node.message, r#"{"detail":"no message"}"#);
    }

    #[test]
    fn empty_message_gets_a_default() {
        let node = serialize(&json!({"message": ""}), &SerializeLimits::default());
        assert_eq!(node.message, "Unknown error");
    }

    #[test]
    fn code_accepts_text_and_numbers() {
        let node = serialize(
            &json!({"message": "x", "code": "ETIMEDOUT"}),
            &SerializeLimits::default(),
        );
        assert_eq!(node.code, Some(ErrorCode::Text("ETIMEDOUT".into())));

        let node = serialize(&json!({"message": "x", "code": 504}), &SerializeLimits::default());
        assert_eq!(node.code, Some(ErrorCode::Number(504)));

        // Fractional codes survive as text instead of being dropped.
        let node = serialize(&json!({"message": "x", "code": 3.5}), &SerializeLimits::default());
        assert_eq!(node.code, Some(ErrorCode::Text("3.5".into())));
    }

    #[test]
    fn http_response_data_is_stringified_and_truncated() {
        let lim = SerializeLimits {
            response_data_limit: 10,
            ..Default::default()
        };
        let input = json!({
            "message": "request failed",
            "response": {
                "status": 502,
                "statusText": "Bad Gateway",
                "data": {"error": "upstream unavailable"},
            },
        });
        let node = serialize(&input, &lim);
        let http = node.http.expect("response details should be captured");
        assert_eq!(http.status, Some(502));
        assert_eq!(http.status_text.as_deref(), Some("Bad Gateway"));
        let data = http.data.expect("data should be captured");
        assert_eq!(data.chars().count(), 10);
        assert!(data.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn cause_chain_is_depth_bounded() {
        // Build a chain 20 causes deep.
        let mut input = json!({"message": "leaf"});
        for i in 0..20 {
            input = json!({"message": format!("level {i}"), "cause": input});
        }

        let lim = limits(3);
        let node = serialize(&input, &lim);
        assert_eq!(node.chain_len(), lim.cause_max_depth + 1);

        let mut tail = &node;
        while let Some(cause) = &tail.cause {
            tail = cause;
        }
        assert_eq!(tail.message, CAUSE_DEPTH_MESSAGE);
    }

    #[test]
    fn shallow_chain_is_kept_intact_without_sentinel() {
        let input = json!({
            "message": "outer",
            "cause": {"message": "inner"},
        });
        let node = serialize(&input, &limits(3));
        assert_eq!(node.chain_len(), 2);
        let cause = node.cause.expect("cause kept");
        assert_eq!(cause.message, "inner");
        assert!(cause.cause.is_none());
    }

    #[test]
    fn stack_is_truncated_to_the_limit() {
        let lim = SerializeLimits {
            stack_limit: 20,
            ..Default::default()
        };
        let input = json!({"message": "x", "stack": "y".repeat(100)});
        let node = serialize(&input, &lim);
        let stack = node.stack.unwrap();
        assert_eq!(stack.chars().count(), 20);
        assert!(stack.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn truncation_is_exact_and_idempotent() {
        let text = "abcdefghij";
        let once = truncate_chars(text, 7);
        assert_eq!(once.chars().count(), 7);
        assert!(once.ends_with(TRUNCATION_MARKER));
        let twice = truncate_chars(&once, 7);
        assert_eq!(once, twice);

        // Below the limit nothing changes.
        assert_eq!(truncate_chars("short", 10), "short");
        // Character-based, not byte-based.
        let wide = "éééééééééé";
        assert_eq!(truncate_chars(wide, 6).chars().count(), 6);
    }

    #[test]
    fn std_error_chain_follows_sources() {
        use std::fmt;

        #[derive(Debug)]
        struct Layered {
            label: &'static str,
            inner: Option<Box<Layered>>,
        }
        impl fmt::Display for Layered {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label)
            }
        }
        impl std::error::Error for Layered {
            fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
                self.inner
                    .as_deref()
                    .map(|e| e as &(dyn std::error::Error + 'static))
            }
        }

        let err = Layered {
            label: "outer",
            inner: Some(Box::new(Layered {
                label: "inner",
                inner: None,
            })),
        };
        let node = from_std_error(&err, &SerializeLimits::default());
        assert_eq!(node.message, "outer");
        assert_eq!(node.cause.as_ref().unwrap().message, "inner");
        assert_eq!(node.chain_len(), 2);
    }

    #[test]
    fn serialized_node_omits_absent_fields() {
        let node = serialize(&json!({"message": "boom"}), &SerializeLimits::default());
        let encoded = serde_json::to_value(&node).unwrap();
        assert_eq!(encoded, json!({"message": "boom"}));
    }
}
