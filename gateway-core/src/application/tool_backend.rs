// Copyright (c) 2026 Tollgate Systems
// SPDX-License-Identifier: AGPL-3.0
//! §4.5 Tool Backend capability — the pluggable transport to downstream
//! tool servers. Concrete HTTP and stdio JSON-RPC adapters live in
//! `infrastructure::backends`.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::domain::tool_server::ToolContract;

/// Error surfaced by a backend call, mapped to a `BLOCK` decision by the
/// pipeline (§7 BackendTransport / BackendDomain).
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("transport error: {detail}")]
    Transport { detail: String },
    #[error("backend error: {detail}")]
    Domain { detail: String },
    #[error("backend call timed out after {millis}ms")]
    Timeout { millis: u64 },
}

/// A transport-specific adapter for invoking a tool by name and discovering
/// a server's tool catalog. Backends resolve name-stripping internally: a
/// backend may strip a configured server prefix before dispatching the raw
/// name to the underlying transport.
#[async_trait]
pub trait ToolBackend: Send + Sync {
    async fn call_tool(&self, name: &str, args: &Value) -> Result<Value, BackendError>;

    async fn list_tools(&self, server: Option<&str>) -> Result<Vec<ToolContract>, BackendError>;
}

/// Normalizes a raw tool result to the string form persisted on a
/// `ToolCall` (§4.6 step 6): primitives stringify, structured values
/// JSON-serialize.
pub fn normalize_result(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Unwraps a JSON-RPC `result` shaped as `{content: [{type: "text", text:
/// ...}], ...}` to the inner text, parsing it as JSON if it parses, else
/// returning the raw text (§4.5 Result normalization).
pub fn unwrap_content_array(result: &Value) -> Value {
    let Some(content) = result.get("content").and_then(Value::as_array) else {
        return result.clone();
    };
    let Some(first) = content.first() else {
        return result.clone();
    };
    if first.get("type").and_then(Value::as_str) != Some("text") {
        return result.clone();
    }
    let Some(text) = first.get("text").and_then(Value::as_str) else {
        return result.clone();
    };
    serde_json::from_str::<Value>(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_primitives_and_objects() {
        assert_eq!(normalize_result(&json!("hi")), "hi");
        assert_eq!(normalize_result(&json!(42)), "42");
        assert_eq!(normalize_result(&json!({"a": 1})), "{\"a\":1}");
    }

    #[test]
    fn unwraps_text_content_array() {
        let result = json!({"content": [{"type": "text", "text": "Example content."}]});
        assert_eq!(unwrap_content_array(&result), json!("Example content."));
    }

    #[test]
    fn unwraps_json_text_into_parsed_value() {
        let result = json!({"content": [{"type": "text", "text": "{\"count\": 3}"}]});
        assert_eq!(unwrap_content_array(&result), json!({"count": 3}));
    }

    #[test]
    fn passes_through_non_content_results() {
        let result = json!({"ok": true});
        assert_eq!(unwrap_content_array(&result), result);
    }
}
