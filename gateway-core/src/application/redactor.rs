// Copyright (c) 2026 Tollgate Systems
// SPDX-License-Identifier: AGPL-3.0
//! §4.2 Redactor — a pure function masking sensitive fields before they
//! reach the audit store. Runs once, never recurses into nested objects.

use serde_json::Value;

const DEFAULT_SENSITIVE_KEYS: &[&str] = &["password", "secret", "token", "key"];
const CREDENTIAL_PATH_MARKERS: &[&str] = &[".env"];
const CREDENTIAL_SUFFIXES: &[&str] = &[".key", ".pem"];
const MASK: &str = "***REDACTED***";

/// Configuration for the redactor's sensitive-key matching. Constructed once
/// from `GatewayConfig` and reused across proposals.
#[derive(Debug, Clone)]
pub struct Redactor {
    sensitive_keys: Vec<String>,
}

impl Default for Redactor {
    fn default() -> Self {
        Self {
            sensitive_keys: DEFAULT_SENSITIVE_KEYS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Redactor {
    pub fn new(sensitive_keys: Vec<String>) -> Self {
        let sensitive_keys = if sensitive_keys.is_empty() {
            DEFAULT_SENSITIVE_KEYS.iter().map(|s| s.to_string()).collect()
        } else {
            sensitive_keys.into_iter().map(|k| k.to_lowercase()).collect()
        };
        Self { sensitive_keys }
    }

    fn key_is_sensitive(&self, key: &str) -> bool {
        let lower = key.to_lowercase();
        self.sensitive_keys.iter().any(|needle| lower.contains(needle.as_str()))
    }

    fn value_looks_like_credential_path(value: &str) -> bool {
        CREDENTIAL_PATH_MARKERS.iter().any(|marker| value.contains(marker))
            || CREDENTIAL_SUFFIXES.iter().any(|suffix| value.ends_with(suffix))
    }

    /// Masks sensitive keys and credential-shaped string values in a single
    /// flat pass over the top-level object. Non-object input passes through
    /// unchanged (the pipeline only calls this after confirming `args` is an
    /// object; §4.6 step 1 handles the non-object case separately).
    pub fn redact(&self, args: &Value) -> Value {
        let Value::Object(map) = args else {
            return args.clone();
        };
        let mut redacted = serde_json::Map::with_capacity(map.len());
        for (key, value) in map {
            if self.key_is_sensitive(key) {
                redacted.insert(key.clone(), Value::String(MASK.to_string()));
                continue;
            }
            match value {
                Value::String(s) if Self::value_looks_like_credential_path(s) => {
                    redacted.insert(key.clone(), Value::String(MASK.to_string()));
                }
                other => {
                    redacted.insert(key.clone(), other.clone());
                }
            }
        }
        Value::Object(redacted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn masks_sensitive_keys_case_insensitively() {
        let redactor = Redactor::default();
        let input = json!({"Password": "hunter2", "note": "fine"});
        let out = redactor.redact(&input);
        assert_eq!(out["Password"], MASK);
        assert_eq!(out["note"], "fine");
    }

    #[test]
    fn masks_credential_shaped_paths() {
        let redactor = Redactor::default();
        let input = json!({"path": "/sandbox/.env", "other": "/sandbox/id_rsa.pem"});
        let out = redactor.redact(&input);
        assert_eq!(out["path"], MASK);
        assert_eq!(out["other"], MASK);
    }

    #[test]
    fn leaves_unrelated_values_byte_identical() {
        let redactor = Redactor::default();
        let input = json!({"path": "/sandbox/example.txt", "content": "hi"});
        let out = redactor.redact(&input);
        assert_eq!(out, input);
    }

    #[test]
    fn redaction_is_idempotent() {
        let redactor = Redactor::default();
        let input = json!({"password": "hunter2", "path": "/sandbox/a.txt"});
        let once = redactor.redact(&input);
        let twice = redactor.redact(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn does_not_recurse_into_nested_objects() {
        let redactor = Redactor::default();
        let input = json!({"nested": {"password": "hunter2"}});
        let out = redactor.redact(&input);
        assert_eq!(out["nested"]["password"], "hunter2");
    }
}
