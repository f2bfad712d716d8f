// Copyright (c) 2026 Tollgate Systems
// SPDX-License-Identifier: AGPL-3.0
//! §4.3 Policy Engine — pure `(tool, args) -> {verdict, reason, risk}`.
//! Built-in rules take precedence over the configured prefix table.

use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::domain::decision::Verdict;
use crate::domain::policy::{clamp_risk, PolicyOutcome, PrefixRule};

const DEFAULT_BLOCKED_SUFFIXES: &[&str] = &[".env", ".key", ".pem"];
const WRITE_APPROVAL_RISK: f64 = 0.7;

/// One configured `{verdict, reason, risk}` rule keyed by tool-name prefix,
/// pre-sorted longest-first at construction so evaluation never re-sorts.
#[derive(Debug, Clone)]
struct SortedRule {
    prefix: String,
    verdict: Verdict,
    reason: String,
    risk: Option<f64>,
}

/// Evaluates `(tool, args)` against built-in filesystem rules, then a
/// configured prefix table. Pure and deterministic; owns no I/O.
#[derive(Debug, Clone)]
pub struct PolicyEngine {
    sandbox_root: PathBuf,
    blocked_suffixes: Vec<String>,
    rules: Vec<SortedRule>,
}

impl PolicyEngine {
    /// Builds the engine from a sandbox root and a raw prefix-rule table.
    /// A malformed table entry is dropped with the rest of the table kept —
    /// the original source falls back to an empty table rather than
    /// refusing to start, and this mirrors that at the per-entry level.
    pub fn new(sandbox_root: PathBuf, prefix_rules: HashMap<String, PrefixRule>, blocked_suffixes: Vec<String>) -> Self {
        let mut rules: Vec<SortedRule> = prefix_rules
            .into_iter()
            .map(|(prefix, rule)| SortedRule {
                prefix,
                verdict: Verdict::parse_defensive(&rule.verdict),
                reason: rule.reason,
                risk: rule.risk.map(clamp_risk),
            })
            .collect();
        rules.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));

        let blocked_suffixes = if blocked_suffixes.is_empty() {
            DEFAULT_BLOCKED_SUFFIXES.iter().map(|s| s.to_string()).collect()
        } else {
            blocked_suffixes
        };

        Self {
            sandbox_root,
            blocked_suffixes,
            rules,
        }
    }

    fn is_under_sandbox(&self, path: &Path) -> bool {
        path.starts_with(&self.sandbox_root)
    }

    fn matches_blocklist(&self, path: &str) -> bool {
        self.blocked_suffixes.iter().any(|needle| path.contains(needle.as_str()))
    }

    fn path_arg(args: &Value) -> Option<PathBuf> {
        args.get("path").and_then(Value::as_str).map(PathBuf::from)
    }

    fn evaluate_prefix_table(&self, tool: &str) -> PolicyOutcome {
        for rule in &self.rules {
            if tool.starts_with(&rule.prefix) {
                return PolicyOutcome {
                    verdict: rule.verdict,
                    reason: rule.reason.clone(),
                    risk_score: rule.risk,
                };
            }
        }
        PolicyOutcome {
            verdict: Verdict::Block,
            reason: "Unknown tool".to_string(),
            risk_score: Some(1.0),
        }
    }

    /// Evaluates one `(tool, args)` proposal. Never performs I/O.
    pub fn evaluate(&self, tool: &str, args: &Value) -> PolicyOutcome {
        match tool {
            "fs.list_dir" => {
                let path = Self::path_arg(args).unwrap_or_else(|| self.sandbox_root.clone());
                if self.is_under_sandbox(&path) {
                    PolicyOutcome {
                        verdict: Verdict::Allow,
                        reason: "Directory listing allowed".to_string(),
                        risk_score: Some(0.0),
                    }
                } else {
                    PolicyOutcome {
                        verdict: Verdict::Block,
                        reason: "path must be under /sandbox".to_string(),
                        risk_score: Some(1.0),
                    }
                }
            }
            "fs.read_file" => {
                let path = Self::path_arg(args).unwrap_or_default();
                let path_str = path.to_string_lossy().to_string();
                if !path_str.is_empty() && !self.is_under_sandbox(&path) {
                    return PolicyOutcome {
                        verdict: Verdict::Block,
                        reason: "path must be under /sandbox".to_string(),
                        risk_score: Some(1.0),
                    };
                }
                if self.matches_blocklist(&path_str) {
                    return PolicyOutcome {
                        verdict: Verdict::Block,
                        reason: "Access to secret file denied".to_string(),
                        risk_score: Some(1.0),
                    };
                }
                PolicyOutcome {
                    verdict: Verdict::Allow,
                    reason: "File read allowed".to_string(),
                    risk_score: Some(0.0),
                }
            }
            "fs.write_file" => {
                let mut path = Self::path_arg(args).unwrap_or_default();
                if !path.as_os_str().is_empty() && !path.is_absolute() {
                    path = self.sandbox_root.join(&path);
                }
                if !self.is_under_sandbox(&path) {
                    return PolicyOutcome {
                        verdict: Verdict::Block,
                        reason: "path must be under /sandbox".to_string(),
                        risk_score: Some(1.0),
                    };
                }
                PolicyOutcome {
                    verdict: Verdict::ApprovalRequired,
                    reason: "Write requires approval".to_string(),
                    risk_score: Some(WRITE_APPROVAL_RISK),
                }
            }
            other => self.evaluate_prefix_table(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engine() -> PolicyEngine {
        PolicyEngine::new(PathBuf::from("/sandbox"), HashMap::new(), vec![])
    }

    #[test]
    fn read_outside_sandbox_blocks() {
        let outcome = engine().evaluate("fs.read_file", &json!({"path": "/etc/passwd"}));
        assert_eq!(outcome.verdict, Verdict::Block);
        assert_eq!(outcome.reason, "path must be under /sandbox");
    }

    #[test]
    fn read_inside_sandbox_allows() {
        let outcome = engine().evaluate("fs.read_file", &json!({"path": "/sandbox/example.txt"}));
        assert_eq!(outcome.verdict, Verdict::Allow);
    }

    #[test]
    fn read_blocklisted_suffix_blocks_even_inside_sandbox() {
        let outcome = engine().evaluate("fs.read_file", &json!({"path": "/sandbox/secrets.pem"}));
        assert_eq!(outcome.verdict, Verdict::Block);
        assert_eq!(outcome.reason, "Access to secret file denied");
    }

    #[test]
    fn write_inside_sandbox_requires_approval() {
        let outcome = engine().evaluate("fs.write_file", &json!({"path": "/sandbox/test.txt"}));
        assert_eq!(outcome.verdict, Verdict::ApprovalRequired);
        assert_eq!(outcome.risk_score, Some(0.7));
    }

    #[test]
    fn write_with_relative_path_normalizes_into_sandbox() {
        let outcome = engine().evaluate("fs.write_file", &json!({"path": "test.txt"}));
        assert_eq!(outcome.verdict, Verdict::ApprovalRequired);
    }

    #[test]
    fn write_outside_sandbox_blocks() {
        let outcome = engine().evaluate("fs.write_file", &json!({"path": "/etc/passwd"}));
        assert_eq!(outcome.verdict, Verdict::Block);
    }

    #[test]
    fn unknown_tool_blocks_with_risk_one() {
        let outcome = engine().evaluate("made.up.tool", &json!({}));
        assert_eq!(outcome.verdict, Verdict::Block);
        assert_eq!(outcome.reason, "Unknown tool");
        assert_eq!(outcome.risk_score, Some(1.0));
    }

    #[test]
    fn prefix_table_matches_longest_first() {
        let mut rules = HashMap::new();
        rules.insert(
            "git.".to_string(),
            PrefixRule {
                verdict: "BLOCK".to_string(),
                reason: "git disabled".to_string(),
                risk: Some(0.9),
            },
        );
        rules.insert(
            "git.read_".to_string(),
            PrefixRule {
                verdict: "ALLOW".to_string(),
                reason: "reads permitted".to_string(),
                risk: Some(0.1),
            },
        );
        let engine = PolicyEngine::new(PathBuf::from("/sandbox"), rules, vec![]);
        let outcome = engine.evaluate("git.read_log", &json!({}));
        assert_eq!(outcome.verdict, Verdict::Allow);
        let outcome = engine.evaluate("git.commit", &json!({}));
        assert_eq!(outcome.verdict, Verdict::Block);
    }

    #[test]
    fn malformed_verdict_string_collapses_to_block() {
        let mut rules = HashMap::new();
        rules.insert(
            "custom.".to_string(),
            PrefixRule {
                verdict: "MAYBE".to_string(),
                reason: "weird".to_string(),
                risk: Some(2.5),
            },
        );
        let engine = PolicyEngine::new(PathBuf::from("/sandbox"), rules, vec![]);
        let outcome = engine.evaluate("custom.thing", &json!({}));
        assert_eq!(outcome.verdict, Verdict::Block);
        assert_eq!(outcome.risk_score, Some(1.0));
    }
}
