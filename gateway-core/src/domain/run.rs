// Copyright (c) 2026 Tollgate Systems
// SPDX-License-Identifier: AGPL-3.0
//! The `Run` aggregate — one bounded orchestrator invocation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::ids::RunId;

/// Reserved meta-key sigil separating orchestrator metadata from tool
/// arguments in a raw proposal payload (§4.6 step 2).
pub const META_KEY_PREFIX: &str = "__";

/// One orchestrator invocation. Immutable after creation; owns zero or more
/// tool calls (owned by reference through `RunId`, not by containment).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub orchestrator: String,
    pub agent_role: String,
    pub created_at: DateTime<Utc>,
}

impl Run {
    pub fn new(orchestrator: impl Into<String>, agent_role: impl Into<String>) -> Self {
        Self {
            id: RunId::new(),
            orchestrator: orchestrator.into(),
            agent_role: agent_role.into(),
            created_at: Utc::now(),
        }
    }

    /// Builds a `Run` from the reserved meta keys split out of a proposal's
    /// argument map, falling back to `"unknown"` when absent.
    pub fn from_meta(meta: &HashMap<String, String>) -> Self {
        let orchestrator = meta
            .get("__orchestrator")
            .cloned()
            .unwrap_or_else(|| "unknown".to_string());
        let agent_role = meta
            .get("__agent_role")
            .cloned()
            .unwrap_or_else(|| "unknown".to_string());
        Self::new(orchestrator, agent_role)
    }
}

/// Splits reserved `__`-prefixed meta keys from a raw JSON argument object,
/// returning (real tool arguments, meta map). Meta values are coerced to
/// strings; non-string meta values are JSON-stringified.
pub fn split_meta(args: &serde_json::Map<String, serde_json::Value>) -> (serde_json::Map<String, serde_json::Value>, HashMap<String, String>) {
    let mut tool_args = serde_json::Map::new();
    let mut meta = HashMap::new();
    for (key, value) in args {
        if key.starts_with(META_KEY_PREFIX) {
            let as_string = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            meta.insert(key.clone(), as_string);
        } else {
            tool_args.insert(key.clone(), value.clone());
        }
    }
    (tool_args, meta)
}
