// Copyright (c) 2026 Tollgate Systems
// SPDX-License-Identifier: AGPL-3.0
//! Verdict records and the wire-level `ToolDecision` shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ids::{DecisionId, ToolCallId};
use crate::domain::tool_call::ToolCallStatus;

/// The outcome of evaluating a `(tool, args)` pair against policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Allow,
    Block,
    ApprovalRequired,
}

impl Verdict {
    /// Parses a loosely-typed verdict string, collapsing anything
    /// unrecognized to `Block` per the policy engine's defensive rule.
    pub fn parse_defensive(raw: &str) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "ALLOW" => Verdict::Allow,
            "APPROVAL_REQUIRED" => Verdict::ApprovalRequired,
            _ => Verdict::Block,
        }
    }
}

/// One persisted verdict attached to a tool call. Decisions are append-only:
/// a pending call may accumulate more than one as it moves through approval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub id: DecisionId,
    pub tool_call_id: ToolCallId,
    pub verdict: Verdict,
    pub reason: String,
    /// Risk score in `[0, 1]`, clamped by the policy engine. Absent for
    /// decisions produced outside policy evaluation (e.g. not-found errors).
    pub risk_score: Option<f64>,
    pub policy_citations: Vec<String>,
    pub control_citations: Vec<String>,
    pub incident_citations: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Decision {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tool_call_id: ToolCallId,
        verdict: Verdict,
        reason: impl Into<String>,
        risk_score: Option<f64>,
        policy_citations: Vec<String>,
        control_citations: Vec<String>,
        incident_citations: Vec<String>,
    ) -> Self {
        Self {
            id: DecisionId::new(),
            tool_call_id,
            verdict,
            reason: reason.into(),
            risk_score,
            policy_citations,
            control_citations,
            incident_citations,
            created_at: Utc::now(),
        }
    }
}

/// The terminal status reported to a caller alongside a verdict. Distinct
/// from `ToolCallStatus` because a `ToolDecision` is a point-in-time view,
/// not the full lifecycle record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalStatus {
    Pending,
    Executed,
    Denied,
}

impl From<ToolCallStatus> for Option<FinalStatus> {
    fn from(status: ToolCallStatus) -> Self {
        match status {
            ToolCallStatus::Pending => Some(FinalStatus::Pending),
            ToolCallStatus::Executed => Some(FinalStatus::Executed),
            ToolCallStatus::Denied => Some(FinalStatus::Denied),
            ToolCallStatus::Approved | ToolCallStatus::Failed | ToolCallStatus::Blocked => None,
        }
    }
}

/// The wire-level record returned by `propose`/`approve`/`deny` (§3, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDecision {
    pub tool_call_id: ToolCallId,
    pub decision: Verdict,
    pub reason: String,
    pub result: Option<String>,
    pub final_status: Option<FinalStatus>,
    #[serde(default)]
    pub policy_citations: Vec<String>,
    #[serde(default)]
    pub incident_citations: Vec<String>,
    #[serde(default)]
    pub control_citations: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_verdict_string_collapses_to_block() {
        assert_eq!(Verdict::parse_defensive("allow"), Verdict::Allow);
        assert_eq!(Verdict::parse_defensive("approval_required"), Verdict::ApprovalRequired);
        assert_eq!(Verdict::parse_defensive("garbage"), Verdict::Block);
        assert_eq!(Verdict::parse_defensive(""), Verdict::Block);
    }

    #[test]
    fn citation_lists_serialize_as_empty_arrays_not_null() {
        let decision = ToolDecision {
            tool_call_id: ToolCallId::new(),
            decision: Verdict::Block,
            reason: "Unknown tool".into(),
            result: None,
            final_status: None,
            policy_citations: vec![],
            incident_citations: vec![],
            control_citations: vec![],
        };
        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json["policy_citations"], serde_json::json!([]));
        assert_eq!(json["incident_citations"], serde_json::json!([]));
        assert_eq!(json["control_citations"], serde_json::json!([]));
    }
}
