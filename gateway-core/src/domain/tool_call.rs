// Copyright (c) 2026 Tollgate Systems
// SPDX-License-Identifier: AGPL-3.0
//! The `ToolCall` aggregate and its append-only status lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::errors::DomainError;
use crate::domain::ids::{RunId, ToolCallId};

/// Status lifecycle of a proposed tool invocation (§3). Transitions are
/// monotonic and append-only: once `Executed`, `Failed`, or `Denied`, no
/// further transition is permitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToolCallStatus {
    Pending,
    Approved,
    Executed,
    Failed,
    Denied,
    Blocked,
}

impl ToolCallStatus {
    /// Whether this status can never transition further.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ToolCallStatus::Executed | ToolCallStatus::Failed | ToolCallStatus::Denied | ToolCallStatus::Blocked
        )
    }
}

/// Whether `from -> to` is a transition this aggregate allows, mirroring the
/// guards in `mark_approved`/`mark_denied`/`transition` below. Persistence
/// layers re-check this under row-level locking so two concurrent writers
/// racing the same tool call can't both win a transition that only one of
/// them should (§4.6's at-most-once execution invariant) — an in-process
/// guard on a single loaded `ToolCall` can't catch that, since each racer
/// holds its own independently loaded copy.
pub fn is_valid_transition(from: ToolCallStatus, to: ToolCallStatus) -> bool {
    match to {
        ToolCallStatus::Approved | ToolCallStatus::Denied => from == ToolCallStatus::Pending,
        ToolCallStatus::Pending | ToolCallStatus::Blocked | ToolCallStatus::Executed | ToolCallStatus::Failed => {
            !from.is_terminal()
        }
    }
}

/// One proposed invocation, identified and tracked from the moment
/// redaction completes through to execution or denial.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: ToolCallId,
    pub run_id: RunId,
    pub tool_name: String,
    /// The redacted arguments snapshot. Raw arguments are never persisted.
    pub redacted_args: Value,
    pub status: ToolCallStatus,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approval_note: Option<String>,
    pub result: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ToolCall {
    pub fn new(run_id: RunId, tool_name: impl Into<String>, redacted_args: Value, status: ToolCallStatus) -> Self {
        Self {
            id: ToolCallId::new(),
            run_id,
            tool_name: tool_name.into(),
            redacted_args,
            status,
            approved_by: None,
            approved_at: None,
            approval_note: None,
            result: None,
            created_at: Utc::now(),
        }
    }

    fn transition(&mut self, to: ToolCallStatus) -> Result<(), DomainError> {
        if self.status.is_terminal() {
            return Err(DomainError::InvalidStateTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// `PENDING` — awaiting human approval.
    pub fn mark_pending(&mut self) -> Result<(), DomainError> {
        self.transition(ToolCallStatus::Pending)
    }

    /// `BLOCKED` — policy denied the call before execution was attempted.
    pub fn mark_blocked(&mut self) -> Result<(), DomainError> {
        self.transition(ToolCallStatus::Blocked)
    }

    /// `APPROVED` — a human approved a pending call; execution is about to
    /// be attempted.
    pub fn mark_approved(&mut self, approver: Option<String>, note: Option<String>) -> Result<(), DomainError> {
        if self.status != ToolCallStatus::Pending {
            return Err(DomainError::InvalidStateTransition {
                from: self.status,
                to: ToolCallStatus::Approved,
            });
        }
        self.status = ToolCallStatus::Approved;
        self.approved_by = approver;
        self.approval_note = note;
        self.approved_at = Some(Utc::now());
        Ok(())
    }

    /// `DENIED` — a human denied a pending call. Terminal.
    pub fn mark_denied(&mut self, approver: Option<String>, note: Option<String>) -> Result<(), DomainError> {
        if self.status != ToolCallStatus::Pending {
            return Err(DomainError::InvalidStateTransition {
                from: self.status,
                to: ToolCallStatus::Denied,
            });
        }
        self.status = ToolCallStatus::Denied;
        self.approved_by = approver;
        self.approval_note = note;
        self.approved_at = Some(Utc::now());
        Ok(())
    }

    /// `EXECUTED` — the backend call succeeded. Terminal. At-most-once: this
    /// fails if the call is already terminal.
    pub fn mark_executed(&mut self, result: String) -> Result<(), DomainError> {
        self.transition(ToolCallStatus::Executed)?;
        self.result = Some(result);
        Ok(())
    }

    /// `FAILED` — the backend call failed. Terminal.
    pub fn mark_failed(&mut self) -> Result<(), DomainError> {
        self.transition(ToolCallStatus::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fresh_call(status: ToolCallStatus) -> ToolCall {
        ToolCall::new(RunId::new(), "fs.read_file", json!({"path": "/sandbox/a"}), status)
    }

    #[test]
    fn executed_is_terminal() {
        let mut call = fresh_call(ToolCallStatus::Pending);
        call.mark_approved(Some("tester".into()), None).unwrap();
        call.mark_executed("ok".into()).unwrap();
        assert!(matches!(
            call.mark_executed("again".into()),
            Err(DomainError::InvalidStateTransition { .. })
        ));
        assert!(matches!(call.mark_denied(None, None), Err(_)));
    }

    #[test]
    fn denied_is_terminal() {
        let mut call = fresh_call(ToolCallStatus::Pending);
        call.mark_denied(Some("tester".into()), Some("no".into())).unwrap();
        assert_eq!(call.status, ToolCallStatus::Denied);
        assert!(call.mark_approved(None, None).is_err());
    }

    #[test]
    fn approve_requires_pending() {
        let mut call = fresh_call(ToolCallStatus::Blocked);
        assert!(call.mark_approved(Some("tester".into()), None).is_err());
    }

    #[test]
    fn is_valid_transition_rejects_double_approval() {
        assert!(is_valid_transition(ToolCallStatus::Pending, ToolCallStatus::Approved));
        assert!(!is_valid_transition(ToolCallStatus::Approved, ToolCallStatus::Approved));
        assert!(!is_valid_transition(ToolCallStatus::Denied, ToolCallStatus::Approved));
    }

    #[test]
    fn is_valid_transition_allows_execution_from_pending_or_approved() {
        assert!(is_valid_transition(ToolCallStatus::Pending, ToolCallStatus::Executed));
        assert!(is_valid_transition(ToolCallStatus::Approved, ToolCallStatus::Executed));
        assert!(!is_valid_transition(ToolCallStatus::Executed, ToolCallStatus::Executed));
    }
}
