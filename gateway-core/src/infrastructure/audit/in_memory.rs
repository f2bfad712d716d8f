// Copyright (c) 2026 Tollgate Systems
// SPDX-License-Identifier: AGPL-3.0
//! In-memory `AuditStore`, default for tests and single-node/dev use.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;

use crate::domain::decision::Decision;
use crate::domain::ids::{DecisionId, RunId, ToolCallId};
use crate::domain::repository::{AuditStore, RepositoryError, RunDetail};
use crate::domain::run::Run;
use crate::domain::tool_call::{is_valid_transition, ToolCall, ToolCallStatus};
use crate::domain::tool_server::{ToolContract, ToolServerRegistration};

/// `parking_lot`/`dashmap`-backed store. Each tool call's status
/// transitions are serialized by locking its entry for the duration of the
/// check-and-set, matching the row-level-locking requirement of §5.
#[derive(Default)]
pub struct InMemoryAuditStore {
    runs: DashMap<RunId, Run>,
    tool_calls: DashMap<ToolCallId, RwLock<ToolCall>>,
    decisions: Arc<RwLock<Vec<Decision>>>,
    servers: DashMap<String, ToolServerRegistration>,
    catalogs: DashMap<String, Vec<ToolContract>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn create_run(&self, run: &Run) -> Result<(), RepositoryError> {
        self.runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn create_tool_call(&self, tool_call: &ToolCall) -> Result<(), RepositoryError> {
        self.tool_calls.insert(tool_call.id, RwLock::new(tool_call.clone()));
        Ok(())
    }

    async fn set_tool_call_status(
        &self,
        id: ToolCallId,
        status: ToolCallStatus,
        approver: Option<String>,
        note: Option<String>,
        approved_at: Option<DateTime<Utc>>,
    ) -> Result<(), RepositoryError> {
        let entry = self
            .tool_calls
            .get(&id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        // Holding the per-row write guard across the check-and-set is what
        // makes this atomic against a concurrent racer: whichever caller
        // acquires the lock first sees the pre-transition status and wins,
        // the other sees the already-updated status and is rejected.
        let mut call = entry.write();
        if !is_valid_transition(call.status, status) {
            return Err(RepositoryError::Conflict);
        }
        call.status = status;
        if approver.is_some() {
            call.approved_by = approver;
        }
        if note.is_some() {
            call.approval_note = note;
        }
        if approved_at.is_some() {
            call.approved_at = approved_at;
        }
        Ok(())
    }

    async fn append_decision(&self, decision: &Decision) -> Result<(), RepositoryError> {
        self.decisions.write().push(decision.clone());
        Ok(())
    }

    async fn finalize_tool_call(&self, tool_call: &ToolCall, decision: &Decision) -> Result<(), RepositoryError> {
        if let Some(entry) = self.tool_calls.get(&tool_call.id) {
            let mut existing = entry.write();
            if !is_valid_transition(existing.status, tool_call.status) {
                return Err(RepositoryError::Conflict);
            }
            *existing = tool_call.clone();
        } else {
            self.tool_calls.insert(tool_call.id, RwLock::new(tool_call.clone()));
        }
        self.decisions.write().push(decision.clone());
        Ok(())
    }

    async fn get_tool_call(&self, id: ToolCallId) -> Result<Option<ToolCall>, RepositoryError> {
        Ok(self.tool_calls.get(&id).map(|entry| entry.read().clone()))
    }

    async fn latest_decision(&self, tool_call_id: ToolCallId) -> Result<Option<Decision>, RepositoryError> {
        let decisions = self.decisions.read();
        Ok(decisions
            .iter()
            .filter(|d| d.tool_call_id == tool_call_id)
            .max_by_key(|d| d.created_at)
            .cloned())
    }

    async fn list_recent_runs(&self, limit: usize) -> Result<Vec<Run>, RepositoryError> {
        let mut runs: Vec<Run> = self.runs.iter().map(|e| e.value().clone()).collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        runs.truncate(limit);
        Ok(runs)
    }

    async fn get_run_with_tool_calls_and_latest_decision(&self, id: RunId) -> Result<Option<RunDetail>, RepositoryError> {
        let Some(run) = self.runs.get(&id).map(|e| e.value().clone()) else {
            return Ok(None);
        };
        let mut tool_calls = Vec::new();
        for entry in self.tool_calls.iter() {
            let call = entry.value().read().clone();
            if call.run_id != id {
                continue;
            }
            let latest = self.latest_decision(call.id).await?;
            tool_calls.push((call, latest));
        }
        tool_calls.sort_by(|a, b| a.0.created_at.cmp(&b.0.created_at));
        Ok(Some(RunDetail { run, tool_calls }))
    }

    async fn list_pending_approvals(&self) -> Result<Vec<ToolCall>, RepositoryError> {
        Ok(self
            .tool_calls
            .iter()
            .map(|e| e.value().read().clone())
            .filter(|call| call.status == ToolCallStatus::Pending)
            .collect())
    }

    async fn list_recent_decisions(&self, limit: usize) -> Result<Vec<Decision>, RepositoryError> {
        let mut decisions = self.decisions.read().clone();
        decisions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        decisions.truncate(limit);
        Ok(decisions)
    }

    async fn upsert_server_registration(&self, registration: &ToolServerRegistration) -> Result<(), RepositoryError> {
        self.servers.insert(registration.name.clone(), registration.clone());
        Ok(())
    }

    async fn list_server_registrations(&self) -> Result<Vec<ToolServerRegistration>, RepositoryError> {
        Ok(self.servers.iter().map(|e| e.value().clone()).collect())
    }

    async fn lookup_server_by_tool_name(&self, tool_name: &str) -> Result<Option<ToolServerRegistration>, RepositoryError> {
        let servers: Vec<ToolServerRegistration> = self.servers.iter().map(|e| e.value().clone()).collect();
        Ok(crate::domain::tool_server::route_by_longest_prefix(tool_name, &servers).cloned())
    }

    async fn replace_tool_catalog_for_server(&self, server_name: &str, tools: Vec<ToolContract>) -> Result<(), RepositoryError> {
        self.catalogs.insert(server_name.to_string(), tools);
        Ok(())
    }

    async fn list_tool_catalog_for_server(&self, server_name: &str) -> Result<Vec<ToolContract>, RepositoryError> {
        Ok(self.catalogs.get(server_name).map(|e| e.value().clone()).unwrap_or_default())
    }

    async fn get_decision(&self, id: DecisionId) -> Result<Option<Decision>, RepositoryError> {
        Ok(self.decisions.read().iter().find(|d| d.id == id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn status_transitions_are_serialized_per_call() {
        let store = InMemoryAuditStore::new();
        let run = Run::new("orch", "role");
        store.create_run(&run).await.unwrap();
        let call = ToolCall::new(run.id, "fs.read_file", json!({}), ToolCallStatus::Pending);
        store.create_tool_call(&call).await.unwrap();

        store
            .set_tool_call_status(call.id, ToolCallStatus::Executed, None, None, None)
            .await
            .unwrap();
        let reloaded = store.get_tool_call(call.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, ToolCallStatus::Executed);
    }

    #[tokio::test]
    async fn second_approval_of_the_same_call_is_rejected() {
        let store = InMemoryAuditStore::new();
        let run = Run::new("orch", "role");
        store.create_run(&run).await.unwrap();
        let call = ToolCall::new(run.id, "fs.write_file", json!({}), ToolCallStatus::Pending);
        store.create_tool_call(&call).await.unwrap();

        store
            .set_tool_call_status(call.id, ToolCallStatus::Approved, Some("alice".into()), None, None)
            .await
            .unwrap();

        let second = store
            .set_tool_call_status(call.id, ToolCallStatus::Approved, Some("bob".into()), None, None)
            .await;
        assert!(matches!(second, Err(RepositoryError::Conflict)));

        let reloaded = store.get_tool_call(call.id).await.unwrap().unwrap();
        assert_eq!(reloaded.approved_by.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn latest_decision_picks_most_recent() {
        let store = InMemoryAuditStore::new();
        let call_id = ToolCallId::new();
        let first = Decision::new(call_id, crate::domain::decision::Verdict::ApprovalRequired, "pending", None, vec![], vec![], vec![]);
        store.append_decision(&first).await.unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = Decision::new(call_id, crate::domain::decision::Verdict::Allow, "approved", None, vec![], vec![], vec![]);
        store.append_decision(&second).await.unwrap();

        let latest = store.latest_decision(call_id).await.unwrap().unwrap();
        assert_eq!(latest.reason, "approved");
    }
}
