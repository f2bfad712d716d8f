// Copyright (c) 2026 Tollgate Systems
// SPDX-License-Identifier: AGPL-3.0
//! The `AuditStore` repository trait and its backend-selection enum.
//!
//! One repository covers every aggregate in this bounded context because
//! the atomicity guarantee ("all writes for one proposal are atomic as a
//! unit") cuts across runs, tool calls, and decisions — splitting them into
//! per-aggregate repositories would make that guarantee impossible to
//! express without a distributed transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::decision::Decision;
use crate::domain::ids::{DecisionId, RunId, ToolCallId};
use crate::domain::run::Run;
use crate::domain::tool_call::{ToolCall, ToolCallStatus};
use crate::domain::tool_server::{ToolContract, ToolServerRegistration};

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("entity not found: {0}")]
    NotFound(String),
    #[error("database error: {0}")]
    Database(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("concurrent modification, retry")]
    Conflict,
}

/// A run paired with its tool calls and each call's latest decision, for
/// `get-run-with-tool-calls-and-latest-decision`.
#[derive(Debug, Clone)]
pub struct RunDetail {
    pub run: Run,
    pub tool_calls: Vec<(ToolCall, Option<Decision>)>,
}

/// Append-only persistence for runs, tool calls, decisions, server
/// registrations, and discovered tool catalogs (§4.1).
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn create_run(&self, run: &Run) -> Result<(), RepositoryError>;

    async fn create_tool_call(&self, tool_call: &ToolCall) -> Result<(), RepositoryError>;

    async fn set_tool_call_status(
        &self,
        id: ToolCallId,
        status: ToolCallStatus,
        approver: Option<String>,
        note: Option<String>,
        approved_at: Option<DateTime<Utc>>,
    ) -> Result<(), RepositoryError>;

    async fn append_decision(&self, decision: &Decision) -> Result<(), RepositoryError>;

    /// Atomically persists a tool call's final state (status, result,
    /// approval metadata) together with the decision that explains it, as
    /// one write. An upsert rather than a plain update: the invalid-args
    /// exit path has no prior row to update, while every other exit path
    /// does. One transaction either way, so a crash between "tool call
    /// recorded" and "decision recorded" can't happen.
    async fn finalize_tool_call(&self, tool_call: &ToolCall, decision: &Decision) -> Result<(), RepositoryError>;

    async fn get_tool_call(&self, id: ToolCallId) -> Result<Option<ToolCall>, RepositoryError>;

    async fn latest_decision(&self, tool_call_id: ToolCallId) -> Result<Option<Decision>, RepositoryError>;

    async fn list_recent_runs(&self, limit: usize) -> Result<Vec<Run>, RepositoryError>;

    async fn get_run_with_tool_calls_and_latest_decision(&self, id: RunId) -> Result<Option<RunDetail>, RepositoryError>;

    /// Tool calls whose latest decision is `APPROVAL_REQUIRED` and whose
    /// status is still `PENDING`.
    async fn list_pending_approvals(&self) -> Result<Vec<ToolCall>, RepositoryError>;

    async fn list_recent_decisions(&self, limit: usize) -> Result<Vec<Decision>, RepositoryError>;

    async fn upsert_server_registration(&self, registration: &ToolServerRegistration) -> Result<(), RepositoryError>;

    async fn list_server_registrations(&self) -> Result<Vec<ToolServerRegistration>, RepositoryError>;

    /// Resolves the server whose prefix is the longest match for `tool_name`.
    async fn lookup_server_by_tool_name(&self, tool_name: &str) -> Result<Option<ToolServerRegistration>, RepositoryError>;

    /// Atomically replaces (not merges) the tool catalog for `server_name`.
    async fn replace_tool_catalog_for_server(&self, server_name: &str, tools: Vec<ToolContract>) -> Result<(), RepositoryError>;

    async fn list_tool_catalog_for_server(&self, server_name: &str) -> Result<Vec<ToolContract>, RepositoryError>;

    #[allow(unused_variables)]
    async fn get_decision(&self, id: DecisionId) -> Result<Option<Decision>, RepositoryError> {
        Err(RepositoryError::NotFound("get_decision not implemented by this backend".into()))
    }
}

/// Storage backend selector, used to pick the concrete `AuditStore`
/// constructed at startup.
#[derive(Debug, Clone)]
pub enum StorageBackend {
    InMemory,
    Postgres(PostgresConfig),
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub connection_string: String,
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("row not found".to_string()),
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
