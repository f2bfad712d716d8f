// Copyright (c) 2026 Tollgate Systems
// SPDX-License-Identifier: AGPL-3.0
//! Postgres-backed `AuditStore`. Raw `sqlx` queries, no query builder,
//! explicit SQL per operation.
//!
//! Expected schema (see `migrations/`):
//! `runs(id uuid, orchestrator text, agent_role text, created_at timestamptz)`
//! `tool_calls(id uuid, run_id uuid, tool_name text, redacted_args jsonb,
//!   status text, approved_by text, approved_at timestamptz,
//!   approval_note text, result text, created_at timestamptz)`
//! `decisions(id uuid, tool_call_id uuid, verdict text, reason text,
//!   risk_score double precision, policy_citations jsonb,
//!   control_citations jsonb, incident_citations jsonb,
//!   created_at timestamptz)`
//! `tool_servers(name text primary key, base_address text, tool_prefix text,
//!   auth_header text, auth_token text)`
//! `tool_catalog(server_name text, name text, description text,
//!   input_schema jsonb, raw jsonb)`

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::domain::decision::{Decision, Verdict};
use crate::domain::ids::{DecisionId, RunId, ToolCallId};
use crate::domain::repository::{AuditStore, RepositoryError, RunDetail};
use crate::domain::run::Run;
use crate::domain::tool_call::{is_valid_transition, ToolCall, ToolCallStatus};
use crate::domain::tool_server::{ToolContract, ToolServerRegistration};

pub struct PostgresAuditStore {
    pool: PgPool,
}

impl PostgresAuditStore {
    pub fn new(database: crate::infrastructure::db::Database) -> Self {
        Self { pool: database.pool().clone() }
    }
}

fn verdict_to_str(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Allow => "ALLOW",
        Verdict::Block => "BLOCK",
        Verdict::ApprovalRequired => "APPROVAL_REQUIRED",
    }
}

fn status_to_str(status: ToolCallStatus) -> &'static str {
    match status {
        ToolCallStatus::Pending => "PENDING",
        ToolCallStatus::Approved => "APPROVED",
        ToolCallStatus::Executed => "EXECUTED",
        ToolCallStatus::Failed => "FAILED",
        ToolCallStatus::Denied => "DENIED",
        ToolCallStatus::Blocked => "BLOCKED",
    }
}

fn status_from_str(raw: &str) -> ToolCallStatus {
    match raw {
        "APPROVED" => ToolCallStatus::Approved,
        "EXECUTED" => ToolCallStatus::Executed,
        "FAILED" => ToolCallStatus::Failed,
        "DENIED" => ToolCallStatus::Denied,
        "BLOCKED" => ToolCallStatus::Blocked,
        _ => ToolCallStatus::Pending,
    }
}

#[async_trait]
impl AuditStore for PostgresAuditStore {
    async fn create_run(&self, run: &Run) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO runs (id, orchestrator, agent_role, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(run.id.0)
        .bind(&run.orchestrator)
        .bind(&run.agent_role)
        .bind(run.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn create_tool_call(&self, tool_call: &ToolCall) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO tool_calls (id, run_id, tool_name, redacted_args, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(tool_call.id.0)
        .bind(tool_call.run_id.0)
        .bind(&tool_call.tool_name)
        .bind(&tool_call.redacted_args)
        .bind(status_to_str(tool_call.status))
        .bind(tool_call.created_at)
        .execute(&self.pool)
        .await?;
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
        // SELECT ... FOR UPDATE serializes concurrent status transitions for
        // the same tool call (§5's row-level-locking requirement). The
        // transition itself is re-checked under that lock so two racing
        // callers can't both win a PENDING -> APPROVED (or -> DENIED): the
        // second to reach here sees the first's already-committed status
        // and is rejected before it can act on a stale view.
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT status FROM tool_calls WHERE id = $1 FOR UPDATE")
            .bind(id.0)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Err(RepositoryError::NotFound(id.to_string()));
        };
        let current: String = row.try_get("status")?;
        if !is_valid_transition(status_from_str(&current), status) {
            return Err(RepositoryError::Conflict);
        }

        sqlx::query(
            r#"
            UPDATE tool_calls
            SET status = $2,
                approved_by = COALESCE($3, approved_by),
                approval_note = COALESCE($4, approval_note),
                approved_at = COALESCE($5, approved_at)
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .bind(status_to_str(status))
        .bind(approver)
        .bind(note)
        .bind(approved_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn append_decision(&self, decision: &Decision) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO decisions
                (id, tool_call_id, verdict, reason, risk_score, policy_citations, control_citations, incident_citations, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(decision.id.0)
        .bind(decision.tool_call_id.0)
        .bind(verdict_to_str(decision.verdict))
        .bind(&decision.reason)
        .bind(decision.risk_score)
        .bind(serde_json::to_value(&decision.policy_citations)?)
        .bind(serde_json::to_value(&decision.control_citations)?)
        .bind(serde_json::to_value(&decision.incident_citations)?)
        .bind(decision.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn finalize_tool_call(&self, tool_call: &ToolCall, decision: &Decision) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // Re-check the transition under the row lock, same as
        // `set_tool_call_status`: a tool call with no row yet (the
        // invalid-args exit) has no prior transition to validate.
        let existing = sqlx::query("SELECT status FROM tool_calls WHERE id = $1 FOR UPDATE")
            .bind(tool_call.id.0)
            .fetch_optional(&mut *tx)
            .await?;
        if let Some(row) = existing {
            let current: String = row.try_get("status")?;
            if !is_valid_transition(status_from_str(&current), tool_call.status) {
                return Err(RepositoryError::Conflict);
            }
        }

        sqlx::query(
            r#"
            INSERT INTO tool_calls (id, run_id, tool_name, redacted_args, status, approved_by, approved_at, approval_note, result, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                approved_by = EXCLUDED.approved_by,
                approved_at = EXCLUDED.approved_at,
                approval_note = EXCLUDED.approval_note,
                result = EXCLUDED.result
            "#,
        )
        .bind(tool_call.id.0)
        .bind(tool_call.run_id.0)
        .bind(&tool_call.tool_name)
        .bind(&tool_call.redacted_args)
        .bind(status_to_str(tool_call.status))
        .bind(&tool_call.approved_by)
        .bind(tool_call.approved_at)
        .bind(&tool_call.approval_note)
        .bind(&tool_call.result)
        .bind(tool_call.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO decisions
                (id, tool_call_id, verdict, reason, risk_score, policy_citations, control_citations, incident_citations, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(decision.id.0)
        .bind(decision.tool_call_id.0)
        .bind(verdict_to_str(decision.verdict))
        .bind(&decision.reason)
        .bind(decision.risk_score)
        .bind(serde_json::to_value(&decision.policy_citations)?)
        .bind(serde_json::to_value(&decision.control_citations)?)
        .bind(serde_json::to_value(&decision.incident_citations)?)
        .bind(decision.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_tool_call(&self, id: ToolCallId) -> Result<Option<ToolCall>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, run_id, tool_name, redacted_args, status, approved_by, approved_at, approval_note, result, created_at
            FROM tool_calls WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(row_to_tool_call))
    }

    async fn latest_decision(&self, tool_call_id: ToolCallId) -> Result<Option<Decision>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, tool_call_id, verdict, reason, risk_score, policy_citations, control_citations, incident_citations, created_at
            FROM decisions WHERE tool_call_id = $1 ORDER BY created_at DESC LIMIT 1
            "#,
        )
        .bind(tool_call_id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_decision).transpose()
    }

    async fn list_recent_runs(&self, limit: usize) -> Result<Vec<Run>, RepositoryError> {
        let rows = sqlx::query("SELECT id, orchestrator, agent_role, created_at FROM runs ORDER BY created_at DESC LIMIT $1")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| Run {
                id: RunId(row.get("id")),
                orchestrator: row.get("orchestrator"),
                agent_role: row.get("agent_role"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    async fn get_run_with_tool_calls_and_latest_decision(&self, id: RunId) -> Result<Option<RunDetail>, RepositoryError> {
        let run_row = sqlx::query("SELECT id, orchestrator, agent_role, created_at FROM runs WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        let Some(run_row) = run_row else {
            return Ok(None);
        };
        let run = Run {
            id: RunId(run_row.get("id")),
            orchestrator: run_row.get("orchestrator"),
            agent_role: run_row.get("agent_role"),
            created_at: run_row.get("created_at"),
        };

        let call_rows = sqlx::query(
            r#"
            SELECT id, run_id, tool_name, redacted_args, status, approved_by, approved_at, approval_note, result, created_at
            FROM tool_calls WHERE run_id = $1 ORDER BY created_at ASC
            "#,
        )
        .bind(id.0)
        .fetch_all(&self.pool)
        .await?;

        let mut tool_calls = Vec::with_capacity(call_rows.len());
        for row in call_rows {
            let call = row_to_tool_call(row);
            let latest = self.latest_decision(call.id).await?;
            tool_calls.push((call, latest));
        }
        Ok(Some(RunDetail { run, tool_calls }))
    }

    async fn list_pending_approvals(&self) -> Result<Vec<ToolCall>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, run_id, tool_name, redacted_args, status, approved_by, approved_at, approval_note, result, created_at
            FROM tool_calls WHERE status = 'PENDING' ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(row_to_tool_call).collect())
    }

    async fn list_recent_decisions(&self, limit: usize) -> Result<Vec<Decision>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, tool_call_id, verdict, reason, risk_score, policy_citations, control_citations, incident_citations, created_at
            FROM decisions ORDER BY created_at DESC LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_decision).collect()
    }

    async fn upsert_server_registration(&self, registration: &ToolServerRegistration) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO tool_servers (name, base_address, tool_prefix, auth_header, auth_token)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (name) DO UPDATE SET
                base_address = EXCLUDED.base_address,
                tool_prefix = EXCLUDED.tool_prefix,
                auth_header = EXCLUDED.auth_header,
                auth_token = EXCLUDED.auth_token
            "#,
        )
        .bind(&registration.name)
        .bind(&registration.base_address)
        .bind(&registration.tool_prefix)
        .bind(&registration.auth_header)
        .bind(&registration.auth_token)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_server_registrations(&self) -> Result<Vec<ToolServerRegistration>, RepositoryError> {
        let rows = sqlx::query("SELECT name, base_address, tool_prefix, auth_header, auth_token FROM tool_servers")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| ToolServerRegistration {
                name: row.get("name"),
                base_address: row.get("base_address"),
                tool_prefix: row.get("tool_prefix"),
                auth_header: row.get("auth_header"),
                auth_token: row.get("auth_token"),
            })
            .collect())
    }

    async fn lookup_server_by_tool_name(&self, tool_name: &str) -> Result<Option<ToolServerRegistration>, RepositoryError> {
        let servers = self.list_server_registrations().await?;
        Ok(crate::domain::tool_server::route_by_longest_prefix(tool_name, &servers).cloned())
    }

    async fn replace_tool_catalog_for_server(&self, server_name: &str, tools: Vec<ToolContract>) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM tool_catalog WHERE server_name = $1")
            .bind(server_name)
            .execute(&mut *tx)
            .await?;
        for tool in tools {
            sqlx::query(
                r#"
                INSERT INTO tool_catalog (server_name, name, description, input_schema, raw)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(server_name)
            .bind(&tool.name)
            .bind(&tool.description)
            .bind(&tool.input_schema)
            .bind(&tool.raw)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_tool_catalog_for_server(&self, server_name: &str) -> Result<Vec<ToolContract>, RepositoryError> {
        let rows = sqlx::query("SELECT name, description, input_schema, raw FROM tool_catalog WHERE server_name = $1")
            .bind(server_name)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| ToolContract {
                name: row.get("name"),
                description: row.get("description"),
                input_schema: row.get("input_schema"),
                raw: row.get("raw"),
            })
            .collect())
    }

    async fn get_decision(&self, id: DecisionId) -> Result<Option<Decision>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, tool_call_id, verdict, reason, risk_score, policy_citations, control_citations, incident_citations, created_at
            FROM decisions WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_decision).transpose()
    }
}

fn row_to_tool_call(row: sqlx::postgres::PgRow) -> ToolCall {
    ToolCall {
        id: ToolCallId(row.get("id")),
        run_id: RunId(row.get("run_id")),
        tool_name: row.get("tool_name"),
        redacted_args: row.get::<Value, _>("redacted_args"),
        status: status_from_str(&row.get::<String, _>("status")),
        approved_by: row.get("approved_by"),
        approved_at: row.get("approved_at"),
        approval_note: row.get("approval_note"),
        result: row.get("result"),
        created_at: row.get("created_at"),
    }
}

fn row_to_decision(row: sqlx::postgres::PgRow) -> Result<Decision, RepositoryError> {
    let verdict_str: String = row.get("verdict");
    Ok(Decision {
        id: DecisionId(row.get("id")),
        tool_call_id: ToolCallId(row.get("tool_call_id")),
        verdict: Verdict::parse_defensive(&verdict_str),
        reason: row.get("reason"),
        risk_score: row.get("risk_score"),
        policy_citations: serde_json::from_value(row.get("policy_citations"))?,
        control_citations: serde_json::from_value(row.get("control_citations"))?,
        incident_citations: serde_json::from_value(row.get("incident_citations"))?,
        created_at: row.get("created_at"),
    })
}
