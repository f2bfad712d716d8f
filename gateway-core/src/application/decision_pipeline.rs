// Copyright (c) 2026 Tollgate Systems
// SPDX-License-Identifier: AGPL-3.0
//! §4.6 Decision Pipeline — the core state machine. `propose` is the single
//! entry point every proposal passes through; every exit path persists an
//! audit trail before returning.

use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

use crate::application::citation_resolver::CitationResolver;
use crate::application::policy_engine::PolicyEngine;
use crate::application::redactor::Redactor;
use crate::application::tool_backend::{normalize_result, BackendError, ToolBackend};
use crate::domain::decision::{Decision, FinalStatus, ToolDecision, Verdict};
use crate::domain::ids::ToolCallId;
use crate::domain::repository::{AuditStore, RepositoryError};
use crate::domain::run::{split_meta, Run};
use crate::domain::tool_call::{ToolCall, ToolCallStatus};
use crate::infrastructure::event_bus::{EventBus, GatewayEvent};

/// Errors that must become a fatal response rather than a `ToolDecision`
/// (§7 AuditFailure: "must not fabricate a decision").
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("audit store unavailable: {0}")]
    AuditFailure(#[from] RepositoryError),
}

/// Coordinates the Redactor, Policy Engine, Citation Resolver, Audit Store,
/// and Tool Backend for a single proposed call.
pub struct DecisionPipeline {
    audit: Arc<dyn AuditStore>,
    redactor: Redactor,
    policy: PolicyEngine,
    citations: Arc<dyn CitationResolver>,
    backend: Arc<dyn ToolBackend>,
    events: Arc<EventBus>,
}

impl DecisionPipeline {
    pub fn new(
        audit: Arc<dyn AuditStore>,
        redactor: Redactor,
        policy: PolicyEngine,
        citations: Arc<dyn CitationResolver>,
        backend: Arc<dyn ToolBackend>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            audit,
            redactor,
            policy,
            citations,
            backend,
            events,
        }
    }

    /// Implements §4.6 steps 1–6. Always returns `Ok` unless the audit store
    /// itself is unavailable, in which case no decision may be fabricated.
    pub async fn propose(&self, tool: &str, args: Value, meta_sigil_args: Value) -> Result<ToolDecision, PipelineError> {
        let started = Instant::now();

        // Step 1: Parse. `args` must be a structured object.
        let Value::Object(ref raw_args_map) = args else {
            return self.record_invalid_args(meta_sigil_args).await;
        };

        // Step 2: Split metadata, create Run.
        let (tool_args_map, meta) = split_meta(raw_args_map);
        let tool_args = Value::Object(tool_args_map);
        let run = Run::from_meta(&meta);
        self.audit.create_run(&run).await?;

        // Step 3: Redact and record. The tool-call id is now fixed and must
        // appear in the returned ToolDecision regardless of outcome.
        let redacted = self.redactor.redact(&tool_args);
        let mut tool_call = ToolCall::new(run.id, tool, redacted, ToolCallStatus::Pending);
        self.audit.create_tool_call(&tool_call).await?;

        // Step 4: Evaluate policy on raw (unredacted) arguments, fetch citations.
        let outcome = self.policy.evaluate(tool, &tool_args);
        let citations = self.citations.resolve(tool).await;

        let result = match outcome.verdict {
            Verdict::ApprovalRequired => {
                tool_call.mark_pending()?;
                let decision = Decision::new(
                    tool_call.id,
                    Verdict::ApprovalRequired,
                    outcome.reason.clone(),
                    outcome.risk_score,
                    citations.policies.clone(),
                    citations.controls.clone(),
                    citations.incidents.clone(),
                );
                self.audit.finalize_tool_call(&tool_call, &decision).await?;
                Ok(ToolDecision {
                    tool_call_id: tool_call.id,
                    decision: Verdict::ApprovalRequired,
                    reason: outcome.reason,
                    result: None,
                    final_status: Some(FinalStatus::Pending),
                    policy_citations: citations.policies,
                    incident_citations: citations.incidents,
                    control_citations: citations.controls,
                })
            }
            Verdict::Block => {
                tool_call.mark_blocked()?;
                let decision = Decision::new(
                    tool_call.id,
                    Verdict::Block,
                    outcome.reason.clone(),
                    outcome.risk_score,
                    citations.policies.clone(),
                    citations.controls.clone(),
                    citations.incidents.clone(),
                );
                self.audit.finalize_tool_call(&tool_call, &decision).await?;
                Ok(ToolDecision {
                    tool_call_id: tool_call.id,
                    decision: Verdict::Block,
                    reason: outcome.reason,
                    result: None,
                    final_status: None,
                    policy_citations: citations.policies,
                    incident_citations: citations.incidents,
                    control_citations: citations.controls,
                })
            }
            Verdict::Allow => {
                self.execute(&mut tool_call, &tool_args, citations.policies.clone(), citations.controls.clone(), citations.incidents.clone())
                    .await
            }
        };

        metrics::counter!("tool_calls_total", "tool" => tool.to_string(), "verdict" => verdict_label(&result)).increment(1);
        metrics::histogram!("decision_pipeline_duration_ms").record(started.elapsed().as_millis() as f64);

        if let Ok(decision) = &result {
            self.events.publish(GatewayEvent::DecisionCommitted(decision.clone()));
        }

        result
    }

    /// §4.6 step 6: invoke the backend, record the outcome either way.
    async fn execute(
        &self,
        tool_call: &mut ToolCall,
        tool_args: &Value,
        policy_citations: Vec<String>,
        control_citations: Vec<String>,
        incident_citations: Vec<String>,
    ) -> Result<ToolDecision, PipelineError> {
        match self.backend.call_tool(&tool_call.tool_name, tool_args).await {
            Ok(raw_result) => {
                let normalized = normalize_result(&raw_result);
                tool_call.mark_executed(normalized.clone())?;
                let decision = Decision::new(
                    tool_call.id,
                    Verdict::Allow,
                    "Executed".to_string(),
                    None,
                    policy_citations.clone(),
                    control_citations.clone(),
                    incident_citations.clone(),
                );
                self.audit.finalize_tool_call(tool_call, &decision).await?;
                Ok(ToolDecision {
                    tool_call_id: tool_call.id,
                    decision: Verdict::Allow,
                    reason: "Executed".to_string(),
                    result: Some(normalized),
                    final_status: Some(FinalStatus::Executed),
                    policy_citations,
                    incident_citations,
                    control_citations,
                })
            }
            Err(err) => {
                tool_call.mark_failed()?;
                let reason = backend_error_reason(&err);
                let decision = Decision::new(
                    tool_call.id,
                    Verdict::Block,
                    reason.clone(),
                    None,
                    policy_citations.clone(),
                    control_citations.clone(),
                    incident_citations.clone(),
                );
                self.audit.finalize_tool_call(tool_call, &decision).await?;
                Ok(ToolDecision {
                    tool_call_id: tool_call.id,
                    decision: Verdict::Block,
                    reason,
                    result: None,
                    final_status: None,
                    policy_citations,
                    incident_citations,
                    control_citations,
                })
            }
        }
    }

    /// §4.6 step 1 exit: `args` was not a structured object.
    async fn record_invalid_args(&self, meta: Value) -> Result<ToolDecision, PipelineError> {
        let run = Run::new("unknown", "unknown");
        self.audit.create_run(&run).await?;
        let redacted_payload = serde_json::json!({"error": "invalid_args"});
        let _ = meta;
        let tool_call = ToolCall::new(run.id, "unknown", redacted_payload, ToolCallStatus::Blocked);
        let decision = Decision::new(
            tool_call.id,
            Verdict::Block,
            "Invalid JSON in args".to_string(),
            None,
            vec![],
            vec![],
            vec![],
        );
        self.audit.finalize_tool_call(&tool_call, &decision).await?;
        Ok(ToolDecision {
            tool_call_id: tool_call.id,
            decision: Verdict::Block,
            reason: "Invalid JSON in args".to_string(),
            result: None,
            final_status: None,
            policy_citations: vec![],
            incident_citations: vec![],
            control_citations: vec![],
        })
    }

}

fn verdict_label(result: &Result<ToolDecision, PipelineError>) -> &'static str {
    match result {
        Ok(decision) => match decision.decision {
            Verdict::Allow => "ALLOW",
            Verdict::Block => "BLOCK",
            Verdict::ApprovalRequired => "APPROVAL_REQUIRED",
        },
        Err(_) => "ERROR",
    }
}

fn backend_error_reason(err: &BackendError) -> String {
    match err {
        BackendError::Transport { detail } => detail.clone(),
        BackendError::Domain { detail } => detail.clone(),
        BackendError::Timeout { millis } => format!("backend call timed out after {millis}ms"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::audit::in_memory::InMemoryAuditStore;
    use crate::infrastructure::citation::noop::NoopCitationResolver;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::path::PathBuf;

    struct StubBackend {
        files: HashMap<String, String>,
    }

    #[async_trait]
    impl ToolBackend for StubBackend {
        async fn call_tool(&self, name: &str, args: &Value) -> Result<Value, BackendError> {
            match name {
                "fs.read_file" => {
                    let path = args.get("path").and_then(Value::as_str).unwrap_or_default();
                    self.files
                        .get(path)
                        .cloned()
                        .map(Value::String)
                        .ok_or_else(|| BackendError::Domain { detail: "not found".into() })
                }
                "fs.write_file" => Ok(json!("written")),
                _ => Err(BackendError::Domain { detail: "unsupported".into() }),
            }
        }

        async fn list_tools(&self, _server: Option<&str>) -> Result<Vec<crate::domain::tool_server::ToolContract>, BackendError> {
            Ok(vec![])
        }
    }

    fn pipeline(files: HashMap<String, String>) -> DecisionPipeline {
        let audit = Arc::new(InMemoryAuditStore::new());
        let redactor = Redactor::default();
        let policy = PolicyEngine::new(PathBuf::from("/sandbox"), HashMap::new(), vec![]);
        let citations = Arc::new(NoopCitationResolver);
        let backend = Arc::new(StubBackend { files });
        let events = Arc::new(EventBus::new());
        DecisionPipeline::new(audit, redactor, policy, citations, backend, events)
    }

    #[tokio::test]
    async fn e1_sandbox_boundary_block() {
        let decision = pipeline(HashMap::new())
            .propose("fs.read_file", json!({"path": "/etc/passwd"}), json!({}))
            .await
            .unwrap();
        assert_eq!(decision.decision, Verdict::Block);
        assert_eq!(decision.reason, "path must be under /sandbox");
        assert!(decision.result.is_none());
    }

    #[tokio::test]
    async fn e2_allowed_read_returns_result() {
        let mut files = HashMap::new();
        files.insert("/sandbox/example.txt".to_string(), "Example content.".to_string());
        let decision = pipeline(files)
            .propose("fs.read_file", json!({"path": "/sandbox/example.txt"}), json!({}))
            .await
            .unwrap();
        assert_eq!(decision.decision, Verdict::Allow);
        assert_eq!(decision.result.as_deref(), Some("Example content."));
        assert!(decision.final_status.is_none());
    }

    #[tokio::test]
    async fn e3_write_requires_approval() {
        let decision = pipeline(HashMap::new())
            .propose(
                "fs.write_file",
                json!({"path": "/sandbox/test.txt", "content": "hi"}),
                json!({}),
            )
            .await
            .unwrap();
        assert_eq!(decision.decision, Verdict::ApprovalRequired);
        assert_eq!(decision.final_status, Some(FinalStatus::Pending));
    }

    #[tokio::test]
    async fn e4_unknown_tool_blocks_without_backend_call() {
        let decision = pipeline(HashMap::new())
            .propose("made.up.tool", json!({}), json!({}))
            .await
            .unwrap();
        assert_eq!(decision.decision, Verdict::Block);
        assert_eq!(decision.reason, "Unknown tool");
    }

    #[tokio::test]
    async fn invalid_args_produces_block_decision() {
        let decision = pipeline(HashMap::new())
            .propose("fs.read_file", json!("not-an-object"), json!({}))
            .await
            .unwrap();
        assert_eq!(decision.decision, Verdict::Block);
        assert_eq!(decision.reason, "Invalid JSON in args");
    }

    #[tokio::test]
    async fn e6_backend_failure_blocks_and_does_not_execute() {
        let decision = pipeline(HashMap::new())
            .propose("fs.read_file", json!({"path": "/sandbox/missing.txt"}), json!({}))
            .await
            .unwrap();
        assert_eq!(decision.decision, Verdict::Block);
        assert!(decision.result.is_none());
    }

    #[tokio::test]
    async fn propose_publishes_a_decision_committed_event() {
        let audit = Arc::new(InMemoryAuditStore::new());
        let redactor = Redactor::default();
        let policy = PolicyEngine::new(PathBuf::from("/sandbox"), HashMap::new(), vec![]);
        let citations = Arc::new(NoopCitationResolver);
        let backend = Arc::new(StubBackend { files: HashMap::new() });
        let events = Arc::new(EventBus::new());
        let mut subscriber = events.subscribe();
        let pipeline = DecisionPipeline::new(audit, redactor, policy, citations, backend, events);

        pipeline.propose("made.up.tool", json!({}), json!({})).await.unwrap();

        let event = subscriber.recv().await.unwrap();
        match event {
            GatewayEvent::DecisionCommitted(decision) => assert_eq!(decision.decision, Verdict::Block),
            other => panic!("expected DecisionCommitted, got {other:?}"),
        }
    }
}
