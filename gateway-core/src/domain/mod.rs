// Copyright (c) 2026 Tollgate Systems
// SPDX-License-Identifier: AGPL-3.0
//! Aggregates, value objects, and repository traits for the gateway's
//! decision-and-audit model (§3 of the data model).

pub mod decision;
pub mod errors;
pub mod ids;
pub mod policy;
pub mod repository;
pub mod run;
pub mod tool_call;
pub mod tool_server;

pub use decision::{Decision, FinalStatus, ToolDecision, Verdict};
pub use errors::DomainError;
pub use ids::{DecisionId, RunId, ToolCallId};
pub use policy::{PolicyOutcome, PrefixRule};
pub use repository::{AuditStore, PostgresConfig, RepositoryError, RunDetail, StorageBackend};
pub use run::{split_meta, Run};
pub use tool_call::{ToolCall, ToolCallStatus};
pub use tool_server::{prefixes_compatible, route_by_longest_prefix, ToolContract, ToolServerRegistration};
