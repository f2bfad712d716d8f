// Copyright (c) 2026 Tollgate Systems
// SPDX-License-Identifier: AGPL-3.0
//! # toolgate-core
//!
//! The policy, decision, and audit engine for the tool-execution gateway. This
//! crate owns the domain model, application use-cases, infrastructure adapters
//! and the HTTP presentation surface; `toolgate` (the `gateway-cli` crate) is a
//! thin binary wrapping it.
//!
//! ## Layer Structure
//!
//! ```text
//! presentation/   ← HTTP API (axum)
//!     ↓
//! application/    ← Decision pipeline, approval controller, policy engine, use-cases
//!     ↓
//! domain/         ← Aggregates (Run, ToolCall, Decision), value objects, repository traits
//!     ↓
//! infrastructure/ ← Postgres/in-memory audit stores, tool backends, citation resolver, config
//! ```
//!
//! Request flow: presentation → application (policy → redaction → audit →
//! citation → backend → audit) → presentation. Approvals re-enter the
//! pipeline's execute phase through the approval controller rather than the
//! propose path.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
