// Copyright (c) 2026 Tollgate Systems
// SPDX-License-Identifier: AGPL-3.0
//! Use-case services orchestrating the domain model: the decision pipeline
//! (§4.6), approval controller (§4.7), policy engine (§4.3), redactor
//! (§4.2), and the capability traits concrete infrastructure implements.

pub mod approval_controller;
pub mod citation_resolver;
pub mod decision_pipeline;
pub mod policy_engine;
pub mod redactor;
pub mod tool_backend;
pub mod tool_catalog_service;

pub use approval_controller::{ApprovalController, ApprovalError};
pub use citation_resolver::{Citations, CitationResolver};
pub use decision_pipeline::{DecisionPipeline, PipelineError};
pub use policy_engine::PolicyEngine;
pub use redactor::Redactor;
pub use tool_backend::{normalize_result, unwrap_content_array, BackendError, ToolBackend};
pub use tool_catalog_service::{CatalogError, ToolCatalogService};
