// Copyright (c) 2026 Tollgate Systems
// SPDX-License-Identifier: AGPL-3.0
//! §4.4 Citation Resolver capability. Concrete implementations (Neo4j,
//! no-op) live in `infrastructure::citation`.

use async_trait::async_trait;

/// Policy, control, and incident identifiers attached to one decision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Citations {
    pub policies: Vec<String>,
    pub controls: Vec<String>,
    pub incidents: Vec<String>,
}

/// Read-only lookup from tool name to governing citations. Implementations
/// must degrade to `Citations::default()` rather than propagate an error —
/// an unreachable or unconfigured graph backend never blocks the pipeline.
#[async_trait]
pub trait CitationResolver: Send + Sync {
    async fn resolve(&self, tool_name: &str) -> Citations;
}
