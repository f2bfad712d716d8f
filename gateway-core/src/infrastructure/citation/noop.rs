// Copyright (c) 2026 Tollgate Systems
// SPDX-License-Identifier: AGPL-3.0
//! No-op `CitationResolver`, used when no citation graph is configured.

use async_trait::async_trait;

use crate::application::citation_resolver::{CitationResolver, Citations};

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCitationResolver;

#[async_trait]
impl CitationResolver for NoopCitationResolver {
    async fn resolve(&self, _tool_name: &str) -> Citations {
        Citations::default()
    }
}
