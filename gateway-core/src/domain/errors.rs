// Copyright (c) 2026 Tollgate Systems
// SPDX-License-Identifier: AGPL-3.0
//! Domain-level error taxonomy (state transitions, lookups).

use thiserror::Error;

use crate::domain::tool_call::ToolCallStatus;

#[derive(Debug, Clone, Error)]
pub enum DomainError {
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        from: ToolCallStatus,
        to: ToolCallStatus,
    },
    #[error("tool call not found")]
    ToolCallNotFound,
    #[error("tool call is not pending")]
    ToolCallNotPending,
    #[error("server registration {name:?} overlaps existing prefix {existing_prefix:?}")]
    OverlappingPrefix {
        name: String,
        existing_prefix: String,
    },
    #[error("base address {base_address:?} is not on the configured scheme/host allow-list")]
    DisallowedBaseAddress { base_address: String },
}
