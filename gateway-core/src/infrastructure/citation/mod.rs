// Copyright (c) 2026 Tollgate Systems
// SPDX-License-Identifier: AGPL-3.0
//! `CitationResolver` implementations.

pub mod neo4j;
pub mod noop;

pub use neo4j::Neo4jCitationResolver;
pub use noop::NoopCitationResolver;
