// Copyright (c) 2026 Tollgate Systems
// SPDX-License-Identifier: AGPL-3.0
//! The HTTP presentation layer: a plain REST-over-JSON surface via `axum`
//! rather than a GraphQL schema the stack doesn't otherwise carry.

pub mod api;

pub use api::{app, AppState};
