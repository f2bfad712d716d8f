// Copyright (c) 2026 Tollgate Systems
// SPDX-License-Identifier: AGPL-3.0
//! Command implementations for the `toolgate` CLI.

pub mod serve;

pub use serve::ServeArgs;
