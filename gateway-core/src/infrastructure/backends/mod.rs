// Copyright (c) 2026 Tollgate Systems
// SPDX-License-Identifier: AGPL-3.0
//! Concrete `ToolBackend` transports.

pub mod http;
pub mod stdio_jsonrpc;

pub use http::HttpToolBackend;
pub use stdio_jsonrpc::StdioJsonRpcBackend;
