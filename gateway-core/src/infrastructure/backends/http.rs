// Copyright (c) 2026 Tollgate Systems
// SPDX-License-Identifier: AGPL-3.0
//! HTTP `ToolBackend`. POSTs `{tool, args}` to a server's `/tools` endpoint
//! and wraps a shared, pooled `reqwest::Client` rather than building a new
//! one per call.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use crate::application::tool_backend::{BackendError, ToolBackend};
use crate::domain::tool_server::ToolContract;

const CALL_TIMEOUT: Duration = Duration::from_secs(5);
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct CallToolRequest<'a> {
    tool: &'a str,
    args: &'a Value,
}

pub struct HttpToolBackend {
    client: reqwest::Client,
    base_address: String,
    auth_header: Option<String>,
    auth_token: Option<String>,
}

impl HttpToolBackend {
    pub fn new(base_address: impl Into<String>, auth_header: Option<String>, auth_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_address: base_address.into(),
            auth_header,
            auth_token,
        }
    }

    /// The server already terminates in `/tools` or routes through `/mcp`;
    /// otherwise append `/tools` (§4.5).
    fn tools_url(&self) -> String {
        let base = self.base_address.trim_end_matches('/');
        if base.ends_with("/tools") || base.contains("/mcp") {
            base.to_string()
        } else {
            format!("{base}/tools")
        }
    }

    fn apply_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match (&self.auth_header, &self.auth_token) {
            (Some(header), Some(token)) => builder.header(header.as_str(), token.as_str()),
            _ => builder,
        }
    }

    async fn error_from_response(resp: reqwest::Response) -> BackendError {
        let status = resp.status();
        let detail = resp
            .text()
            .await
            .ok()
            .filter(|body| !body.is_empty())
            .unwrap_or_else(|| status.to_string());
        BackendError::Domain { detail }
    }
}

#[async_trait]
impl ToolBackend for HttpToolBackend {
    async fn call_tool(&self, name: &str, args: &Value) -> Result<Value, BackendError> {
        let request = self
            .apply_auth(self.client.post(self.tools_url()).timeout(CALL_TIMEOUT))
            .json(&CallToolRequest { tool: name, args });

        let resp = request.send().await.map_err(|e| BackendError::Transport { detail: e.to_string() })?;
        if !resp.status().is_success() {
            return Err(Self::error_from_response(resp).await);
        }
        resp.json::<Value>()
            .await
            .map_err(|e| BackendError::Transport { detail: e.to_string() })
    }

    async fn list_tools(&self, _server: Option<&str>) -> Result<Vec<ToolContract>, BackendError> {
        let url = format!("{}/list", self.tools_url());
        let request = self.apply_auth(self.client.get(&url).timeout(DISCOVERY_TIMEOUT));
        let resp = request.send().await.map_err(|e| BackendError::Transport { detail: e.to_string() })?;
        if !resp.status().is_success() {
            return Err(Self::error_from_response(resp).await);
        }
        let body: Vec<RawTool> = resp.json().await.map_err(|e| BackendError::Transport { detail: e.to_string() })?;
        Ok(body.into_iter().map(RawTool::into_contract).collect())
    }
}

#[derive(serde::Deserialize)]
struct RawTool {
    name: String,
    description: Option<String>,
    #[serde(rename = "inputSchema")]
    input_schema: Option<Value>,
    #[serde(flatten)]
    raw: Value,
}

impl RawTool {
    fn into_contract(self) -> ToolContract {
        ToolContract {
            name: self.name,
            description: self.description,
            input_schema: self.input_schema,
            raw: self.raw,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tools_url_appends_when_missing() {
        let backend = HttpToolBackend::new("http://localhost:9000", None, None);
        assert_eq!(backend.tools_url(), "http://localhost:9000/tools");
    }

    #[test]
    fn tools_url_preserved_when_already_terminal() {
        let backend = HttpToolBackend::new("http://localhost:9000/tools", None, None);
        assert_eq!(backend.tools_url(), "http://localhost:9000/tools");
    }

    #[test]
    fn tools_url_preserved_for_mcp_routes() {
        let backend = HttpToolBackend::new("http://localhost:9000/mcp/v1", None, None);
        assert_eq!(backend.tools_url(), "http://localhost:9000/mcp/v1");
    }
}
