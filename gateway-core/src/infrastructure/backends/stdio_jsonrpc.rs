// Copyright (c) 2026 Tollgate Systems
// SPDX-License-Identifier: AGPL-3.0
//! Line-oriented JSON-RPC `ToolBackend`. Spawns the configured command,
//! speaks `initialize` → `notifications/initialized` → `tools/call` over
//! stdin/stdout, and correlates responses to waiting callers through a
//! oneshot registry, a request/response analogue of a pending-request
//! table keyed by id rather than by human approver.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex as AsyncMutex};

use crate::application::tool_backend::{BackendError, ToolBackend};
use crate::domain::tool_server::ToolContract;

const PROTOCOL_VERSION: &str = "2024-11-05";
const CLIENT_NAME: &str = "toolgate";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Caps the number of `tools/list` pages fetched per discovery call, not the
/// number of tools collected — a malicious or buggy server returning an
/// endless `nextCursor` can't make discovery loop forever.
const DEFAULT_PAGE_CAP: usize = 100;

struct PendingRegistry {
    waiters: Mutex<HashMap<i64, oneshot::Sender<Value>>>,
}

impl PendingRegistry {
    fn new() -> Self {
        Self {
            waiters: Mutex::new(HashMap::new()),
        }
    }

    fn register(&self, id: i64) -> oneshot::Receiver<Value> {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().insert(id, tx);
        rx
    }

    fn complete(&self, id: i64, value: Value) {
        if let Some(tx) = self.waiters.lock().remove(&id) {
            let _ = tx.send(value);
        }
    }

    fn abandon(&self, id: i64) {
        self.waiters.lock().remove(&id);
    }
}

struct Session {
    child: Child,
    stdin: tokio::process::ChildStdin,
    registry: Arc<PendingRegistry>,
    stderr: Arc<Mutex<String>>,
}

/// Spawns one child process per backend instance, reused across calls and
/// discovery pages. `command`/`args` name the executable to launch.
pub struct StdioJsonRpcBackend {
    command: String,
    args: Vec<String>,
    page_cap: usize,
    next_id: AtomicI64,
    session: AsyncMutex<Option<Session>>,
}

impl StdioJsonRpcBackend {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            page_cap: DEFAULT_PAGE_CAP,
            next_id: AtomicI64::new(1),
            session: AsyncMutex::new(None),
        }
    }

    pub fn with_page_cap(mut self, page_cap: usize) -> Self {
        self.page_cap = page_cap;
        self
    }

    fn next_request_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    async fn spawn_session(&self) -> Result<Session, BackendError> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| BackendError::Transport { detail: format!("failed to spawn backend process: {e}") })?;

        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");
        let stderr = child.stderr.take().expect("piped stderr");

        let registry = Arc::new(PendingRegistry::new());
        let stderr_buf = Arc::new(Mutex::new(String::new()));

        let reader_registry = registry.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let line = line.strip_prefix("data:").map(str::trim).unwrap_or(&line);
                let Ok(value) = serde_json::from_str::<Value>(line) else {
                    continue;
                };
                let Some(id) = value.get("id").and_then(Value::as_i64) else {
                    continue;
                };
                reader_registry.complete(id, value);
            }
        });

        let stderr_collector = stderr_buf.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                stderr_collector.lock().push_str(&line);
                stderr_collector.lock().push('\n');
            }
        });

        let mut session = Session {
            child,
            stdin,
            registry,
            stderr: stderr_buf,
        };

        self.handshake(&mut session).await?;
        Ok(session)
    }

    async fn handshake(&self, session: &mut Session) -> Result<(), BackendError> {
        let init_id = self.next_request_id();
        let request = json!({
            "jsonrpc": "2.0",
            "id": init_id,
            "method": "initialize",
            "params": {
                "protocolVersion": PROTOCOL_VERSION,
                "clientInfo": {"name": CLIENT_NAME},
            },
        });
        self.send(session, &request, Some(init_id)).await?;

        let notification = json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized",
        });
        write_line(&mut session.stdin, &notification).await?;
        Ok(())
    }

    async fn send(&self, session: &mut Session, request: &Value, wait_for_id: Option<i64>) -> Result<Value, BackendError> {
        let rx = wait_for_id.map(|id| session.registry.register(id));
        write_line(&mut session.stdin, request).await?;

        let Some(rx) = rx else {
            return Ok(Value::Null);
        };
        let id = wait_for_id.expect("wait_for_id set alongside rx");

        match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) | Err(_) => {
                session.registry.abandon(id);
                let _ = session.child.start_kill();
                let stderr = session.stderr.lock().clone();
                Err(BackendError::Timeout { millis: REQUEST_TIMEOUT.as_millis() as u64 }).map_err(|e| {
                    if stderr.is_empty() {
                        e
                    } else {
                        BackendError::Transport { detail: format!("backend timed out; stderr: {stderr}") }
                    }
                })
            }
        }
    }

    async fn with_session<F, Fut, T>(&self, f: F) -> Result<T, BackendError>
    where
        F: FnOnce(&mut Session, i64) -> Fut,
        Fut: std::future::Future<Output = Result<T, BackendError>>,
    {
        let mut guard = self.session.lock().await;
        if guard.is_none() {
            *guard = Some(self.spawn_session().await?);
        }
        let session = guard.as_mut().expect("just populated");
        let request_id = self.next_request_id();
        f(session, request_id).await
    }
}

async fn write_line(stdin: &mut tokio::process::ChildStdin, value: &Value) -> Result<(), BackendError> {
    let mut line = serde_json::to_string(value).map_err(|e| BackendError::Transport { detail: e.to_string() })?;
    line.push('\n');
    stdin
        .write_all(line.as_bytes())
        .await
        .map_err(|e| BackendError::Transport { detail: e.to_string() })
}

#[async_trait]
impl ToolBackend for StdioJsonRpcBackend {
    async fn call_tool(&self, name: &str, args: &Value) -> Result<Value, BackendError> {
        self.with_session(|session, request_id| async move {
            let request = json!({
                "jsonrpc": "2.0",
                "id": request_id,
                "method": "tools/call",
                "params": {"name": name, "arguments": args},
            });
            let response = self_send(self, session, &request, request_id).await?;
            extract_result(response)
        })
        .await
    }

    async fn list_tools(&self, _server: Option<&str>) -> Result<Vec<ToolContract>, BackendError> {
        let mut collected = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages_fetched = 0usize;
        loop {
            let tools_page = self
                .with_session(|session, request_id| {
                    let cursor = cursor.clone();
                    async move {
                        let mut params = serde_json::Map::new();
                        if let Some(cursor) = cursor {
                            params.insert("cursor".to_string(), Value::String(cursor));
                        }
                        let request = json!({
                            "jsonrpc": "2.0",
                            "id": request_id,
                            "method": "tools/list",
                            "params": Value::Object(params),
                        });
                        let response = self_send(self, session, &request, request_id).await?;
                        Ok(response)
                    }
                })
                .await?;

            let result = tools_page.get("result").cloned().unwrap_or(Value::Null);
            let page_tools = result
                .get("tools")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for raw in page_tools {
                let name = raw.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
                if name.is_empty() {
                    continue;
                }
                collected.push(ToolContract {
                    name,
                    description: raw.get("description").and_then(Value::as_str).map(str::to_string),
                    input_schema: raw.get("inputSchema").cloned(),
                    raw,
                });
            }

            pages_fetched += 1;
            let next_cursor = result.get("nextCursor").and_then(Value::as_str).map(str::to_string);
            if !should_fetch_another_page(next_cursor.as_deref(), cursor.as_deref(), pages_fetched, self.page_cap) {
                break;
            }
            cursor = next_cursor;
        }

        let mut seen = std::collections::HashSet::new();
        collected.retain(|tool| seen.insert(tool.name.clone()));
        Ok(collected)
    }
}

/// Whether `tools/list` pagination should fetch another page. `page_cap`
/// bounds the number of pages fetched, not the number of tools collected.
fn should_fetch_another_page(next_cursor: Option<&str>, previous_cursor: Option<&str>, pages_fetched: usize, page_cap: usize) -> bool {
    match next_cursor {
        None => false,
        Some(next) => Some(next) != previous_cursor && pages_fetched < page_cap,
    }
}

/// Free function rather than a `&self` method on `Session` so it can be
/// called from inside the `with_session` closure while `self` is still
/// borrowed for `next_request_id`/timeouts.
async fn self_send(backend: &StdioJsonRpcBackend, session: &mut Session, request: &Value, request_id: i64) -> Result<Value, BackendError> {
    backend.send(session, request, Some(request_id)).await
}

fn extract_result(response: Value) -> Result<Value, BackendError> {
    if let Some(error) = response.get("error") {
        let detail = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("backend returned an error")
            .to_string();
        return Err(BackendError::Domain { detail });
    }
    Ok(crate::application::tool_backend::unwrap_content_array(
        response.get("result").unwrap_or(&Value::Null),
    ))
}
