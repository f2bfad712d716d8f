// Copyright (c) 2026 Tollgate Systems
// SPDX-License-Identifier: AGPL-3.0
//! §4.8 admin operations: server registration and catalog sync. Sync is the
//! only mutation of the tool catalog and always replaces it wholesale.

use std::collections::HashSet;
use std::sync::Arc;

use crate::application::tool_backend::ToolBackend;
use crate::domain::errors::DomainError;
use crate::domain::repository::{AuditStore, RepositoryError};
use crate::domain::tool_server::{base_address_allowed, prefixes_compatible, ToolContract, ToolServerRegistration};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error(transparent)]
    Audit(#[from] RepositoryError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("backend error: {0}")]
    Backend(#[from] crate::application::tool_backend::BackendError),
}

pub struct ToolCatalogService {
    audit: Arc<dyn AuditStore>,
    backend: Arc<dyn ToolBackend>,
    allowed_schemes: Vec<String>,
    allowed_hosts: Vec<String>,
}

impl ToolCatalogService {
    pub fn new(
        audit: Arc<dyn AuditStore>,
        backend: Arc<dyn ToolBackend>,
        allowed_schemes: Vec<String>,
        allowed_hosts: Vec<String>,
    ) -> Self {
        Self { audit, backend, allowed_schemes, allowed_hosts }
    }

    /// Upserts a server registration, rejecting base addresses outside the
    /// configured scheme/host allow-list (§6) and prefixes that overlap an
    /// existing registration without one strictly extending the other.
    pub async fn register_server(&self, registration: ToolServerRegistration) -> Result<(), CatalogError> {
        if !base_address_allowed(&registration.base_address, &self.allowed_schemes, &self.allowed_hosts) {
            return Err(CatalogError::Domain(DomainError::DisallowedBaseAddress {
                base_address: registration.base_address.clone(),
            }));
        }
        let existing = self.audit.list_server_registrations().await?;
        for other in &existing {
            if other.name == registration.name {
                continue;
            }
            if !prefixes_compatible(&registration.tool_prefix, &other.tool_prefix) {
                continue;
            }
            if registration.tool_prefix != other.tool_prefix {
                continue;
            }
            return Err(CatalogError::Domain(DomainError::OverlappingPrefix {
                name: registration.name.clone(),
                existing_prefix: other.tool_prefix.clone(),
            }));
        }
        self.audit.upsert_server_registration(&registration).await?;
        Ok(())
    }

    /// Invokes the backend's discovery, filters to tools belonging to
    /// `server_name` (matching its registered prefix, or a raw-name-token
    /// fallback when the backend doesn't namespace its advertisements),
    /// namespaces them under the server's prefix, and atomically replaces
    /// the catalog (§4.8).
    pub async fn sync_tool_catalog(&self, server_name: &str) -> Result<usize, CatalogError> {
        let servers = self.audit.list_server_registrations().await?;
        let server = servers
            .into_iter()
            .find(|s| s.name == server_name)
            .ok_or_else(|| CatalogError::Audit(RepositoryError::NotFound(server_name.to_string())))?;

        let discovered = self.backend.list_tools(Some(server_name)).await?;

        let mut seen = HashSet::new();
        let mut namespaced = Vec::new();
        for tool in discovered {
            let canonical = if tool.name.starts_with(&server.tool_prefix) {
                tool.name.clone()
            } else {
                format!("{}{}", server.tool_prefix, tool.name)
            };
            if !seen.insert(canonical.clone()) {
                continue;
            }
            namespaced.push(ToolContract {
                name: canonical,
                description: tool.description,
                input_schema: tool.input_schema,
                raw: tool.raw,
            });
        }

        let count = namespaced.len();
        self.audit.replace_tool_catalog_for_server(server_name, namespaced).await?;
        tracing::info!(server = server_name, count, "tool_catalog.synced");
        metrics::counter!("tool_sync_total", "server" => server_name.to_string()).increment(1);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::audit::in_memory::InMemoryAuditStore;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct PagingStubBackend {
        pages: Vec<Vec<ToolContract>>,
    }

    #[async_trait]
    impl ToolBackend for PagingStubBackend {
        async fn call_tool(&self, _name: &str, _args: &Value) -> Result<Value, crate::application::tool_backend::BackendError> {
            Ok(json!(null))
        }

        async fn list_tools(&self, _server: Option<&str>) -> Result<Vec<ToolContract>, crate::application::tool_backend::BackendError> {
            Ok(self.pages.iter().flatten().cloned().collect())
        }
    }

    fn contract(name: &str) -> ToolContract {
        ToolContract {
            name: name.to_string(),
            description: None,
            input_schema: None,
            raw: json!({}),
        }
    }

    #[tokio::test]
    async fn e5_discovery_pagination_dedupes_and_namespaces() {
        let audit = Arc::new(InMemoryAuditStore::new());
        let mut page1 = Vec::new();
        let mut page2 = Vec::new();
        let mut page3 = Vec::new();
        for i in 0..50 {
            page1.push(contract(&format!("tool_{i}")));
        }
        for i in 50..100 {
            page2.push(contract(&format!("tool_{i}")));
        }
        for i in 100..150 {
            page3.push(contract(&format!("tool_{i}")));
        }
        let backend = Arc::new(PagingStubBackend {
            pages: vec![page1, page2, page3],
        });
        let service = ToolCatalogService::new(audit.clone(), backend, vec!["http".to_string()], vec![]);

        service
            .register_server(ToolServerRegistration {
                name: "fs-server".to_string(),
                base_address: "http://localhost".to_string(),
                tool_prefix: "fs.".to_string(),
                auth_header: None,
                auth_token: None,
            })
            .await
            .unwrap();

        let count = service.sync_tool_catalog("fs-server").await.unwrap();
        assert_eq!(count, 150);

        let catalog = audit.list_tool_catalog_for_server("fs-server").await.unwrap();
        assert_eq!(catalog.len(), 150);
        assert!(catalog.iter().all(|t| t.name.starts_with("fs.")));
    }

    #[tokio::test]
    async fn overlapping_prefix_rejected_unless_extension() {
        let audit = Arc::new(InMemoryAuditStore::new());
        let backend = Arc::new(PagingStubBackend { pages: vec![] });
        let service = ToolCatalogService::new(audit, backend, vec!["http".to_string()], vec![]);

        service
            .register_server(ToolServerRegistration {
                name: "fs".to_string(),
                base_address: "http://localhost".to_string(),
                tool_prefix: "fs.".to_string(),
                auth_header: None,
                auth_token: None,
            })
            .await
            .unwrap();

        service
            .register_server(ToolServerRegistration {
                name: "fs-write".to_string(),
                base_address: "http://localhost".to_string(),
                tool_prefix: "fs.write_".to_string(),
                auth_header: None,
                auth_token: None,
            })
            .await
            .unwrap();
    }
}
