// Copyright (c) 2026 Tollgate Systems
// SPDX-License-Identifier: AGPL-3.0
//! `GatewayConfig` — the typed configuration document loaded at startup.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::domain::policy::PrefixRule;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/toolgate/config.yaml";

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub sandbox_root: PathBuf,
    #[serde(default)]
    pub policy_prefix_rules: HashMap<String, PrefixRule>,
    #[serde(default)]
    pub redaction_sensitive_keys: Vec<String>,
    pub backend: BackendConfig,
    #[serde(default)]
    pub citation: Option<CitationConfig>,
    #[serde(default)]
    pub audit_store: AuditStoreConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default = "default_allowed_base_address_schemes")]
    pub allowed_base_address_schemes: Vec<String>,
    #[serde(default)]
    pub allowed_base_address_hosts: Vec<String>,
}

fn default_allowed_base_address_schemes() -> Vec<String> {
    vec!["http".to_string(), "https".to_string()]
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    Http {
        base_url: String,
        #[serde(default)]
        auth_header: Option<String>,
        #[serde(default)]
        auth_token: Option<String>,
    },
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        page_cap: Option<usize>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct CitationConfig {
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditStoreConfig {
    InMemory,
    Postgres { url: String },
}

impl Default for AuditStoreConfig {
    fn default() -> Self {
        AuditStoreConfig::InMemory
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_workers() -> usize {
    4
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: default_workers(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

impl GatewayConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_http_backend_config() {
        let yaml = r#"
sandbox_root: /sandbox
backend:
  kind: http
  base_url: http://localhost:9000
"#;
        let config: GatewayConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.sandbox_root, PathBuf::from("/sandbox"));
        assert!(matches!(config.backend, BackendConfig::Http { .. }));
        assert!(matches!(config.audit_store, AuditStoreConfig::InMemory));
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.allowed_base_address_schemes, vec!["http", "https"]);
        assert!(config.allowed_base_address_hosts.is_empty());
    }

    #[test]
    fn parses_explicit_base_address_allow_list() {
        let yaml = r#"
sandbox_root: /sandbox
backend:
  kind: http
  base_url: http://localhost:9000
allowed_base_address_schemes: ["https"]
allowed_base_address_hosts: ["tools.internal"]
"#;
        let config: GatewayConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.allowed_base_address_schemes, vec!["https"]);
        assert_eq!(config.allowed_base_address_hosts, vec!["tools.internal"]);
    }

    #[test]
    fn parses_stdio_backend_with_postgres_store() {
        let yaml = r#"
sandbox_root: /sandbox
backend:
  kind: stdio
  command: /usr/local/bin/fs-tool-server
  args: ["--stdio"]
audit_store:
  kind: postgres
  url: postgres://localhost/toolgate
server:
  port: 9090
"#;
        let config: GatewayConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(config.backend, BackendConfig::Stdio { .. }));
        assert!(matches!(config.audit_store, AuditStoreConfig::Postgres { .. }));
        assert_eq!(config.server.port, 9090);
    }
}
