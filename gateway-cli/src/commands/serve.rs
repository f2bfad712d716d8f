// Copyright (c) 2026 Tollgate Systems
// SPDX-License-Identifier: AGPL-3.0
//! `toolgate serve` — parses config, constructs the audit store, citation
//! resolver and tool backend it selects, builds the Axum router, and binds
//! the listener. Any failure in this chain exits non-zero before the server
//! starts accepting connections (no partial startup state is observable).

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

use toolgate_core::application::{ApprovalController, DecisionPipeline, PolicyEngine, Redactor, ToolCatalogService};
use toolgate_core::domain::repository::AuditStore;
use toolgate_core::infrastructure::audit::{InMemoryAuditStore, PostgresAuditStore};
use toolgate_core::infrastructure::backends::{HttpToolBackend, StdioJsonRpcBackend};
use toolgate_core::infrastructure::citation::{Neo4jCitationResolver, NoopCitationResolver};
use toolgate_core::infrastructure::config::{AuditStoreConfig, BackendConfig, GatewayConfig, DEFAULT_CONFIG_PATH};
use toolgate_core::infrastructure::{db, metrics, EventBus};
use toolgate_core::presentation::{app, AppState};

#[derive(Args)]
pub struct ServeArgs {
    /// Bind host, overrides the config file's `server.host`.
    #[arg(long)]
    host: Option<String>,

    /// Bind port, overrides the config file's `server.port`.
    #[arg(long)]
    port: Option<u16>,

    /// Worker thread count, overrides the config file's `server.workers`.
    #[arg(long)]
    workers: Option<usize>,

    /// Reload configuration on file change (development use only).
    #[arg(long, default_value_t = false)]
    reload: bool,
}

pub async fn run(config_path: Option<PathBuf>, args: ServeArgs) -> Result<()> {
    let path = config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let mut config = GatewayConfig::load(&path).with_context(|| format!("loading config from {}", path.display()))?;

    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(workers) = args.workers {
        config.server.workers = workers;
    }
    if args.reload {
        tracing::warn!("toolgate.serve.reload_flag_set_but_unsupported_in_this_build");
    }

    let audit: Arc<dyn AuditStore> = match &config.audit_store {
        AuditStoreConfig::InMemory => Arc::new(InMemoryAuditStore::new()),
        AuditStoreConfig::Postgres { url } => {
            let database = db::Database::connect(url).await.context("connecting to postgres audit store")?;
            Arc::new(PostgresAuditStore::new(database))
        }
    };

    let backend: Arc<dyn toolgate_core::application::ToolBackend> = match &config.backend {
        BackendConfig::Http { base_url, auth_header, auth_token } => {
            Arc::new(HttpToolBackend::new(base_url.clone(), auth_header.clone(), auth_token.clone()))
        }
        BackendConfig::Stdio { command, args, page_cap } => {
            let mut backend = StdioJsonRpcBackend::new(command.clone(), args.clone());
            if let Some(cap) = page_cap {
                backend = backend.with_page_cap(*cap);
            }
            Arc::new(backend)
        }
    };

    let citations: Arc<dyn toolgate_core::application::CitationResolver> = match &config.citation {
        Some(citation_config) => {
            match Neo4jCitationResolver::connect(&citation_config.neo4j_uri, &citation_config.neo4j_user, &citation_config.neo4j_password).await {
                Ok(resolver) => Arc::new(resolver),
                Err(err) => {
                    tracing::warn!(error = %err, "toolgate.serve.citation_backend_unreachable_falling_back_to_noop");
                    Arc::new(NoopCitationResolver)
                }
            }
        }
        None => Arc::new(NoopCitationResolver),
    };

    let redactor = if config.redaction_sensitive_keys.is_empty() {
        Redactor::default()
    } else {
        Redactor::new(config.redaction_sensitive_keys.clone())
    };
    let policy = PolicyEngine::new(config.sandbox_root.clone(), config.policy_prefix_rules.clone(), vec![]);

    let events = Arc::new(EventBus::new());

    let pipeline = Arc::new(DecisionPipeline::new(audit.clone(), redactor, policy, citations, backend.clone(), events.clone()));
    let approvals = Arc::new(ApprovalController::new(audit.clone(), backend.clone(), events.clone()));
    let catalog = Arc::new(ToolCatalogService::new(
        audit.clone(),
        backend,
        config.allowed_base_address_schemes.clone(),
        config.allowed_base_address_hosts.clone(),
    ));

    let metrics_handle = metrics::install();

    let state = Arc::new(AppState {
        audit,
        pipeline,
        approvals,
        catalog,
        metrics_handle,
        events,
    });

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.with_context(|| format!("binding {addr}"))?;
    tracing::info!(addr, "toolgate.serve.listening");

    axum::serve(listener, app(state)).await.context("gateway server exited")?;
    Ok(())
}
