// Copyright (c) 2026 Tollgate Systems
// SPDX-License-Identifier: AGPL-3.0
//! Neo4j-backed `CitationResolver`. A single Cypher query per tool name;
//! any construction or query failure degrades to empty citations rather
//! than surfacing an error (§4.4's non-blocking guarantee).

use async_trait::async_trait;
use neo4rs::{query, Graph};
use tracing::warn;

use crate::application::citation_resolver::{CitationResolver, Citations};

const CITATION_QUERY: &str = r#"
MATCH (t:Tool {name: $tool_name})-[:GOVERNED_BY]->(p:Policy)
OPTIONAL MATCH (t)-[:ENFORCED_BY]->(c:Control)
OPTIONAL MATCH (t)-[:RELATED_TO]->(i:Incident)
RETURN collect(DISTINCT p.id) AS policies, collect(DISTINCT c.id) AS controls, collect(DISTINCT i.id) AS incidents
"#;

pub struct Neo4jCitationResolver {
    graph: Graph,
}

impl Neo4jCitationResolver {
    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self, neo4rs::Error> {
        let graph = Graph::new(uri, user, password).await?;
        Ok(Self { graph })
    }
}

#[async_trait]
impl CitationResolver for Neo4jCitationResolver {
    async fn resolve(&self, tool_name: &str) -> Citations {
        let result = self
            .graph
            .execute(query(CITATION_QUERY).param("tool_name", tool_name))
            .await;

        let mut stream = match result {
            Ok(stream) => stream,
            Err(err) => {
                warn!(tool = tool_name, error = %err, "citation_resolver.query_failed");
                return Citations::default();
            }
        };

        match stream.next().await {
            Ok(Some(row)) => Citations {
                policies: row.get("policies").unwrap_or_default(),
                controls: row.get("controls").unwrap_or_default(),
                incidents: row.get("incidents").unwrap_or_default(),
            },
            Ok(None) => Citations::default(),
            Err(err) => {
                warn!(tool = tool_name, error = %err, "citation_resolver.row_read_failed");
                Citations::default()
            }
        }
    }
}
