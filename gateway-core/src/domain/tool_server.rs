// Copyright (c) 2026 Tollgate Systems
// SPDX-License-Identifier: AGPL-3.0
//! Tool server registrations and their discovered tool catalogs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named logical server exposing tools under a non-overlapping name
/// prefix (§3). Registrations with overlapping prefixes are rejected unless
/// one strictly extends the other.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolServerRegistration {
    pub name: String,
    pub base_address: String,
    pub tool_prefix: String,
    pub auth_header: Option<String>,
    pub auth_token: Option<String>,
}

/// A single discoverable tool under a server, namespaced with the server's
/// prefix. Tool catalogs are replaced wholesale on each sync, never merged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolContract {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Option<Value>,
    pub raw: Value,
}

/// Resolves the server registration whose prefix is the longest match for
/// `tool_name`, per §3's routing invariant. Registrations are expected to
/// have non-overlapping prefixes except where one strictly extends another,
/// so the longest match is unambiguous.
pub fn route_by_longest_prefix<'a>(
    tool_name: &str,
    servers: impl IntoIterator<Item = &'a ToolServerRegistration>,
) -> Option<&'a ToolServerRegistration> {
    servers
        .into_iter()
        .filter(|server| tool_name.starts_with(&server.tool_prefix))
        .max_by_key(|server| server.tool_prefix.len())
}

/// Two prefixes are compatible for registration purposes if they don't
/// overlap, or one strictly extends the other.
pub fn prefixes_compatible(a: &str, b: &str) -> bool {
    a == b || a.starts_with(b) || b.starts_with(a)
}

/// Validates a server's `base_address` against the configured scheme/host
/// allow-lists (§6). An unparseable address is always rejected. An empty
/// `allowed_schemes` list rejects everything; an empty `allowed_hosts` list
/// leaves the host unconstrained (schemes still apply), since requiring an
/// exhaustive host enumeration for every deployment is impractical.
pub fn base_address_allowed(base_address: &str, allowed_schemes: &[String], allowed_hosts: &[String]) -> bool {
    let Ok(url) = url::Url::parse(base_address) else {
        return false;
    };
    if !allowed_schemes.iter().any(|scheme| scheme == url.scheme()) {
        return false;
    }
    if allowed_hosts.is_empty() {
        return true;
    }
    matches!(url.host_str(), Some(host) if allowed_hosts.iter().any(|allowed| allowed == host))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(name: &str, prefix: &str) -> ToolServerRegistration {
        ToolServerRegistration {
            name: name.to_string(),
            base_address: "http://localhost".to_string(),
            tool_prefix: prefix.to_string(),
            auth_header: None,
            auth_token: None,
        }
    }

    #[test]
    fn longest_prefix_wins() {
        let servers = vec![server("fs", "fs."), server("fs-write", "fs.write_")];
        let routed = route_by_longest_prefix("fs.write_file", &servers).unwrap();
        assert_eq!(routed.name, "fs-write");

        let routed = route_by_longest_prefix("fs.read_file", &servers).unwrap();
        assert_eq!(routed.name, "fs");
    }

    #[test]
    fn no_match_returns_none() {
        let servers = vec![server("fs", "fs.")];
        assert!(route_by_longest_prefix("git.commit", &servers).is_none());
    }

    #[test]
    fn extension_prefixes_are_compatible() {
        assert!(prefixes_compatible("fs.", "fs.write_"));
        assert!(!prefixes_compatible("fs.", "git."));
    }

    #[test]
    fn base_address_rejects_disallowed_scheme() {
        let schemes = vec!["https".to_string()];
        assert!(!base_address_allowed("http://tools.internal", &schemes, &[]));
        assert!(base_address_allowed("https://tools.internal", &schemes, &[]));
    }

    #[test]
    fn base_address_empty_host_list_leaves_host_unconstrained() {
        let schemes = vec!["https".to_string()];
        assert!(base_address_allowed("https://anything.example", &schemes, &[]));
    }

    #[test]
    fn base_address_rejects_host_not_in_allow_list() {
        let schemes = vec!["https".to_string()];
        let hosts = vec!["tools.internal".to_string()];
        assert!(base_address_allowed("https://tools.internal", &schemes, &hosts));
        assert!(!base_address_allowed("https://evil.example", &schemes, &hosts));
    }

    #[test]
    fn base_address_rejects_unparseable_url() {
        assert!(!base_address_allowed("not-a-url", &["https".to_string()], &[]));
    }
}
