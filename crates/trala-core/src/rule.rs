//! Rule parser: rebuilds a service's external URL from a router rule and its entry point

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::model::{EntryPoint, RoutingRecord};

static HOST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Host\(\s*`([^`]+)`\s*\)").expect("host pattern is valid"));

static PATH_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"PathPrefix\(\s*`([^`]+)`\s*\)").expect("path prefix pattern is valid")
});

/// URL scheme of a reconstructed service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }

    /// Port that is left out of the URL for this scheme
    pub fn default_port(&self) -> &'static str {
        match self {
            Protocol::Http => "80",
            Protocol::Https => "443",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host and optional path prefix captured from a rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRule {
    pub host: String,
    /// Starts with `/` and never ends with `/`; empty when the rule has no prefix
    pub path: String,
}

/// Extract the first `Host(...)` and `PathPrefix(...)` captures from a rule
pub fn parse_rule(rule: &str) -> Option<ParsedRule> {
    let host = HOST_RE.captures(rule)?.get(1)?.as_str().to_string();

    let mut path = PATH_PREFIX_RE
        .captures(rule)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    if !path.is_empty() && !path.starts_with('/') {
        path.insert(0, '/');
    }
    while path.ends_with('/') {
        path.pop();
    }

    Some(ParsedRule { host, path })
}

/// Whether a raw TLS block marks TLS as configured
///
/// Absent, `null` and `{}` all mean "no TLS".
pub fn tls_enabled(marker: Option<&Value>) -> bool {
    match marker {
        None | Some(Value::Null) => false,
        Some(Value::Object(map)) => !map.is_empty(),
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

/// Router-level TLS wins over entry-point TLS; neither means plain HTTP
pub fn determine_protocol(record: &RoutingRecord, entry_point: &EntryPoint) -> Protocol {
    if tls_enabled(record.tls.as_ref()) || tls_enabled(entry_point.http.tls.as_ref()) {
        Protocol::Https
    } else {
        Protocol::Http
    }
}

/// Port part of an entry point bind address (`:8443` -> `8443`)
fn bind_port(address: &str) -> &str {
    let port = address.rsplit_once(':').map(|(_, p)| p).unwrap_or(address);
    port.split('/').next().unwrap_or(port)
}

/// Rebuild the externally reachable URL of a router
///
/// Returns `None` when the rule has no host, the router lists no entry
/// point, or its first entry point is unknown.
pub fn reconstruct_url(
    record: &RoutingRecord,
    entry_points: &HashMap<String, EntryPoint>,
) -> Option<String> {
    let parsed = parse_rule(&record.rule)?;

    let Some(entry_point_name) = record.entry_points.first() else {
        tracing::debug!(router = %record.name, "Router has no entry points, cannot determine URL");
        return None;
    };
    let Some(entry_point) = entry_points.get(entry_point_name) else {
        tracing::debug!(
            router = %record.name,
            entry_point = %entry_point_name,
            "Entry point not found in proxy configuration"
        );
        return None;
    };

    let protocol = determine_protocol(record, entry_point);
    let port = bind_port(&entry_point.address);

    if port.is_empty() || port == protocol.default_port() {
        Some(format!("{}://{}{}", protocol, parsed.host, parsed.path))
    } else {
        Some(format!("{}://{}:{}{}", protocol, parsed.host, port, parsed.path))
    }
}
