//! Records consumed from the upstream proxy and the enriched records produced from them

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One exposed route as reported by the proxy's admin API
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingRecord {
    /// Raw router identifier, e.g. `websecure-grafana@docker`
    #[serde(default)]
    pub name: String,
    /// Free-form matcher rule, e.g. ``Host(`grafana.lan`) && PathPrefix(`/ui`)``;
    /// the admin API omits it when empty
    #[serde(default)]
    pub rule: String,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub priority: i64,
    /// Entry points the router listens on; only the first one is used for URL reconstruction
    #[serde(default, rename = "entryPoints")]
    pub entry_points: Vec<String>,
    /// Router-level TLS block, kept raw so that `null` and `{}` can be told apart from a real config
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<Value>,
}

/// HTTP section of an entry point
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntryPointHttp {
    #[serde(default)]
    pub tls: Option<Value>,
}

/// A named listener shared by many routers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntryPoint {
    pub name: String,
    /// Bind address in `:port` form
    pub address: String,
    #[serde(default)]
    pub http: EntryPointHttp,
}

/// Final, display-ready service record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedService {
    #[serde(rename = "Name")]
    pub name: String,
    pub url: String,
    pub priority: i64,
    /// Empty means no icon was found and the client should render a placeholder
    pub icon: String,
    pub tags: Vec<String>,
    /// Empty means uncategorized
    pub group: String,
}

impl ResolvedService {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Entries of a remote catalog that are looked up by their reference name
pub trait CatalogEntry {
    fn reference(&self) -> &str;
}

/// Entry of the selfh.st icon index
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IconCatalogEntry {
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Reference")]
    pub reference: String,
    #[serde(rename = "SVG", default)]
    pub svg: String,
    #[serde(rename = "PNG", default)]
    pub png: String,
    #[serde(rename = "WebP", default)]
    pub webp: String,
    #[serde(rename = "Category", default)]
    pub category: String,
    #[serde(rename = "Tags", default)]
    pub tags: String,
}

impl IconCatalogEntry {
    pub fn has_svg(&self) -> bool {
        self.svg == "Yes"
    }
}

impl CatalogEntry for IconCatalogEntry {
    fn reference(&self) -> &str {
        &self.reference
    }
}

/// Entry of the app tag directory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppTagEntry {
    pub reference: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CatalogEntry for AppTagEntry {
    fn reference(&self) -> &str {
        &self.reference
    }
}

/// Per-router display overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceOverride {
    /// Router name the override applies to (after naming rules are applied)
    pub service: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub icon: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub group: String,
}

/// A service that is not discovered through the proxy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManualService {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub icon: String,
    #[serde(default)]
    pub priority: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub group: String,
}

/// Glob patterns for routers and entry points that must never be shown
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExcludeConfig {
    #[serde(default)]
    pub routers: Vec<String>,
    #[serde(default)]
    pub entrypoints: Vec<String>,
}
