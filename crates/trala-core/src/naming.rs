//! Router identifier clean-up and display-name derivation

use serde::{Deserialize, Serialize};
use url::Url;

/// How raw router identifiers are turned into router names
///
/// The defaults follow Traefik's conventions: `name@provider` and routers
/// named after their entry point (`websecure-grafana`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamingRules {
    /// Separator in front of the provider tag; `None` keeps identifiers whole
    #[serde(default = "default_provider_separator")]
    pub provider_separator: Option<char>,
    /// Drop a leading `<entrypoint>-` (case-insensitive)
    #[serde(default = "default_true")]
    pub strip_entrypoint_prefix: bool,
}

fn default_provider_separator() -> Option<char> {
    Some('@')
}

fn default_true() -> bool {
    true
}

impl Default for NamingRules {
    fn default() -> Self {
        Self {
            provider_separator: default_provider_separator(),
            strip_entrypoint_prefix: true,
        }
    }
}

impl NamingRules {
    /// Router name used for overrides, exclusions and display-name derivation
    pub fn router_name(&self, identifier: &str, entry_points: &[String]) -> String {
        let mut name = match self.provider_separator {
            Some(sep) => identifier.split(sep).next().unwrap_or(identifier),
            None => identifier,
        };

        if self.strip_entrypoint_prefix {
            if let Some(entry_point) = entry_points.first() {
                let prefix = format!("{}-", entry_point);
                if name.len() > prefix.len() {
                    if let Some(head) = name.get(..prefix.len()) {
                        if head.to_lowercase() == prefix.to_lowercase() {
                            name = &name[prefix.len()..];
                            tracing::debug!(%prefix, router = %name, "Removed entry point prefix from router name");
                        }
                    }
                }
            }
        }

        name.to_string()
    }
}

/// Display name derived from a router name when no override exists
pub fn display_name_from_router(router_name: &str) -> String {
    router_name.replace('-', " ")
}

/// Form of a display name used for fuzzy lookups
pub fn lookup_name(display_name: &str) -> String {
    display_name.replace(' ', "-")
}

/// Second-level domain label of a URL host (`www.google.com` -> `google`)
pub fn service_name_from_url(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    let host = url.host_str()?;
    if host.is_empty() {
        return None;
    }
    let parts: Vec<&str> = host.split('.').collect();
    if parts.len() < 2 {
        return Some(host.to_string());
    }
    Some(parts[parts.len() - 2].to_string())
}
