//! Dashboard configuration: defaults, YAML file, environment overrides, validation

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use url::Url;

use crate::error::Error;
use crate::grouping::GroupingConfig;
use crate::model::{ExcludeConfig, ManualService, ServiceOverride};
use crate::naming::NamingRules;

/// Oldest configuration schema this build understands
pub const MINIMUM_CONFIG_VERSION: &str = "3.0";

pub const DEFAULT_ICON_BASE_URL: &str = "https://cdn.jsdelivr.net/gh/selfhst/icons/";
pub const DEFAULT_CATALOG_INDEX_URL: &str =
    "https://raw.githubusercontent.com/selfhst/icons/refs/heads/main/index.json";
pub const DEFAULT_APP_TAGS_URL: &str =
    "https://raw.githubusercontent.com/selfhst/cdn/refs/heads/main/directory/integrations/trala.json";

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TralaConfig {
    /// Schema version; `version: 3.1` arrives as a YAML float
    #[serde(default, deserialize_with = "version_string")]
    pub version: String,
    #[serde(default)]
    pub environment: EnvironmentConfig,
    #[serde(default)]
    pub services: ServiceConfig,
    /// Overrides keyed by router name, rebuilt by [`TralaConfig::finalize`]
    #[serde(skip)]
    overrides_by_router: HashMap<String, ServiceOverride>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Base URL of the icon CDN; always ends with `/`
    #[serde(default = "default_icon_base_url")]
    pub selfhst_icon_url: String,
    #[serde(default = "default_search_engine_url")]
    pub search_engine_url: String,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_seconds: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub traefik: TraefikConfig,
    #[serde(default)]
    pub grouping: GroupingConfig,
    #[serde(default)]
    pub icons: IconsConfig,
    #[serde(default)]
    pub naming: NamingRules,
}

fn version_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawVersion {
        Text(String),
        Integer(i64),
        Float(f64),
    }

    Ok(match Option::<RawVersion>::deserialize(deserializer)? {
        Some(RawVersion::Text(v)) => v,
        Some(RawVersion::Integer(v)) => v.to_string(),
        Some(RawVersion::Float(v)) => v.to_string(),
        None => String::new(),
    })
}

fn default_icon_base_url() -> String {
    DEFAULT_ICON_BASE_URL.to_string()
}

fn default_search_engine_url() -> String {
    "https://www.google.com/search?q=".to_string()
}

fn default_refresh_interval() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            selfhst_icon_url: default_icon_base_url(),
            search_engine_url: default_search_engine_url(),
            refresh_interval_seconds: default_refresh_interval(),
            log_level: default_log_level(),
            traefik: TraefikConfig::default(),
            grouping: GroupingConfig::default(),
            icons: IconsConfig::default(),
            naming: NamingRules::default(),
        }
    }
}

/// Connection to the proxy's admin API
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraefikConfig {
    #[serde(default)]
    pub api_host: String,
    #[serde(default)]
    pub enable_basic_auth: bool,
    #[serde(default)]
    pub basic_auth: BasicAuth,
    #[serde(default)]
    pub insecure_skip_verify: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BasicAuth {
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(default)]
    pub password_file: String,
}

/// Icon sources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IconsConfig {
    /// Directory scanned for user-provided icons
    #[serde(default = "default_icons_dir")]
    pub directory: PathBuf,
    /// URL path the directory is served under
    #[serde(default = "default_icons_route")]
    pub route: String,
    #[serde(default = "default_catalog_index_url")]
    pub catalog_index_url: String,
    #[serde(default = "default_app_tags_url")]
    pub app_tags_url: String,
    /// Upper bound on routers processed concurrently
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_icons_dir() -> PathBuf {
    PathBuf::from("/icons")
}

fn default_icons_route() -> String {
    "/icons".to_string()
}

fn default_catalog_index_url() -> String {
    DEFAULT_CATALOG_INDEX_URL.to_string()
}

fn default_app_tags_url() -> String {
    DEFAULT_APP_TAGS_URL.to_string()
}

fn default_max_concurrency() -> usize {
    32
}

impl Default for IconsConfig {
    fn default() -> Self {
        Self {
            directory: default_icons_dir(),
            route: default_icons_route(),
            catalog_index_url: default_catalog_index_url(),
            app_tags_url: default_app_tags_url(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub exclude: ExcludeConfig,
    #[serde(default)]
    pub overrides: Vec<ServiceOverride>,
    #[serde(default)]
    pub manual: Vec<ManualService>,
}

/// Compatibility of the loaded configuration with this build
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigStatus {
    pub config_version: String,
    pub minimum_required_version: String,
    pub is_compatible: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub warning_message: String,
}

impl ConfigStatus {
    pub fn check(config_version: &str, extra_warning: Option<&str>) -> Self {
        let mut status = Self {
            config_version: config_version.to_string(),
            minimum_required_version: MINIMUM_CONFIG_VERSION.to_string(),
            is_compatible: true,
            warning_message: String::new(),
        };

        if config_version.is_empty() {
            status.is_compatible = false;
            status.warning_message = "No configuration version specified. Please add 'version: X.Y' to your configuration file.".to_string();
            return status;
        }

        if compare_versions(config_version, MINIMUM_CONFIG_VERSION) == std::cmp::Ordering::Less {
            status.is_compatible = false;
            status.warning_message = format!(
                "Configuration version {} is below the minimum required version {}. Some configuration options may be ignored.",
                config_version, MINIMUM_CONFIG_VERSION
            );
        }

        if let Some(extra) = extra_warning {
            if status.warning_message.is_empty() {
                status.warning_message = extra.to_string();
            } else {
                status.warning_message = format!("{} {}", status.warning_message, extra);
            }
        }

        status
    }
}

/// Compare `major.minor.patch` versions; missing or non-numeric parts count as 0
pub fn compare_versions(a: &str, b: &str) -> std::cmp::Ordering {
    fn parts(v: &str) -> [u64; 3] {
        let mut out = [0u64; 3];
        for (slot, part) in out.iter_mut().zip(v.split('.')) {
            *slot = part.trim().parse().unwrap_or(0);
        }
        out
    }
    parts(a).cmp(&parts(b))
}

/// URL with both a scheme and a host
pub fn is_valid_url(raw: &str) -> bool {
    Url::parse(raw)
        .map(|u| !u.scheme().is_empty() && u.host_str().is_some_and(|h| !h.is_empty()))
        .unwrap_or(false)
}

impl TralaConfig {
    /// Load a YAML configuration file (JSON is valid YAML and loads too)
    pub fn load(path: impl AsRef<Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Full loading pipeline used by the binary
    ///
    /// Defaults, then the optional file, then environment variables, then
    /// validation. A missing file is not an error.
    pub fn from_sources<F>(path: Option<&Path>, env: F) -> crate::Result<(Self, ConfigStatus)>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(p) if p.exists() => Self::load(p)?,
            Some(p) => {
                tracing::info!(path = %p.display(), "No configuration file found, using defaults and environment");
                Self::unversioned_default()
            }
            None => Self::unversioned_default(),
        };

        let auth_warning = config.password_source_warning(&env);
        if let Some(warning) = &auth_warning {
            tracing::warn!("{}", warning);
        }

        config.apply_env(&env);
        config.finalize()?;

        let status = ConfigStatus::check(&config.version, auth_warning.as_deref());
        if !status.is_compatible {
            tracing::warn!("{}", status.warning_message);
        }

        tracing::info!(
            router_excludes = config.services.exclude.routers.len(),
            entrypoint_excludes = config.services.exclude.entrypoints.len(),
            overrides = config.services.overrides.len(),
            manual = config.services.manual.len(),
            "Configuration loaded"
        );

        Ok((config, status))
    }

    fn unversioned_default() -> Self {
        Self {
            version: MINIMUM_CONFIG_VERSION.to_string(),
            ..Default::default()
        }
    }

    /// Apply environment overrides; unparseable values are ignored with a warning
    pub fn apply_env<F>(&mut self, env: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| env(key).filter(|v| !v.is_empty());
        let e = &mut self.environment;

        if let Some(v) = get("SELFHST_ICON_URL") {
            e.selfhst_icon_url = v;
        }
        if let Some(v) = get("SEARCH_ENGINE_URL") {
            e.search_engine_url = v;
        }
        if let Some(v) = get("REFRESH_INTERVAL_SECONDS") {
            match v.parse::<u64>() {
                Ok(n) if n > 0 => e.refresh_interval_seconds = n,
                _ => tracing::warn!(value = %v, using = e.refresh_interval_seconds, "Invalid REFRESH_INTERVAL_SECONDS"),
            }
        }
        if let Some(v) = get("TRAEFIK_API_HOST") {
            e.traefik.api_host = v;
        }
        if let Some(v) = get("TRAEFIK_BASIC_AUTH_USERNAME") {
            e.traefik.basic_auth.username = v;
        }
        if let Some(v) = get("TRAEFIK_BASIC_AUTH_PASSWORD") {
            e.traefik.basic_auth.password = v;
        }
        if let Some(v) = get("TRAEFIK_BASIC_AUTH_PASSWORD_FILE") {
            e.traefik.basic_auth.password_file = v;
        }
        if let Some(v) = get("TRAEFIK_INSECURE_SKIP_VERIFY") {
            match parse_bool(&v) {
                Some(b) => e.traefik.insecure_skip_verify = b,
                None => tracing::warn!(value = %v, using = e.traefik.insecure_skip_verify, "Invalid TRAEFIK_INSECURE_SKIP_VERIFY"),
            }
        }
        if let Some(v) = get("LOG_LEVEL") {
            e.log_level = v;
        }
        if let Some(v) = get("GROUPING_ENABLED") {
            match parse_bool(&v) {
                Some(b) => e.grouping.enabled = b,
                None => tracing::warn!(value = %v, using = e.grouping.enabled, "Invalid GROUPING_ENABLED"),
            }
        }
        if let Some(v) = get("GROUPING_TAG_FREQUENCY_THRESHOLD") {
            match v.parse::<f64>() {
                Ok(n) if n > 0.0 && n <= 1.0 => e.grouping.tag_frequency_threshold = n,
                _ => tracing::warn!(value = %v, using = e.grouping.tag_frequency_threshold, "Invalid GROUPING_TAG_FREQUENCY_THRESHOLD"),
            }
        }
        if let Some(v) = get("GROUPING_MIN_SERVICES_PER_GROUP") {
            match v.parse::<usize>() {
                Ok(n) if n >= 1 => e.grouping.min_services_per_group = n,
                _ => tracing::warn!(value = %v, using = e.grouping.min_services_per_group, "Invalid GROUPING_MIN_SERVICES_PER_GROUP, must be >= 1"),
            }
        }
        if let Some(v) = get("GROUPED_COLUMNS") {
            match v.parse::<u32>() {
                Ok(n) if (1..=6).contains(&n) => e.grouping.columns = n,
                _ => tracing::warn!(value = %v, using = e.grouping.columns, "Invalid GROUPED_COLUMNS, must be between 1 and 6"),
            }
        }
    }

    /// Warning when the basic auth password is configured in more than one place
    fn password_source_warning<F>(&self, env: &F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let traefik = &self.environment.traefik;
        if !traefik.enable_basic_auth {
            return None;
        }
        let env_set = |key: &str| env(key).is_some_and(|v| !v.is_empty());
        let sources = [
            !traefik.basic_auth.password.is_empty(),
            !traefik.basic_auth.password_file.is_empty(),
            env_set("TRAEFIK_BASIC_AUTH_PASSWORD"),
            env_set("TRAEFIK_BASIC_AUTH_PASSWORD_FILE"),
        ]
        .into_iter()
        .filter(|set| *set)
        .count();

        (sources > 1).then(|| {
            "Basic auth password is configured using multiple methods. Please use only one method: either password in config file, password file, or environment variable.".to_string()
        })
    }

    /// Validate, normalise and index the configuration
    pub fn finalize(&mut self) -> crate::Result<()> {
        let e = &mut self.environment;

        if e.traefik.api_host.is_empty() {
            return Err(Error::MissingSetting("environment.traefik.api_host"));
        }
        if !e.traefik.api_host.starts_with("http://") && !e.traefik.api_host.starts_with("https://") {
            e.traefik.api_host = format!("http://{}", e.traefik.api_host);
        }
        while e.traefik.api_host.ends_with('/') {
            e.traefik.api_host.pop();
        }
        if !e.selfhst_icon_url.ends_with('/') {
            e.selfhst_icon_url.push('/');
        }

        let g = &e.grouping;
        if !(g.tag_frequency_threshold > 0.0 && g.tag_frequency_threshold <= 1.0) {
            return Err(Error::InvalidSetting {
                field: "environment.grouping.tag_frequency_threshold",
                reason: format!("{} is not in (0, 1]", g.tag_frequency_threshold),
            });
        }
        if g.min_services_per_group < 1 {
            return Err(Error::InvalidSetting {
                field: "environment.grouping.min_services_per_group",
                reason: "must be at least 1".to_string(),
            });
        }
        if e.icons.max_concurrency == 0 {
            e.icons.max_concurrency = default_max_concurrency();
        }

        let auth = &mut e.traefik.basic_auth;
        if e.traefik.enable_basic_auth {
            if auth.username.is_empty() || (auth.password.is_empty() && auth.password_file.is_empty()) {
                return Err(Error::MissingSetting(
                    "environment.traefik.basic_auth username and password or password_file",
                ));
            }
            if !auth.password.is_empty() && !auth.password_file.is_empty() {
                tracing::warn!("Basic auth password and password file are both set, the file takes precedence");
            }
            if !auth.password_file.is_empty() {
                let password = std::fs::read_to_string(&auth.password_file).map_err(|source| Error::PasswordFile {
                    path: auth.password_file.clone(),
                    source,
                })?;
                auth.password = password.trim_end_matches(['\r', '\n']).to_string();
            }
        }

        if e.traefik.insecure_skip_verify {
            tracing::warn!("SSL certificate verification is disabled for proxy API connections");
        }

        self.index_overrides();
        Ok(())
    }

    fn index_overrides(&mut self) {
        self.overrides_by_router = self
            .services
            .overrides
            .iter()
            .map(|o| (o.service.clone(), o.clone()))
            .collect();
    }

    pub fn service_override(&self, router_name: &str) -> Option<&ServiceOverride> {
        self.overrides_by_router.get(router_name)
    }

    pub fn display_name_override(&self, router_name: &str) -> Option<&str> {
        self.service_override(router_name)
            .map(|o| o.display_name.as_str())
            .filter(|s| !s.is_empty())
    }

    pub fn group_override(&self, router_name: &str) -> Option<&str> {
        self.service_override(router_name)
            .map(|o| o.group.as_str())
            .filter(|s| !s.is_empty())
    }

    /// URL of the proxy's own admin API, which is never listed as a service
    pub fn admin_api_url(&self) -> Option<String> {
        let host = &self.environment.traefik.api_host;
        if host.is_empty() {
            return None;
        }
        if host.starts_with("http") {
            Some(format!("{}/api", host))
        } else {
            Some(format!("http://{}/api", host))
        }
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.to_ascii_lowercase().as_str() {
        "1" | "t" | "true" => Some(true),
        "0" | "f" | "false" => Some(false),
        _ => None,
    }
}
