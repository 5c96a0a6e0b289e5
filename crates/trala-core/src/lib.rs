//! trala-core: routing-record enrichment primitives for the Trala dashboard
//!
//! This crate holds the synchronous parts of the pipeline:
//! - Rule parsing: rebuild a service URL from a router rule and its entry point
//! - Naming: turn raw router identifiers into router and display names
//! - Exclusion: drop routers by name or entry point glob
//! - Fuzzy matching against shortest-first catalog name lists
//! - Grouping: partition enriched services into display groups by tag
//!
//! Network-bound icon and tag resolution lives in `trala-resolver`.

mod config;
mod error;
mod exclude;
pub mod fuzzy;
mod grouping;
mod model;
mod naming;
mod rule;

pub use config::{
    compare_versions, is_valid_url, BasicAuth, ConfigStatus, EnvironmentConfig, IconsConfig,
    ServiceConfig, TraefikConfig, TralaConfig, DEFAULT_APP_TAGS_URL, DEFAULT_CATALOG_INDEX_URL,
    DEFAULT_ICON_BASE_URL, MINIMUM_CONFIG_VERSION,
};
pub use error::Error;
pub use exclude::ExclusionRules;
pub use fuzzy::FuzzyMatcher;
pub use grouping::{assign_groups, sort_by_priority, GroupingConfig};
pub use model::{
    AppTagEntry, CatalogEntry, EntryPoint, EntryPointHttp, ExcludeConfig, IconCatalogEntry,
    ManualService, ResolvedService, RoutingRecord, ServiceOverride,
};
pub use naming::{display_name_from_router, lookup_name, service_name_from_url, NamingRules};
pub use rule::{determine_protocol, parse_rule, reconstruct_url, tls_enabled, ParsedRule, Protocol};

pub type Result<T> = std::result::Result<T, Error>;

/// Priority given to manual services that do not set one
pub const DEFAULT_MANUAL_PRIORITY: i64 = 50;
