//! Icon and tag resolution for a single service
//!
//! Icons are found through a fixed cascade of tiers, evaluated in order
//! until one produces a reference:
//!
//! 1. configured override for the router
//! 2. fuzzy match in the local icon directory
//! 3. remote catalog entry for the service's catalog reference
//! 4. `/favicon.ico` at the service origin
//! 5. `<link>` icons advertised by the service's landing page
//!
//! Tags come from the app-tag catalog using the same catalog reference, so
//! the icon and tags of a service always describe the same application.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use metrics::counter;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use trala_core::{AppTagEntry, FuzzyMatcher, IconCatalogEntry, TralaConfig};

use crate::cache::{CatalogCache, APP_TAGS_TTL, ICON_CATALOG_TTL};
use crate::error::Result;
use crate::local::LocalIconIndex;
use crate::probe::IconProbe;

/// Timeout for catalog downloads
pub const CATALOG_TIMEOUT: Duration = Duration::from_secs(30);

/// Icon file extensions accepted verbatim in overrides
const OVERRIDE_EXTENSIONS: &[&str] = &["png", "svg", "webp"];

/// One step of the icon cascade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IconTier {
    Override,
    LocalDirectory,
    Catalog,
    Favicon,
    EmbeddedLink,
}

impl IconTier {
    /// Evaluation order
    pub const CASCADE: [IconTier; 5] = [
        IconTier::Override,
        IconTier::LocalDirectory,
        IconTier::Catalog,
        IconTier::Favicon,
        IconTier::EmbeddedLink,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IconTier::Override => "override",
            IconTier::LocalDirectory => "local",
            IconTier::Catalog => "catalog",
            IconTier::Favicon => "favicon",
            IconTier::EmbeddedLink => "html",
        }
    }

    /// Tiers that make network requests to the service itself
    pub fn probes_service(&self) -> bool {
        matches!(self, IconTier::Favicon | IconTier::EmbeddedLink)
    }
}

/// Icon found by the cascade and the tier that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconMatch {
    pub tier: IconTier,
    pub icon: String,
}

/// Inputs for one cascade run
#[derive(Debug, Clone, Copy)]
pub struct IconQuery<'a> {
    /// Router name (or manual service name) overrides are keyed by
    pub identifier: &'a str,
    pub service_url: &'a str,
    /// Display name with spaces replaced by `-`
    pub lookup_name: &'a str,
    /// Catalog reference resolved for this service, if any
    pub reference: Option<&'a str>,
}

/// Shared resolver for icons and tags
pub struct IconResolver {
    icon_base_url: String,
    icon_overrides: HashMap<String, String>,
    icons: CatalogCache<IconCatalogEntry>,
    app_tags: CatalogCache<AppTagEntry>,
    local: RwLock<LocalIconIndex>,
    local_dir: PathBuf,
    local_route: String,
    probe: IconProbe,
}

impl IconResolver {
    pub fn new(config: &TralaConfig) -> Result<Self> {
        let catalog_http = reqwest::Client::builder().timeout(CATALOG_TIMEOUT).build()?;
        Ok(Self::with_clients(config, catalog_http, IconProbe::new()?))
    }

    pub fn with_clients(config: &TralaConfig, catalog_http: reqwest::Client, probe: IconProbe) -> Self {
        let env = &config.environment;
        let icon_overrides = config
            .services
            .overrides
            .iter()
            .filter(|o| !o.icon.is_empty())
            .map(|o| (o.service.clone(), o.icon.clone()))
            .collect();

        Self {
            icon_base_url: env.selfhst_icon_url.clone(),
            icon_overrides,
            icons: CatalogCache::new("icons", &env.icons.catalog_index_url, ICON_CATALOG_TTL, catalog_http.clone()),
            app_tags: CatalogCache::new("app_tags", &env.icons.app_tags_url, APP_TAGS_TTL, catalog_http),
            local: RwLock::new(LocalIconIndex::default()),
            local_dir: env.icons.directory.clone(),
            local_route: env.icons.route.clone(),
            probe,
        }
    }

    /// Pre-fetch both catalogs and index the local icon directory
    pub async fn warm(&self) {
        let (icons, tags, local) = tokio::join!(
            self.icons.get_or_refresh(),
            self.app_tags.get_or_refresh(),
            self.rescan_local_icons(),
        );
        if let Err(e) = icons {
            warn!(error = %e, "Could not pre-fetch icon catalog");
        }
        if let Err(e) = tags {
            warn!(error = %e, "Could not pre-fetch app tag catalog");
        }
        match local {
            Ok(count) => info!(local_icons = count, "Icon resolver warmed"),
            Err(e) => warn!(error = %e, "Could not scan local icon directory"),
        }
    }

    /// Re-index the local icon directory, returning the number of icons found
    pub async fn rescan_local_icons(&self) -> Result<usize> {
        let dir = self.local_dir.clone();
        let route = self.local_route.clone();
        let index = tokio::task::spawn_blocking(move || LocalIconIndex::scan(&dir, &route)).await??;
        let count = index.len();
        *self.local.write().await = index;
        Ok(count)
    }

    pub async fn local_icon_count(&self) -> usize {
        self.local.read().await.len()
    }

    /// Catalog reference that best matches a lookup name
    pub async fn resolve_reference(&self, lookup_name: &str) -> Option<String> {
        let entries = self.icons.entries().await;
        let reference = FuzzyMatcher::new()
            .best_match(lookup_name, entries.iter().map(|e| e.reference.as_str()))
            .map(str::to_string);
        debug!(%lookup_name, ?reference, "Resolved catalog reference");
        reference
    }

    /// Run the cascade; `None` when every tier comes up empty
    pub async fn resolve(&self, query: IconQuery<'_>) -> Option<IconMatch> {
        for tier in IconTier::CASCADE {
            let Some(icon) = self.try_tier(tier, &query).await.filter(|i| !i.is_empty()) else {
                continue;
            };
            counter!("trala_icon_resolutions_total", "tier" => tier.as_str()).increment(1);
            debug!(service = %query.identifier, tier = tier.as_str(), %icon, "Resolved icon");
            return Some(IconMatch { tier, icon });
        }
        counter!("trala_icon_resolutions_total", "tier" => "none").increment(1);
        debug!(service = %query.identifier, "No icon found, client will use a placeholder");
        None
    }

    /// Icon reference for a service, or the empty string when nothing was found
    pub async fn resolve_icon(
        &self,
        identifier: &str,
        service_url: &str,
        lookup_name: &str,
        reference: Option<&str>,
    ) -> String {
        let query = IconQuery {
            identifier,
            service_url,
            lookup_name,
            reference,
        };
        self.resolve(query).await.map(|m| m.icon).unwrap_or_default()
    }

    /// Tags of the app-tag catalog entry for `reference`, de-duplicated
    pub async fn resolve_tags(&self, identifier: &str, reference: Option<&str>) -> Vec<String> {
        let Some(reference) = reference.filter(|r| !r.is_empty()) else {
            return Vec::new();
        };
        let entries = self.app_tags.entries().await;
        let Some(entry) = entries.iter().find(|e| e.reference == reference) else {
            debug!(service = %identifier, %reference, "No tags in catalog");
            return Vec::new();
        };

        let mut tags: Vec<String> = Vec::with_capacity(entry.tags.len());
        for tag in &entry.tags {
            if !tags.contains(tag) {
                tags.push(tag.clone());
            }
        }
        debug!(service = %identifier, ?tags, "Resolved tags");
        tags
    }

    /// Rewrite a configured icon value into a URL
    ///
    /// Absolute URLs pass through. `name.svg` style values point at the
    /// matching format directory of the icon CDN; anything else is taken as
    /// a bare PNG name.
    pub fn icon_url_for_value(&self, value: &str) -> String {
        if value.starts_with("http://") || value.starts_with("https://") {
            return value.to_string();
        }
        let lower = value.to_lowercase();
        if let Some((_, ext)) = lower.rsplit_once('.') {
            if OVERRIDE_EXTENSIONS.contains(&ext) {
                return format!("{}{}/{}", self.icon_base_url, ext, lower);
            }
        }
        format!("{}png/{}.png", self.icon_base_url, lower)
    }

    /// CDN URL for a catalog entry, SVG when available
    pub fn catalog_icon_url(&self, entry: &IconCatalogEntry) -> String {
        if entry.has_svg() {
            format!("{}svg/{}.svg", self.icon_base_url, entry.reference)
        } else {
            format!("{}png/{}.png", self.icon_base_url, entry.reference)
        }
    }

    async fn try_tier(&self, tier: IconTier, query: &IconQuery<'_>) -> Option<String> {
        match tier {
            IconTier::Override => self
                .icon_overrides
                .get(query.identifier)
                .map(|value| self.icon_url_for_value(value)),
            IconTier::LocalDirectory => self.local.read().await.find(query.lookup_name).map(str::to_string),
            IconTier::Catalog => {
                let reference = query.reference.filter(|r| !r.is_empty())?;
                let entries = self.icons.entries().await;
                entries
                    .iter()
                    .find(|e| e.reference == reference)
                    .map(|e| self.catalog_icon_url(e))
            }
            IconTier::Favicon => self.probe.favicon(query.service_url).await,
            IconTier::EmbeddedLink => self.probe.html_icon(query.service_url).await,
        }
    }
}
