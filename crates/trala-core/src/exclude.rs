//! Router and entry point exclusion by glob pattern

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::model::ExcludeConfig;

/// Compiled exclusion patterns
///
/// `*` and `?` never match across `/`. Invalid patterns are logged and ignored.
#[derive(Debug, Clone)]
pub struct ExclusionRules {
    routers: GlobSet,
    entry_points: GlobSet,
}

impl ExclusionRules {
    pub fn new(config: &ExcludeConfig) -> Self {
        Self {
            routers: compile(&config.routers, "exclude.routers"),
            entry_points: compile(&config.entrypoints, "exclude.entrypoints"),
        }
    }

    pub fn is_router_excluded(&self, router_name: &str) -> bool {
        self.routers.is_match(router_name)
    }

    /// True when any of the router's entry points matches a pattern
    pub fn is_entry_point_excluded(&self, entry_points: &[String]) -> bool {
        entry_points.iter().any(|ep| {
            let excluded = self.entry_points.is_match(ep);
            if excluded {
                tracing::debug!(entry_point = %ep, "Entry point matched exclusion pattern");
            }
            excluded
        })
    }
}

impl Default for ExclusionRules {
    fn default() -> Self {
        Self::new(&ExcludeConfig::default())
    }
}

fn compile(patterns: &[String], setting: &str) -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        match GlobBuilder::new(pattern).literal_separator(true).build() {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(e) => {
                tracing::warn!(%setting, %pattern, error = %e, "Invalid exclude pattern, ignoring");
            }
        }
    }
    builder.build().unwrap_or_else(|e| {
        tracing::warn!(%setting, error = %e, "Could not compile exclude patterns");
        GlobSet::empty()
    })
}
