//! Index of user-supplied icon files on disk

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use trala_core::fuzzy::{sort_names, FuzzyMatcher};

use crate::error::Result;

/// File extensions picked up by the scanner
pub const ICON_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "svg", "webp", "gif"];

/// Lowercase base filename -> URL path under the icon route
#[derive(Debug, Default, Clone)]
pub struct LocalIconIndex {
    icons: HashMap<String, String>,
    sorted_names: Vec<String>,
}

impl LocalIconIndex {
    /// Walk `dir` recursively and index every image file
    ///
    /// A missing directory yields an empty index. When two files share a
    /// base name the first one in walk order is kept.
    pub fn scan(dir: &Path, route: &str) -> Result<Self> {
        if !dir.is_dir() {
            debug!(dir = %dir.display(), "Icon directory not present, no local icons");
            return Ok(Self::default());
        }

        let route = route.trim_end_matches('/');
        let mut icons = HashMap::new();

        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => return Err(e.into()),
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable icon entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            if !ICON_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Ok(relative) = path.strip_prefix(dir) else {
                continue;
            };
            let relative: Vec<_> = relative.components().map(|c| c.as_os_str().to_string_lossy()).collect();

            icons
                .entry(stem.to_lowercase())
                .or_insert_with(|| format!("{}/{}", route, relative.join("/")));
        }

        let mut sorted_names: Vec<String> = icons.keys().cloned().collect();
        sort_names(&mut sorted_names);

        info!(dir = %dir.display(), icons = icons.len(), "Scanned local icon directory");
        Ok(Self { icons, sorted_names })
    }

    /// URL path of the best fuzzy match for `query`
    pub fn find(&self, query: &str) -> Option<&str> {
        let name = FuzzyMatcher::new().best_match(
            &query.to_lowercase(),
            self.sorted_names.iter().map(String::as_str),
        )?;
        self.icons.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.icons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.icons.is_empty()
    }
}
