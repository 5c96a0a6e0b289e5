//! Time-bounded caches for the remote icon and app-tag catalogs
//!
//! Each cache holds its entries sorted shortest-reference-first, which the
//! fuzzy matcher relies on. Readers take the read lock; on staleness they
//! take the write lock and re-check before fetching, so concurrent callers
//! never refresh the same catalog twice. After a failed refresh the cache
//! waits [`REFRESH_RETRY_BACKOFF`] before trying the network again.

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::counter;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::{info, warn};

use trala_core::fuzzy::sort_entries;
use trala_core::CatalogEntry;

use crate::error::{ResolverError, Result};

pub const ICON_CATALOG_TTL: Duration = Duration::from_secs(60 * 60);
pub const APP_TAGS_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Pause between a failed refresh and the next attempt
pub const REFRESH_RETRY_BACKOFF: Duration = Duration::from_secs(30);

/// User agent sent with every catalog request
pub const USER_AGENT: &str = "TraLa-Dashboard-App";

struct Snapshot<T> {
    entries: Arc<Vec<T>>,
    refreshed_at: Option<Instant>,
    failed_at: Option<Instant>,
}

impl<T> Snapshot<T> {
    /// An empty catalog is never considered fresh
    fn is_fresh(&self, ttl: Duration) -> bool {
        !self.entries.is_empty() && self.refreshed_at.is_some_and(|at| at.elapsed() < ttl)
    }

    /// Time left before another refresh may be attempted
    fn backoff_remaining(&self, backoff: Duration) -> Option<Duration> {
        let elapsed = self.failed_at?.elapsed();
        backoff.checked_sub(elapsed).filter(|left| !left.is_zero())
    }
}

/// One remote JSON catalog with its refresh policy
pub struct CatalogCache<T> {
    name: &'static str,
    url: String,
    ttl: Duration,
    retry_backoff: Duration,
    http: reqwest::Client,
    snapshot: RwLock<Snapshot<T>>,
}

impl<T> CatalogCache<T>
where
    T: CatalogEntry + DeserializeOwned + Send + Sync,
{
    pub fn new(name: &'static str, url: impl Into<String>, ttl: Duration, http: reqwest::Client) -> Self {
        Self {
            name,
            url: url.into(),
            ttl,
            retry_backoff: REFRESH_RETRY_BACKOFF,
            http,
            snapshot: RwLock::new(Snapshot {
                entries: Arc::new(Vec::new()),
                refreshed_at: None,
                failed_at: None,
            }),
        }
    }

    fn check_backoff(&self, snapshot: &Snapshot<T>) -> Result<()> {
        match snapshot.backoff_remaining(self.retry_backoff) {
            Some(left) => Err(ResolverError::RefreshBackoff {
                catalog: self.name,
                retry_in_secs: left.as_secs(),
            }),
            None => Ok(()),
        }
    }

    /// Fresh entries, refetching when the TTL has passed
    ///
    /// A failed refresh returns the error and leaves the previous entries in
    /// place; until the back-off has passed, callers get
    /// [`ResolverError::RefreshBackoff`] without a network request.
    pub async fn get_or_refresh(&self) -> Result<Arc<Vec<T>>> {
        {
            let snapshot = self.snapshot.read().await;
            if snapshot.is_fresh(self.ttl) {
                return Ok(snapshot.entries.clone());
            }
            self.check_backoff(&snapshot)?;
        }

        let mut snapshot = self.snapshot.write().await;
        if snapshot.is_fresh(self.ttl) {
            return Ok(snapshot.entries.clone());
        }
        self.check_backoff(&snapshot)?;

        info!(catalog = self.name, url = %self.url, "Refreshing catalog cache");
        match self.fetch().await {
            Ok(mut entries) => {
                sort_entries(&mut entries);
                snapshot.entries = Arc::new(entries);
                snapshot.refreshed_at = Some(Instant::now());
                snapshot.failed_at = None;
                counter!("trala_catalog_refresh_total", "catalog" => self.name, "status" => "ok").increment(1);
                info!(catalog = self.name, entries = snapshot.entries.len(), "Catalog cached");
                Ok(snapshot.entries.clone())
            }
            Err(e) => {
                snapshot.failed_at = Some(Instant::now());
                counter!("trala_catalog_refresh_total", "catalog" => self.name, "status" => "error").increment(1);
                Err(e)
            }
        }
    }

    /// Entries for lookups: fresh if possible, otherwise whatever is cached (possibly nothing)
    pub async fn entries(&self) -> Arc<Vec<T>> {
        match self.get_or_refresh().await {
            Ok(entries) => entries,
            Err(ResolverError::RefreshBackoff { .. }) => self.snapshot.read().await.entries.clone(),
            Err(e) => {
                let stale = self.snapshot.read().await.entries.clone();
                warn!(
                    catalog = self.name,
                    error = %e,
                    stale_entries = stale.len(),
                    "Catalog refresh failed, serving cached entries"
                );
                stale
            }
        }
    }

    async fn fetch(&self) -> Result<Vec<T>> {
        let resp = self
            .http
            .get(&self.url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(ResolverError::CatalogStatus {
                catalog: self.name,
                status: resp.status().as_u16(),
            });
        }

        Ok(resp.json::<Vec<T>>().await?)
    }
}
