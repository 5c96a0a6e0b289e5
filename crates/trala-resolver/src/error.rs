//! Resolver error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResolverError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Catalog {catalog} returned status {status}")]
    CatalogStatus { catalog: &'static str, status: u16 },

    #[error("Catalog {catalog} refresh failed recently, retrying in {retry_in_secs}s")]
    RefreshBackoff { catalog: &'static str, retry_in_secs: u64 },

    #[error("Icon directory scan failed: {0}")]
    Scan(#[from] walkdir::Error),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, ResolverError>;
