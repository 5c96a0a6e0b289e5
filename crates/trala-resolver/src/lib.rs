//! trala-resolver: icon and tag lookup for dashboard services
//!
//! Combines two remote catalogs (icon index and app tags), a local icon
//! directory and probes against the services themselves. Catalog contents
//! are cached per TTL; the local directory is indexed on demand.

pub mod cache;
mod error;
mod local;
pub mod probe;
mod resolver;

pub use cache::{CatalogCache, APP_TAGS_TTL, ICON_CATALOG_TTL, REFRESH_RETRY_BACKOFF, USER_AGENT};
pub use error::{ResolverError, Result};
pub use local::{LocalIconIndex, ICON_EXTENSIONS};
pub use probe::IconProbe;
pub use resolver::{IconMatch, IconQuery, IconResolver, IconTier, CATALOG_TIMEOUT};
