//! trala-server: HTTP backend of the Trala dashboard
//!
//! Reads routers from the reverse proxy's admin API, enriches them with
//! icons and tags, groups them and serves the result as JSON.

pub mod aggregator;
pub mod error;
pub mod metrics;
pub mod routes;
pub mod server;
pub mod state;
pub mod traefik;

pub use aggregator::Aggregator;
pub use error::ServerError;
pub use routes::{create_router, FrontendConfig, StatusResponse};
pub use server::{ServerBuilder, TralaServer};
pub use state::{AppState, SharedState, VersionInfo};
pub use traefik::TraefikClient;
