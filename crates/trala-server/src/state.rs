//! Shared server state

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};

use trala_core::{ConfigStatus, TralaConfig};
use trala_resolver::IconResolver;

use crate::aggregator::Aggregator;
use crate::error::Result;
use crate::traefik::TraefikClient;

/// Build metadata reported by `/api/status`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub version: String,
    pub commit: String,
    pub build_time: String,
}

impl VersionInfo {
    /// Package version plus `TRALA_COMMIT` / `TRALA_BUILD_TIME` captured at compile time
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            commit: option_env!("TRALA_COMMIT").unwrap_or("unknown").to_string(),
            build_time: option_env!("TRALA_BUILD_TIME").unwrap_or("unknown").to_string(),
        }
    }
}

pub struct AppState {
    pub config: Arc<TralaConfig>,
    pub config_status: ConfigStatus,
    pub resolver: Arc<IconResolver>,
    pub aggregator: Aggregator,
    pub traefik: TraefikClient,
    pub metrics: Option<PrometheusHandle>,
    pub version: VersionInfo,
}

impl AppState {
    pub fn new(config: TralaConfig, config_status: ConfigStatus) -> Result<Self> {
        let config = Arc::new(config);
        let resolver = Arc::new(IconResolver::new(&config)?);
        let aggregator = Aggregator::new(config.clone(), resolver.clone());
        let traefik = TraefikClient::new(&config.environment.traefik)?;

        Ok(Self {
            config,
            config_status,
            resolver,
            aggregator,
            traefik,
            metrics: None,
            version: VersionInfo::current(),
        })
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

pub type SharedState = Arc<AppState>;
