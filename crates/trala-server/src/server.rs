//! Dashboard server implementation

use std::net::SocketAddr;
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;

use trala_core::{ConfigStatus, TralaConfig};

use crate::error::{Result, ServerError};
use crate::routes::create_router;
use crate::state::{AppState, SharedState};

pub struct TralaServer {
    state: SharedState,
    addr: SocketAddr,
}

impl TralaServer {
    pub fn new(state: AppState, addr: SocketAddr) -> Self {
        Self {
            state: Arc::new(state),
            addr,
        }
    }

    /// Fetch the catalogs and index local icons in the background
    pub fn spawn_warmup(&self) {
        let resolver = self.state.resolver.clone();
        tokio::spawn(async move {
            resolver.warm().await;
        });
    }

    /// Run the server
    pub async fn run(self) -> Result<()> {
        let router = create_router(self.state);

        tracing::info!("Starting dashboard server on {}", self.addr);

        let listener = TcpListener::bind(self.addr).await?;
        axum::serve(listener, router)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))?;

        Ok(())
    }

    /// Get the server state for testing
    pub fn state(&self) -> SharedState {
        self.state.clone()
    }
}

/// Builder for TralaServer
pub struct ServerBuilder {
    config: TralaConfig,
    config_status: ConfigStatus,
    addr: SocketAddr,
    metrics: Option<PrometheusHandle>,
    warm: bool,
}

impl ServerBuilder {
    pub fn new(config: TralaConfig, config_status: ConfigStatus) -> Self {
        Self {
            config,
            config_status,
            addr: ([127, 0, 0, 1], 8080).into(),
            metrics: None,
            warm: true,
        }
    }

    pub fn addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.addr = ([0, 0, 0, 0], port).into();
        self
    }

    pub fn metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Skip the background catalog warm-up (useful for testing)
    pub fn skip_warmup(mut self) -> Self {
        self.warm = false;
        self
    }

    pub fn build(self) -> Result<TralaServer> {
        let mut state = AppState::new(self.config, self.config_status)?;
        if let Some(handle) = self.metrics {
            state = state.with_metrics(handle);
        }

        let server = TralaServer::new(state, self.addr);
        if self.warm {
            server.spawn_warmup();
        }
        Ok(server)
    }
}
