//! HTTP routes for the dashboard backend

use axum::{
    extract::State,
    http::{Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

use trala_core::{
    assign_groups, is_valid_url, lookup_name, service_name_from_url, sort_by_priority, ConfigStatus,
    ResolvedService,
};

use crate::error::{Result, ServerError};
use crate::state::{SharedState, VersionInfo};

/// Settings the web client needs to render the dashboard
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrontendConfig {
    #[serde(rename = "searchEngineURL")]
    pub search_engine_url: String,
    #[serde(rename = "searchEngineIconURL")]
    pub search_engine_icon_url: String,
    pub refresh_interval_seconds: u64,
    pub grouping_enabled: bool,
    pub grouping_columns: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: VersionInfo,
    pub config: ConfigStatus,
    pub frontend: FrontendConfig,
}

/// Discover, enrich, group and order all services
async fn services(State(state): State<SharedState>) -> Result<Json<Vec<ResolvedService>>> {
    let entry_points = state.traefik.entry_points_by_name().await?;
    tracing::debug!(entry_points = entry_points.len(), "Fetched entry points");
    let records = state.traefik.routers().await?;
    tracing::debug!(routers = records.len(), "Fetched routers");

    let mut services = state
        .aggregator
        .aggregate(records, entry_points, &state.config.services.manual)
        .await;
    assign_groups(&mut services, &state.config.environment.grouping);
    sort_by_priority(&mut services);

    Ok(Json(services))
}

async fn status(State(state): State<SharedState>) -> Json<StatusResponse> {
    let env = &state.config.environment;

    Json(StatusResponse {
        version: state.version.clone(),
        config: state.config_status.clone(),
        frontend: FrontendConfig {
            search_engine_url: env.search_engine_url.clone(),
            search_engine_icon_url: search_engine_icon(&state).await,
            refresh_interval_seconds: env.refresh_interval_seconds,
            grouping_enabled: env.grouping.enabled,
            grouping_columns: env.grouping.columns,
        },
    })
}

/// Icon for the search engine, resolved like any other service
async fn search_engine_icon(state: &SharedState) -> String {
    let url = &state.config.environment.search_engine_url;
    if url.is_empty() {
        return String::new();
    }
    let Some(name) = service_name_from_url(url) else {
        return String::new();
    };
    let lookup = lookup_name(&name);
    let reference = state.resolver.resolve_reference(&lookup).await;
    state
        .resolver
        .resolve_icon(&name, url, &lookup, reference.as_deref())
        .await
}

async fn health(State(state): State<SharedState>) -> Result<&'static str> {
    let env = &state.config.environment;

    if env.traefik.api_host.is_empty() {
        return Err(ServerError::Unhealthy("Traefik API host is not set".into()));
    }
    if !is_valid_url(&env.search_engine_url) {
        return Err(ServerError::Unhealthy("Search Engine URL is invalid".into()));
    }
    if !is_valid_url(&env.selfhst_icon_url) {
        return Err(ServerError::Unhealthy("Selfhst Icon URL is invalid".into()));
    }

    state.traefik.health().await?;
    Ok("OK")
}

async fn metrics(State(state): State<SharedState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "Metrics recorder not installed").into_response(),
    }
}

/// Create the router with all routes
pub fn create_router(state: SharedState) -> Router {
    let icons = &state.config.environment.icons;
    let icon_files = ServeDir::new(&icons.directory);
    let icon_route = icons.route.trim_end_matches('/').to_string();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    let router = Router::new()
        .route("/api/services", get(services))
        .route("/api/status", get(status))
        .route("/api/health", get(health))
        .route("/metrics", get(metrics));

    let router = if icon_route.is_empty() {
        router.fallback_service(icon_files)
    } else {
        router.nest_service(&icon_route, icon_files)
    };

    router.layer(cors).with_state(state)
}
