//! End-to-end tests for the dashboard API
//!
//! A single axum "upstream" plays the proxy admin API (paginated, behind
//! basic auth), the icon and tag catalogs and a service favicon. The
//! dashboard router is served on loopback and queried with reqwest.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::Query;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpListener;

use trala_core::{ConfigStatus, ManualService, ServiceOverride, TralaConfig, DEFAULT_ICON_BASE_URL};
use trala_server::{create_router, AppState, SharedState};

// "admin:secret"
const AUTH: &str = "Basic YWRtaW46c2VjcmV0";

#[derive(Deserialize)]
struct PageQuery {
    page: Option<String>,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) == Some(AUTH)
}

async fn entrypoints(headers: HeaderMap) -> impl IntoResponse {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!([
        {"name": "web", "address": ":80"},
        {"name": "websecure", "address": ":443", "http": {"tls": {"certResolver": "le"}}},
        {"name": "traefik", "address": ":8080"}
    ]))
    .into_response()
}

async fn routers(headers: HeaderMap, Query(q): Query<PageQuery>) -> impl IntoResponse {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let (page, next) = match q.page.as_deref() {
        None => (
            json!([
                {"name": "websecure-grafana@docker", "rule": "Host(`grafana.lan`)", "priority": 10, "entryPoints": ["websecure"]},
                {"name": "sonarr@docker", "rule": "Host(`sonarr.lan`)", "priority": 6, "entryPoints": ["web"]},
                {"name": "traefik-api@internal", "rule": "Host(`proxy.lan`)", "priority": 1, "entryPoints": ["web"]}
            ]),
            "2",
        ),
        _ => (
            json!([
                {"name": "radarr@docker", "rule": "Host(`radarr.lan`) && PathPrefix(`/radarr/`)", "priority": 5, "entryPoints": ["web"], "tls": {}},
                {"name": "jellyfin@docker", "rule": "Host(`jellyfin.lan`)", "priority": 1, "entryPoints": ["web"]},
                {"name": "catchall@docker", "rule": "PathPrefix(`/`)", "priority": 1, "entryPoints": ["web"]}
            ]),
            "1",
        ),
    };
    ([("X-Next-Page", next)], Json(page)).into_response()
}

async fn icon_index() -> Json<Value> {
    Json(json!([
        {"Reference": "grafana", "SVG": "Yes", "PNG": "Yes"},
        {"Reference": "jellyfin", "SVG": "Yes", "PNG": "Yes"},
        {"Reference": "radarr", "SVG": "No", "PNG": "Yes"},
        {"Reference": "sonarr", "SVG": "No", "PNG": "Yes"}
    ]))
}

async fn app_tags() -> Json<Value> {
    Json(json!([
        {"reference": "grafana", "name": "Grafana", "tags": ["monitoring", "dashboard"]},
        {"reference": "jellyfin", "name": "Jellyfin", "tags": ["media"]},
        {"reference": "radarr", "name": "Radarr", "tags": ["media", "automation"]},
        {"reference": "sonarr", "name": "Sonarr", "tags": ["media", "automation"]}
    ]))
}

async fn spawn(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("Bind should succeed");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    addr
}

async fn spawn_upstream() -> SocketAddr {
    spawn(
        Router::new()
            .route("/api/entrypoints", get(entrypoints))
            .route("/api/http/routers", get(routers))
            .route("/catalog/index.json", get(icon_index))
            .route("/catalog/trala.json", get(app_tags))
            .route(
                "/favicon.ico",
                get(|| async { ([(header::CONTENT_TYPE, "image/x-icon")], "ico") }),
            ),
    )
    .await
}

/// Dashboard served against a fake upstream
struct TestHarness {
    base_url: String,
    upstream: SocketAddr,
    state: SharedState,
    http: Client,
    _icons: TempDir,
}

impl TestHarness {
    async fn new() -> Self {
        let upstream = spawn_upstream().await;
        Self::with_api_host(upstream, format!("http://{}", upstream)).await
    }

    async fn with_api_host(upstream: SocketAddr, api_host: String) -> Self {
        let icons = tempfile::tempdir().expect("tempdir");
        std::fs::write(icons.path().join("jellyfin.png"), b"\x89PNG").expect("write icon");

        let mut config = TralaConfig::default();
        config.version = "3.0".into();
        config.environment.search_engine_url = format!("http://{}/search?q=", upstream);
        config.environment.traefik.api_host = api_host;
        config.environment.traefik.enable_basic_auth = true;
        config.environment.traefik.basic_auth.username = "admin".into();
        config.environment.traefik.basic_auth.password = "secret".into();
        config.environment.icons.directory = icons.path().to_path_buf();
        config.environment.icons.catalog_index_url = format!("http://{}/catalog/index.json", upstream);
        config.environment.icons.app_tags_url = format!("http://{}/catalog/trala.json", upstream);
        config.services.exclude.routers = vec!["traefik-api".into()];
        config.services.overrides = vec![ServiceOverride {
            service: "grafana".into(),
            display_name: "Grafana".into(),
            ..Default::default()
        }];
        config.services.manual = vec![
            ManualService {
                name: "Docs".into(),
                url: "https://docs.example.com".into(),
                icon: "bookstack.svg".into(),
                ..Default::default()
            },
            ManualService {
                name: "Broken".into(),
                url: "docs".into(),
                ..Default::default()
            },
        ];
        config.finalize().expect("valid config");

        let status = ConfigStatus::check(&config.version, None);
        let state: SharedState = Arc::new(AppState::new(config, status).expect("state"));
        state.resolver.warm().await;

        let addr = spawn(create_router(state.clone())).await;

        Self {
            base_url: format!("http://{}", addr),
            upstream,
            state,
            http: Client::new(),
            _icons: icons,
        }
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.http
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .expect("request should succeed")
    }
}

#[tokio::test]
async fn test_services_end_to_end() {
    let harness = TestHarness::new().await;
    assert_eq!(harness.state.resolver.local_icon_count().await, 1);

    let resp = harness.get("/api/services").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let services: Vec<Value> = resp.json().await.expect("JSON body");

    let names: Vec<&str> = services.iter().map(|s| s["Name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["Docs", "Grafana", "sonarr", "radarr", "jellyfin"]);

    let by_name = |name: &str| services.iter().find(|s| s["Name"] == name).unwrap().clone();

    let docs = by_name("Docs");
    assert_eq!(docs["priority"], 50);
    assert_eq!(docs["icon"], format!("{}svg/bookstack.svg", DEFAULT_ICON_BASE_URL));
    assert_eq!(docs["group"], "");

    let grafana = by_name("Grafana");
    assert_eq!(grafana["url"], "https://grafana.lan");
    assert_eq!(grafana["icon"], format!("{}svg/grafana.svg", DEFAULT_ICON_BASE_URL));
    assert_eq!(grafana["tags"], json!(["monitoring", "dashboard"]));
    assert_eq!(grafana["group"], "");

    let radarr = by_name("radarr");
    assert_eq!(radarr["url"], "http://radarr.lan/radarr");
    assert_eq!(radarr["icon"], format!("{}png/radarr.png", DEFAULT_ICON_BASE_URL));
    assert_eq!(radarr["group"], "automation");
    assert_eq!(by_name("sonarr")["group"], "automation");

    let jellyfin = by_name("jellyfin");
    assert_eq!(jellyfin["icon"], "/icons/jellyfin.png");
    assert_eq!(jellyfin["group"], "media");
}

#[tokio::test]
async fn test_local_icons_are_served() {
    let harness = TestHarness::new().await;

    let resp = harness.get("/icons/jellyfin.png").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.bytes().await.unwrap().as_ref(), b"\x89PNG");

    assert_eq!(harness.get("/icons/missing.png").await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_status_end_to_end() {
    let harness = TestHarness::new().await;

    let resp = harness.get("/api/status").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let status: Value = resp.json().await.expect("JSON body");

    assert_eq!(status["config"]["configVersion"], "3.0");
    assert_eq!(status["config"]["isCompatible"], true);
    assert_eq!(status["version"]["version"], env!("CARGO_PKG_VERSION"));

    let frontend = &status["frontend"];
    assert_eq!(frontend["searchEngineURL"], format!("http://{}/search?q=", harness.upstream));
    assert_eq!(frontend["searchEngineIconURL"], format!("http://{}/favicon.ico", harness.upstream));
    assert_eq!(frontend["refreshIntervalSeconds"], 30);
    assert_eq!(frontend["groupingEnabled"], true);
    assert_eq!(frontend["groupingColumns"], 3);
}

#[tokio::test]
async fn test_health_end_to_end() {
    let harness = TestHarness::new().await;

    let resp = harness.get("/api/health").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_unreachable_proxy_is_bad_gateway() {
    let upstream = spawn_upstream().await;
    let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let closed_addr = closed.local_addr().unwrap();
    drop(closed);

    let harness = TestHarness::with_api_host(upstream, format!("http://{}", closed_addr)).await;

    assert_eq!(harness.get("/api/services").await.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(harness.get("/api/health").await.status(), StatusCode::BAD_GATEWAY);
}
