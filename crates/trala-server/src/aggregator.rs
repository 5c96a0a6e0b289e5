//! Turns routing records into display-ready services
//!
//! Each record is processed on its own task; at most `max_concurrency`
//! records are enriched at once. Results arrive in completion order.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};

use trala_core::{
    display_name_from_router, is_valid_url, lookup_name, reconstruct_url, EntryPoint, ExclusionRules,
    ManualService, ResolvedService, RoutingRecord, TralaConfig, DEFAULT_MANUAL_PRIORITY,
};
use trala_resolver::IconResolver;

use crate::metrics::{record_aggregation, record_manual_services};

#[derive(Clone)]
pub struct Aggregator {
    config: Arc<TralaConfig>,
    resolver: Arc<IconResolver>,
    exclusions: Arc<ExclusionRules>,
    semaphore: Arc<Semaphore>,
    admin_api_url: Option<String>,
}

impl Aggregator {
    pub fn new(config: Arc<TralaConfig>, resolver: Arc<IconResolver>) -> Self {
        let exclusions = ExclusionRules::new(&config.services.exclude);
        let semaphore = Semaphore::new(config.environment.icons.max_concurrency.max(1));
        let admin_api_url = config.admin_api_url();
        Self {
            config,
            resolver,
            exclusions: Arc::new(exclusions),
            semaphore: Arc::new(semaphore),
            admin_api_url,
        }
    }

    /// Enrich every record, then append the manual services
    ///
    /// Records that cannot be turned into a service are dropped; nothing
    /// here fails the whole aggregation.
    pub async fn aggregate(
        &self,
        records: Vec<RoutingRecord>,
        entry_points: HashMap<String, EntryPoint>,
        manual: &[ManualService],
    ) -> Vec<ResolvedService> {
        let start = Instant::now();
        let record_count = records.len();
        let entry_points = Arc::new(entry_points);

        let this = self.clone();
        let mut services = self
            .fan_out(records, move |record| {
                let this = this.clone();
                let entry_points = entry_points.clone();
                async move { this.process_record(&record, &entry_points).await }
            })
            .await;
        let discovered = services.len();

        services.extend(self.manual_services(manual).await);

        record_aggregation(record_count, discovered, start.elapsed());
        info!(
            routers = record_count,
            discovered,
            manual = services.len() - discovered,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Aggregated services"
        );
        services
    }

    /// Run `work` on its own task per item, at most `max_concurrency` at once
    ///
    /// A worker that panics or yields nothing loses only its own item.
    async fn fan_out<T, F, Fut>(&self, items: Vec<T>, work: F) -> Vec<ResolvedService>
    where
        T: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<ResolvedService>> + Send + 'static,
    {
        let count = items.len();
        let work = Arc::new(work);
        let (tx, mut rx) = mpsc::channel(count.max(1));

        for item in items {
            let semaphore = self.semaphore.clone();
            let work = work.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return;
                };
                if let Some(service) = work(item).await {
                    let _ = tx.send(service).await;
                }
            });
        }
        drop(tx);

        let mut services = Vec::with_capacity(count);
        while let Some(service) = rx.recv().await {
            services.push(service);
        }
        services
    }

    /// Pipeline for a single routing record
    pub async fn process_record(
        &self,
        record: &RoutingRecord,
        entry_points: &HashMap<String, EntryPoint>,
    ) -> Option<ResolvedService> {
        let naming = &self.config.environment.naming;
        let router_name = naming.router_name(&record.name, &record.entry_points);

        let Some(url) = reconstruct_url(record, entry_points) else {
            debug!(router = %router_name, rule = %record.rule, "Could not reconstruct URL, skipping router");
            return None;
        };

        if self.exclusions.is_router_excluded(&router_name) {
            debug!(router = %router_name, "Excluding router");
            return None;
        }
        if self.exclusions.is_entry_point_excluded(&record.entry_points) {
            debug!(router = %router_name, "Excluding router due to entry point exclusion");
            return None;
        }
        if self.admin_api_url.as_deref() == Some(url.as_str()) {
            debug!(router = %router_name, "Excluding the proxy's own API");
            return None;
        }

        let name = match self.config.display_name_override(&router_name) {
            Some(name) => name.to_string(),
            None => display_name_from_router(&router_name),
        };
        debug!(router = %router_name, display = %name, %url, "Processing router");

        let lookup = lookup_name(&name);
        let reference = self.resolver.resolve_reference(&lookup).await;
        let icon = self
            .resolver
            .resolve_icon(&router_name, &url, &lookup, reference.as_deref())
            .await;
        let tags = self.resolver.resolve_tags(&router_name, reference.as_deref()).await;
        let group = self.config.group_override(&router_name).unwrap_or_default().to_string();

        Some(ResolvedService {
            name,
            url,
            priority: record.priority,
            icon,
            tags,
            group,
        })
    }

    /// Validate and enrich manually declared services
    pub async fn manual_services(&self, manual: &[ManualService]) -> Vec<ResolvedService> {
        let mut services = Vec::with_capacity(manual.len());

        for entry in manual {
            if !is_valid_url(&entry.url) {
                warn!(service = %entry.name, url = %entry.url, "Invalid URL for manual service, skipping");
                continue;
            }

            let lookup = lookup_name(&entry.name);
            let reference = self.resolver.resolve_reference(&lookup).await;
            let icon = if entry.icon.is_empty() {
                self.resolver
                    .resolve_icon(&entry.name, &entry.url, &lookup, reference.as_deref())
                    .await
            } else {
                self.resolver.icon_url_for_value(&entry.icon)
            };
            let tags = self.resolver.resolve_tags(&entry.name, reference.as_deref()).await;
            let priority = if entry.priority == 0 {
                DEFAULT_MANUAL_PRIORITY
            } else {
                entry.priority
            };

            debug!(service = %entry.name, url = %entry.url, %icon, priority, group = %entry.group, "Added manual service");
            services.push(ResolvedService {
                name: entry.name.clone(),
                url: entry.url.clone(),
                priority,
                icon,
                tags,
                group: entry.group.clone(),
            });
        }

        record_manual_services(services.len(), manual.len() - services.len());
        services
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use axum::http::header;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use tokio::net::TcpListener;
    use trala_core::{ExcludeConfig, ServiceOverride, DEFAULT_ICON_BASE_URL};

    async fn serve_catalogs() -> SocketAddr {
        let router = Router::new()
            .route(
                "/index.json",
                get(|| async {
                    Json(json!([
                        {"Reference": "grafana", "SVG": "Yes"},
                        {"Reference": "jellyfin", "SVG": "Yes"},
                        {"Reference": "radarr", "SVG": "No"},
                        {"Reference": "sonarr", "SVG": "No"}
                    ]))
                }),
            )
            .route(
                "/tags.json",
                get(|| async {
                    Json(json!([
                        {"reference": "grafana", "tags": ["monitoring"]},
                        {"reference": "jellyfin", "tags": ["media"]},
                        {"reference": "radarr", "tags": ["media", "automation"]},
                        {"reference": "sonarr", "tags": ["media", "automation"]}
                    ]))
                }),
            );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });
        addr
    }

    fn config(addr: SocketAddr) -> TralaConfig {
        let mut config = TralaConfig::default();
        config.environment.traefik.api_host = "traefik:8080".into();
        config.environment.icons.catalog_index_url = format!("http://{}/index.json", addr);
        config.environment.icons.app_tags_url = format!("http://{}/tags.json", addr);
        config.environment.icons.directory = "/nonexistent/trala-icons".into();
        config.environment.icons.max_concurrency = 2;
        config.services.exclude = ExcludeConfig {
            routers: vec!["traefik-api".into(), "api*".into()],
            entrypoints: vec!["internal".into()],
        };
        config.services.overrides = vec![ServiceOverride {
            service: "jellyfin".into(),
            display_name: "JellyFin".into(),
            group: "Streaming".into(),
            ..Default::default()
        }];
        config.finalize().unwrap();
        config
    }

    fn aggregator(config: TralaConfig) -> Aggregator {
        let resolver = IconResolver::new(&config).unwrap();
        Aggregator::new(Arc::new(config), Arc::new(resolver))
    }

    fn entry_points() -> HashMap<String, EntryPoint> {
        [("web", ":80"), ("websecure", ":443"), ("internal", ":8000"), ("traefik", ":8080")]
            .into_iter()
            .map(|(name, address)| {
                let mut ep = EntryPoint {
                    name: name.into(),
                    address: address.into(),
                    ..Default::default()
                };
                if name == "websecure" {
                    ep.http.tls = Some(json!({"certResolver": "le"}));
                }
                (name.to_string(), ep)
            })
            .collect()
    }

    fn record(name: &str, rule: &str, entry_point: &str, priority: i64) -> RoutingRecord {
        RoutingRecord {
            name: name.into(),
            rule: rule.into(),
            priority,
            entry_points: vec![entry_point.into()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_process_record_pipeline() {
        let agg = aggregator(config(serve_catalogs().await));
        let svc = agg
            .process_record(
                &record("websecure-grafana@docker", "Host(`grafana.lan`)", "websecure", 10),
                &entry_points(),
            )
            .await
            .unwrap();

        assert_eq!(svc.name, "grafana");
        assert_eq!(svc.url, "https://grafana.lan");
        assert_eq!(svc.priority, 10);
        assert_eq!(svc.icon, format!("{}svg/grafana.svg", DEFAULT_ICON_BASE_URL));
        assert_eq!(svc.tags, vec!["monitoring"]);
        assert_eq!(svc.group, "");
    }

    #[tokio::test]
    async fn test_overrides_applied() {
        let agg = aggregator(config(serve_catalogs().await));
        let svc = agg
            .process_record(&record("jellyfin@file", "Host(`tv.lan`)", "web", 1), &entry_points())
            .await
            .unwrap();

        assert_eq!(svc.name, "JellyFin");
        assert_eq!(svc.group, "Streaming");
        assert_eq!(svc.tags, vec!["media"]);
    }

    #[tokio::test]
    async fn test_aggregate_drops_excluded_and_unparseable() {
        let agg = aggregator(config(serve_catalogs().await));
        let records = vec![
            record("sonarr@docker", "Host(`sonarr.lan`)", "web", 5),
            record("radarr@docker", "Host(`radarr.lan`) && PathPrefix(`/radarr/`)", "websecure", 5),
            record("traefik-api@internal", "Host(`proxy.lan`)", "web", 1),
            record("api-gateway@docker", "Host(`gw.lan`)", "web", 1),
            record("metrics@docker", "Host(`metrics.lan`)", "internal", 1),
            record("dashboard@internal", "Host(`traefik`) && PathPrefix(`/api`)", "traefik", 1),
            record("catchall@docker", "PathPrefix(`/`)", "web", 1),
            record("ghost@docker", "Host(`ghost.lan`)", "missing", 1),
        ];

        let mut services = agg.aggregate(records, entry_points(), &[]).await;
        services.sort_by(|a, b| a.name.cmp(&b.name));
        let urls: Vec<_> = services.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(urls, vec!["https://radarr.lan/radarr", "http://sonarr.lan"]);
    }

    #[tokio::test]
    async fn test_router_without_rule_is_dropped() {
        let agg = aggregator(config(serve_catalogs().await));
        let records: Vec<RoutingRecord> = serde_json::from_value(json!([
            {"name": "sonarr@docker", "rule": "Host(`sonarr.lan`)", "entryPoints": ["web"]},
            {"name": "tcp-ish@file", "entryPoints": ["web"]}
        ]))
        .unwrap();

        let services = agg.aggregate(records, entry_points(), &[]).await;
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].url, "http://sonarr.lan");
    }

    #[derive(Default)]
    struct InFlight {
        current: AtomicUsize,
        peak: AtomicUsize,
        total: AtomicUsize,
    }

    async fn serve_favicons(in_flight: Arc<InFlight>) -> SocketAddr {
        let router = Router::new().route(
            "/favicon.ico",
            get(move || {
                let in_flight = in_flight.clone();
                async move {
                    let now = in_flight.current.fetch_add(1, Ordering::SeqCst) + 1;
                    in_flight.peak.fetch_max(now, Ordering::SeqCst);
                    in_flight.total.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    in_flight.current.fetch_sub(1, Ordering::SeqCst);
                    ([(header::CONTENT_TYPE, "image/x-icon")], Vec::<u8>::new())
                }
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });
        addr
    }

    #[tokio::test]
    async fn test_fan_out_respects_max_concurrency() {
        let agg = aggregator(config(serve_catalogs().await));
        let in_flight = Arc::new(InFlight::default());
        let service_addr = serve_favicons(in_flight.clone()).await;

        let mut eps = entry_points();
        eps.insert(
            "lan".into(),
            EntryPoint {
                name: "lan".into(),
                address: format!(":{}", service_addr.port()),
                ..Default::default()
            },
        );
        // names that match no catalog entry, so every record falls through to the favicon probe
        let records: Vec<_> = (1..=6)
            .map(|i| record(&format!("wx{}@docker", i), "Host(`127.0.0.1`)", "lan", 1))
            .collect();

        let services = agg.aggregate(records, eps, &[]).await;

        assert_eq!(services.len(), 6);
        let favicon = format!("http://127.0.0.1:{}/favicon.ico", service_addr.port());
        assert!(services.iter().all(|s| s.icon == favicon));
        assert_eq!(in_flight.total.load(Ordering::SeqCst), 6);
        let peak = in_flight.peak.load(Ordering::SeqCst);
        assert!((1..=2).contains(&peak), "peak in-flight probes was {}", peak);
    }

    #[tokio::test]
    async fn test_panicking_worker_loses_only_its_item() {
        let agg = aggregator(config(serve_catalogs().await));
        let services = agg
            .fan_out((1..=5).collect::<Vec<i64>>(), |n| async move {
                if n == 3 {
                    panic!("worker {} failed", n);
                }
                Some(ResolvedService {
                    name: format!("svc{}", n),
                    priority: n,
                    ..Default::default()
                })
            })
            .await;

        let mut priorities: Vec<_> = services.iter().map(|s| s.priority).collect();
        priorities.sort();
        assert_eq!(priorities, vec![1, 2, 4, 5]);
    }

    #[tokio::test]
    async fn test_manual_services() {
        let agg = aggregator(config(serve_catalogs().await));
        let manual = vec![
            ManualService {
                name: "Docs".into(),
                url: "https://docs.example.com".into(),
                icon: "BookStack.svg".into(),
                priority: 0,
                group: "Reference".into(),
            },
            ManualService {
                name: "Sonarr".into(),
                url: "https://sonarr.example.com".into(),
                priority: 7,
                ..Default::default()
            },
            ManualService {
                name: "Broken".into(),
                url: "not-a-url".into(),
                ..Default::default()
            },
        ];

        let services = agg.manual_services(&manual).await;
        assert_eq!(services.len(), 2);

        assert_eq!(services[0].priority, DEFAULT_MANUAL_PRIORITY);
        assert_eq!(services[0].icon, format!("{}svg/bookstack.svg", DEFAULT_ICON_BASE_URL));
        assert_eq!(services[0].group, "Reference");

        assert_eq!(services[1].priority, 7);
        assert_eq!(services[1].icon, format!("{}png/sonarr.png", DEFAULT_ICON_BASE_URL));
        assert_eq!(services[1].tags, vec!["media", "automation"]);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let agg = aggregator(config(serve_catalogs().await));
        assert!(agg.aggregate(Vec::new(), HashMap::new(), &[]).await.is_empty());
    }
}
