//! Client for the reverse proxy's admin API

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Response;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use trala_core::{EntryPoint, RoutingRecord, TraefikConfig};

use crate::error::{Result, ServerError};
use crate::metrics::{record_upstream_request, OUTCOME_ERROR, OUTCOME_OK};

pub const API_TIMEOUT: Duration = Duration::from_secs(5);

/// Pagination header; absent or `1` means the last page was reached
pub const NEXT_PAGE_HEADER: &str = "X-Next-Page";

pub const ENTRY_POINTS_PATH: &str = "/api/entrypoints";
pub const ROUTERS_PATH: &str = "/api/http/routers";

#[derive(Clone)]
pub struct TraefikClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Option<(String, String)>,
}

impl TraefikClient {
    pub fn new(config: &TraefikConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(API_TIMEOUT);
        if config.insecure_skip_verify {
            warn!("SSL certificate verification is disabled for proxy API connections");
            builder = builder.danger_accept_invalid_certs(true);
        }
        let http = builder.build().map_err(ServerError::Upstream)?;

        let credentials = config
            .enable_basic_auth
            .then(|| (config.basic_auth.username.clone(), config.basic_auth.password.clone()));

        Ok(Self {
            http,
            base_url: config.api_host.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Every item of a paginated list endpoint
    pub async fn fetch_all_pages<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, path))?;
        let mut items = Vec::new();

        loop {
            let resp = self.get(path, url.clone()).await?;
            let next_page = resp
                .headers()
                .get(NEXT_PAGE_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            let page: Vec<T> = resp.json().await.map_err(ServerError::UpstreamDecode)?;
            debug!(%path, page_items = page.len(), next_page = ?next_page, "Fetched page");
            items.extend(page);

            match next_page.as_deref() {
                None | Some("") | Some("1") => break,
                Some(page) => set_page(&mut url, page),
            }
        }

        Ok(items)
    }

    pub async fn entry_points(&self) -> Result<Vec<EntryPoint>> {
        self.fetch_all_pages(ENTRY_POINTS_PATH).await
    }

    pub async fn entry_points_by_name(&self) -> Result<HashMap<String, EntryPoint>> {
        Ok(self
            .entry_points()
            .await?
            .into_iter()
            .map(|ep| (ep.name.clone(), ep))
            .collect())
    }

    pub async fn routers(&self) -> Result<Vec<RoutingRecord>> {
        self.fetch_all_pages(ROUTERS_PATH).await
    }

    /// Reachability check against the entry point listing
    pub async fn health(&self) -> Result<()> {
        let url = Url::parse(&format!("{}{}", self.base_url, ENTRY_POINTS_PATH))?;
        self.get(ENTRY_POINTS_PATH, url).await?;
        Ok(())
    }

    async fn get(&self, endpoint: &str, url: Url) -> Result<Response> {
        let mut req = self.http.get(url.clone());
        if let Some((username, password)) = &self.credentials {
            req = req.basic_auth(username, Some(password));
        }

        let resp = match req.send().await {
            Ok(resp) => resp,
            Err(e) => {
                record_upstream_request(endpoint, OUTCOME_ERROR);
                return Err(ServerError::Upstream(e));
            }
        };

        if !resp.status().is_success() {
            record_upstream_request(endpoint, OUTCOME_ERROR);
            return Err(ServerError::UpstreamStatus {
                status: resp.status().as_u16(),
                url: url.to_string(),
            });
        }

        record_upstream_request(endpoint, OUTCOME_OK);
        Ok(resp)
    }
}

/// Replace (or add) the `page` query parameter
fn set_page(url: &mut Url, page: &str) {
    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "page")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(retained)
        .append_pair("page", page);
}
