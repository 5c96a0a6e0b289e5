//! Network probes against the service itself: favicon and HTML icon links

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use tracing::debug;
use url::Url;

use crate::error::Result;

/// Timeout for every probe request
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// `rel` values tried in order when scanning a page for icon links
const ICON_RELS: &[&str] = &["apple-touch-icon", "icon"];

static LINK_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<link\b[^>]*>").expect("valid link tag regex"));

static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)([a-z][a-z0-9_:-]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("valid attribute regex")
});

/// HTTP probes used by the last two tiers of the icon cascade
#[derive(Clone)]
pub struct IconProbe {
    http: reqwest::Client,
}

impl IconProbe {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder().timeout(PROBE_TIMEOUT).build()?;
        Ok(Self { http })
    }

    /// HEAD `url` and accept only `200` with an `image/*` content type
    pub async fn is_valid_image(&self, url: &str) -> bool {
        let resp = match self.http.head(url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                debug!(%url, error = %e, "Image probe failed");
                return false;
            }
        };
        let is_image = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("image/"));
        resp.status() == StatusCode::OK && is_image
    }

    /// `<origin>/favicon.ico` of the service, if it serves an image
    pub async fn favicon(&self, service_url: &str) -> Option<String> {
        let candidate = favicon_url(service_url)?;
        if self.is_valid_image(&candidate).await {
            Some(candidate)
        } else {
            None
        }
    }

    /// Icon advertised by `<link>` tags on the service's landing page
    ///
    /// Relative references are resolved against the URL reached after redirects.
    pub async fn html_icon(&self, service_url: &str) -> Option<String> {
        let resp = match self.http.get(service_url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                debug!(url = %service_url, error = %e, "HTML probe failed");
                return None;
            }
        };
        if resp.status() != StatusCode::OK {
            return None;
        }
        let final_url = resp.url().clone();
        let body = resp.text().await.ok()?;

        for rel in ICON_RELS {
            let Some(href) = find_link_href(&body, rel) else {
                continue;
            };
            let Ok(absolute) = final_url.join(&href) else {
                continue;
            };
            if self.is_valid_image(absolute.as_str()).await {
                return Some(absolute.into());
            }
        }
        None
    }
}

/// `scheme://host[:port]/favicon.ico` for a service URL
pub fn favicon_url(service_url: &str) -> Option<String> {
    let url = Url::parse(service_url).ok()?;
    let host = url.host_str()?;
    let origin = match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    };
    Some(format!("{}/favicon.ico", origin))
}

/// `href` of the first `<link>` whose `rel` equals `rel`
///
/// Only the first link with a matching `rel` is considered.
pub fn find_link_href(html: &str, rel: &str) -> Option<String> {
    for tag in LINK_TAG_RE.find_iter(html) {
        let mut tag_rel = None;
        let mut href = None;
        for caps in ATTR_RE.captures_iter(tag.as_str()) {
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| m.as_str());
            match caps[1].to_ascii_lowercase().as_str() {
                "rel" => tag_rel = value,
                "href" => href = value,
                _ => {}
            }
        }
        if tag_rel.is_some_and(|r| r.trim().eq_ignore_ascii_case(rel)) {
            return href.map(|h| h.trim().replace("&amp;", "&"));
        }
    }
    None
}
