//! Detail fetcher
//!
//! Best-effort enrichment of a confirmed candidate: one GET of the page,
//! crude `<title>` extraction. Every error path collapses to `None`;
//! enrichment never fails the session.

use async_trait::async_trait;
use reqwest::{header, Client};
use std::time::Duration;
use tracing::{debug, warn};

/// User-Agent for page fetches; some hosts reject requests without one
const USER_AGENT: &str = "Mozilla/5.0 (compatible; personfinder/0.1)";

/// Detail-fetch seam, mockable in flow tests
#[async_trait]
pub trait DetailFetcher: Send + Sync {
    /// Fetch the page title for a URL, or None on any failure
    async fn fetch_title(&self, url: &str) -> Option<String>;
}

/// HTTP page-title fetcher
#[derive(Clone)]
pub struct TitleFetcher {
    http_client: Client,
}

impl TitleFetcher {
    pub fn new(timeout: Duration) -> Self {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_static(USER_AGENT),
        );

        Self {
            http_client: Client::builder()
                .timeout(timeout)
                .default_headers(headers)
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl DetailFetcher for TitleFetcher {
    async fn fetch_title(&self, url: &str) -> Option<String> {
        debug!(url = %url, "Fetching page title");

        let response = match self.http_client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(url = %url, error = %e, "Title fetch failed");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(url = %url, status = %response.status(), "Title fetch got error status");
            return None;
        }

        let body = response.text().await.ok()?;
        extract_title(&body)
    }
}

/// Crude `<title>` extraction, case-insensitive, attribute-tolerant
fn extract_title(html: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let open = lower.find("<title")?;
    let start = html[open..].find('>').map(|i| open + i + 1)?;
    let end = lower[start..].find("</title>").map(|i| start + i)?;
    let title = html[start..end].trim();
    if title.is_empty() {
        None
    } else {
        Some(title.to_string())
    }
}
