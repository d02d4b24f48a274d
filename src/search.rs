//! Search provider adapter
//!
//! Queries a SearXNG-compatible JSON endpoint (`?q=...&format=json`) once per
//! derived query variant and folds the hits into an ordered, deduplicated
//! candidate list. Fails softly: network or parse errors yield no hits for
//! that query, so an empty candidate list is the uniform "nothing found"
//! signal for the flow.

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

use crate::models::Candidate;

/// User-Agent sent with search requests
const USER_AGENT: &str = "personfinder/0.1 (+https://github.com/personfinder)";

/// Upper bound on derived query variants per session
const MAX_QUERIES: usize = 5;

/// Search seam, mockable in flow tests
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Run every query and return ordered, deduplicated candidates
    async fn search(&self, queries: &[String]) -> Vec<Candidate>;
}

/// Derive search query variants from the submitted name and hints
///
/// The base query is the name plus hints; per-site variants widen coverage of
/// the common profile hosts. Bounded to `MAX_QUERIES` variants.
pub fn build_queries(query_name: &str, query_hints: &str) -> Vec<String> {
    let base = format!("{} {}", query_name.trim(), query_hints.trim())
        .trim()
        .to_string();
    if base.is_empty() {
        return Vec::new();
    }

    let mut queries = vec![base.clone()];
    for site in ["linkedin", "github", "twitter", "facebook"] {
        queries.push(format!("{} {}", base, site));
    }
    queries.truncate(MAX_QUERIES);
    queries
}

/// HTTP search client against the configured endpoint
#[derive(Clone)]
pub struct SearchClient {
    http_client: Client,
    endpoint: String,
    max_results: usize,
}

impl SearchClient {
    pub fn new(endpoint: String, max_results: usize, timeout: Duration) -> Self {
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
            endpoint,
            max_results,
        }
    }

    /// Run one query; errors are logged and collapse to an empty hit list
    async fn search_one(&self, query: &str) -> Vec<SearchHit> {
        debug!(query = %query, "Issuing search request");

        let response = match self
            .http_client
            .get(&self.endpoint)
            .query(&[("q", query), ("format", "json")])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(query = %query, error = %e, "Search request failed");
                return Vec::new();
            }
        };

        if !response.status().is_success() {
            warn!(
                query = %query,
                status = %response.status(),
                "Search endpoint returned error status"
            );
            return Vec::new();
        }

        match response.json::<SearchResponse>().await {
            Ok(parsed) => parsed.results,
            Err(e) => {
                warn!(query = %query, error = %e, "Failed to parse search response");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl SearchProvider for SearchClient {
    async fn search(&self, queries: &[String]) -> Vec<Candidate> {
        let mut hits = Vec::new();
        for query in queries {
            let mut batch = self.search_one(query).await;
            hits.append(&mut batch);
        }
        collect_candidates(hits, self.max_results)
    }
}

/// Fold raw hits into candidates: dedupe by URL, preserve order, truncate
fn collect_candidates(hits: Vec<SearchHit>, max_results: usize) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for hit in hits {
        let url = hit.url.trim().to_string();
        if url.is_empty() || !seen.insert(url.clone()) {
            continue;
        }
        candidates.push(Candidate {
            title: hit.title.unwrap_or_default(),
            url,
            snippet: hit.content.unwrap_or_default(),
        });
        if candidates.len() >= max_results {
            break;
        }
    }

    candidates
}

// ============================================================================
// Search endpoint response types (SearXNG JSON format)
// ============================================================================

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: Option<String>,
}
