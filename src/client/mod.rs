use anyhow::{ensure, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("retries exhausted after {attempts} attempts (last HTTP status {last_status})")]
    RetriesExhausted { attempts: u32, last_status: u16 },
    #[error("unexpected response shape: {0}")]
    Payload(String),
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub mailto: String,
    pub api_key: Option<String>,
    pub per_page: usize,
}

impl ApiConfig {
    pub fn new(
        base_url: impl Into<String>,
        mailto: impl Into<String>,
        api_key: Option<String>,
        per_page: usize,
    ) -> Result<Self> {
        let mailto = mailto.into();
        ensure!(
            !mailto.trim().is_empty(),
            "a contact email is required for the polite pool"
        );
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            mailto,
            api_key,
            per_page,
        })
    }
}

/// Retry and pacing knobs shared by every request this process issues.
#[derive(Debug, Clone)]
pub struct RequestPolicy {
    pub max_attempts: u32,
    /// Fixed politeness delay after every successful request.
    pub request_delay: Duration,
    /// Wait before retrying a 5xx or transport error.
    pub transient_wait: Duration,
    /// Wait for a 429 without a Retry-After header.
    pub rate_limit_wait: Duration,
    pub timeout: Duration,
}

impl Default for RequestPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            request_delay: Duration::from_millis(200),
            transient_wait: Duration::from_secs(2),
            rate_limit_wait: Duration::from_secs(5),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorksQuery {
    /// OpenAlex filter expression, e.g. `cited_by:W123` or
    /// `authorships.institutions.lineage:i123,publication_year:2024`.
    pub filter: String,
    pub select: Option<String>,
}

#[derive(Debug)]
pub struct PageHarvest {
    pub results: Vec<Value>,
    /// Successful page requests issued (retries not counted).
    pub pages_fetched: u32,
}

#[derive(Debug, Deserialize)]
struct PageResponse {
    results: Vec<Value>,
    meta: Option<PageMeta>,
}

#[derive(Debug, Deserialize)]
struct PageMeta {
    next_cursor: Option<String>,
}

pub struct OpenAlexClient {
    http: Client,
    config: ApiConfig,
    policy: RequestPolicy,
}

impl OpenAlexClient {
    pub fn new(config: ApiConfig, policy: RequestPolicy) -> Result<Self> {
        let http = Client::builder().timeout(policy.timeout).build()?;
        Ok(Self {
            http,
            config,
            policy,
        })
    }

    fn common_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("mailto".to_string(), self.config.mailto.clone())];
        if let Some(key) = &self.config.api_key {
            params.push(("api_key".to_string(), key.clone()));
        }
        params
    }

    /// Walk the cursor across every page of a works query and return the
    /// concatenated result set. Terminates on a null/absent next cursor or an
    /// empty page; any page that exhausts the retry budget aborts the whole
    /// harvest so a dropped page is never mistaken for end-of-results.
    pub async fn fetch_all_pages(&self, query: &WorksQuery) -> Result<PageHarvest, FetchError> {
        let url = format!("{}/works", self.config.base_url);
        let mut params = self.common_params();
        params.push(("filter".to_string(), query.filter.clone()));
        if let Some(select) = &query.select {
            params.push(("select".to_string(), select.clone()));
        }
        params.push(("per-page".to_string(), self.config.per_page.to_string()));
        let cursor_slot = params.len();
        params.push(("cursor".to_string(), "*".to_string()));

        let mut results = Vec::new();
        let mut pages_fetched = 0u32;

        loop {
            let body = self.get_json(&url, &params).await?;
            pages_fetched += 1;
            let page: PageResponse =
                serde_json::from_value(body).map_err(|e| FetchError::Payload(e.to_string()))?;
            debug!(
                page = pages_fetched,
                records = page.results.len(),
                "fetched page"
            );
            if page.results.is_empty() {
                break;
            }
            results.extend(page.results);
            match page.meta.and_then(|m| m.next_cursor) {
                Some(next) => params[cursor_slot].1 = next,
                None => break,
            }
        }

        Ok(PageHarvest {
            results,
            pages_fetched,
        })
    }

    /// Single-resource fetch, e.g. `works/doi:10.1/x` or `funders/F123`.
    pub async fn fetch_one(&self, path: &str, select: Option<&str>) -> Result<Value, FetchError> {
        let url = format!("{}/{}", self.config.base_url, path);
        let mut params = self.common_params();
        if let Some(select) = select {
            params.push(("select".to_string(), select.to_string()));
        }
        self.get_json(&url, &params).await
    }

    /// Fetch an absolute URL with no extra parameters. Used for the auxiliary
    /// registries (ROR, Crossref, GeoNames), which share the retry policy and
    /// pacing but not the OpenAlex query surface.
    pub async fn get_json_url(&self, url: &str) -> Result<Value, FetchError> {
        self.get_json(url, &[]).await
    }

    async fn get_json(&self, url: &str, params: &[(String, String)]) -> Result<Value, FetchError> {
        let mut last_status = 0u16;

        for attempt in 0..self.policy.max_attempts {
            let response = match self.http.get(url).query(params).send().await {
                Ok(response) => response,
                Err(e) => {
                    if attempt + 1 == self.policy.max_attempts {
                        return Err(e.into());
                    }
                    warn!(
                        "request error, retrying in {:?}: {}",
                        self.policy.transient_wait, e
                    );
                    tokio::time::sleep(self.policy.transient_wait).await;
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                let body: Value = response.json().await?;
                tokio::time::sleep(self.policy.request_delay).await;
                return Ok(body);
            }

            last_status = status.as_u16();
            if status.as_u16() == 429 {
                let wait = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(Duration::from_secs)
                    .unwrap_or(self.policy.rate_limit_wait);
                warn!("rate limited, waiting {:?}", wait);
                tokio::time::sleep(wait).await;
            } else if status.as_u16() >= 500 {
                warn!(
                    "HTTP {} from {}, retrying in {:?}",
                    status, url, self.policy.transient_wait
                );
                tokio::time::sleep(self.policy.transient_wait).await;
            } else {
                let body = response.text().await.unwrap_or_default();
                return Err(FetchError::Status {
                    status: status.as_u16(),
                    body,
                });
            }
        }

        Err(FetchError::RetriesExhausted {
            attempts: self.policy.max_attempts,
            last_status,
        })
    }
}
