//! GitHub REST API access over an [`HttpTransport`].
//!
//! Every non-success response is classified here, at the boundary, so the
//! rest of the pipeline only ever sees [`FetchError`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::{Cause, FetchError, Result, classify};
use crate::http::{HttpRequest, HttpResponse, HttpTransport};
use crate::model::RawRepository;
use crate::pagination::{Page, parse_link_header};
use crate::rate_limit::RateLimitSignal;
use crate::request::{OwnerKind, SearchSort};

/// Public GitHub API endpoint.
pub const GITHUB_API_URL: &str = "https://api.github.com";

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// The search endpoint refuses to page past this many results.
pub const SEARCH_RESULT_CAP: u32 = 1_000;

const API_VERSION: &str = "2022-11-28";

/// Paginated repository listings.
///
/// [`GitHubClient`] is the production implementation; tests can substitute
/// their own.
#[async_trait]
pub trait RepoSource: Send + Sync {
    /// One page of an owner's repositories.
    async fn list_repos(
        &self,
        owner: &str,
        kind: OwnerKind,
        page: u32,
        per_page: u32,
    ) -> Result<Page<RawRepository>>;

    /// One page of repository search results for a full `q` expression.
    async fn search_repos(
        &self,
        query: &str,
        sort: Option<SearchSort>,
        page: u32,
        per_page: u32,
    ) -> Result<Page<RawRepository>>;
}

/// Quota for one API resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitInfo {
    /// Resource name, e.g. `core` or `search`.
    pub resource: String,
    pub limit: u64,
    pub remaining: u64,
    pub used: u64,
    pub reset_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct RateLimitResponse {
    resources: std::collections::BTreeMap<String, RateLimitResource>,
}

#[derive(Debug, Deserialize)]
struct RateLimitResource {
    limit: u64,
    remaining: u64,
    #[serde(default)]
    used: u64,
    reset: i64,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    total_count: u64,
    #[serde(default)]
    incomplete_results: bool,
    #[serde(default)]
    items: Vec<RawRepository>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
}

/// GitHub API client.
#[derive(Clone)]
pub struct GitHubClient {
    transport: Arc<dyn HttpTransport>,
    api_url: String,
    token: Option<String>,
}

impl GitHubClient {
    /// Create a client backed by reqwest.
    ///
    /// Without a token the client is unauthenticated and limited to 60
    /// requests per hour.
    #[cfg(feature = "reqwest")]
    pub fn new(api_url: &str, token: Option<&str>, timeout: Duration) -> Result<Self> {
        use crate::http::reqwest_transport::ReqwestTransport;

        let transport = ReqwestTransport::with_timeout(timeout).map_err(|e| {
            FetchError::configuration("github.client", format!("HTTP client setup failed: {e}"))
        })?;
        Ok(Self::new_with_transport(api_url, token, Arc::new(transport)))
    }

    pub fn new_with_transport(
        api_url: &str,
        token: Option<&str>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            transport,
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    #[inline]
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Send a GET and classify anything but a 2xx response.
    async fn get(&self, path: &str, operation: &str, subject: &str) -> Result<HttpResponse> {
        let url = format!("{}{}", self.api_url, path);

        let mut request = HttpRequest::get(&url)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", concat!("repolens/", env!("CARGO_PKG_VERSION")))
            .header("X-GitHub-Api-Version", API_VERSION);
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| classify(e, operation).with_info("url", &url))?;

        if !response.is_success() {
            let cause = Cause::Status {
                status: response.status,
                message: format!("{subject}: {}", error_message(&response)),
                signal: RateLimitSignal::from_headers(&response.headers),
            };
            return Err(classify(cause, operation).with_info("url", &url));
        }

        Ok(response)
    }

    fn decode<T: DeserializeOwned>(response: &HttpResponse, operation: &str) -> Result<T> {
        serde_json::from_slice(&response.body)
            .map_err(|e| classify(e, operation).with_status(response.status))
    }

    /// Current quotas, sorted by resource name.
    pub async fn rate_limit(&self) -> Result<Vec<RateLimitInfo>> {
        let response = self.get("/rate_limit", "rate_limit", "quota lookup").await?;
        let body: RateLimitResponse = Self::decode(&response, "rate_limit")?;

        Ok(body
            .resources
            .into_iter()
            .map(|(resource, r)| RateLimitInfo {
                resource,
                limit: r.limit,
                remaining: r.remaining,
                used: r.used,
                reset_at: DateTime::from_timestamp(r.reset, 0).unwrap_or_else(Utc::now),
            })
            .collect())
    }
}

#[async_trait]
impl RepoSource for GitHubClient {
    async fn list_repos(
        &self,
        owner: &str,
        kind: OwnerKind,
        page: u32,
        per_page: u32,
    ) -> Result<Page<RawRepository>> {
        let owner_enc = urlencoding::encode(owner);
        let path = match kind {
            OwnerKind::User => format!(
                "/users/{owner_enc}/repos?type=owner&sort=updated&direction=desc&per_page={per_page}&page={page}"
            ),
            OwnerKind::Organization => format!(
                "/orgs/{owner_enc}/repos?type=all&sort=updated&direction=desc&per_page={per_page}&page={page}"
            ),
        };

        let subject = format!("{kind} '{owner}'");
        let response = self.get(&path, "list_repos", &subject).await?;
        let items: Vec<RawRepository> = Self::decode(&response, "list_repos")?;
        let (next_page, last_page) = page_links(&response, page, per_page, items.len());

        Ok(Page {
            items,
            next_page,
            last_page,
        })
    }

    async fn search_repos(
        &self,
        query: &str,
        sort: Option<SearchSort>,
        page: u32,
        per_page: u32,
    ) -> Result<Page<RawRepository>> {
        let mut path = format!(
            "/search/repositories?q={}&per_page={per_page}&page={page}",
            urlencoding::encode(query)
        );
        if let Some(sort) = sort {
            path.push_str(&format!("&sort={}&order=desc", sort.as_str()));
        }

        let subject = format!("search '{query}'");
        let response = self.get(&path, "search_repos", &subject).await?;
        let body: SearchResponse = Self::decode(&response, "search_repos")?;

        if body.incomplete_results {
            tracing::warn!(
                query,
                total_count = body.total_count,
                "Search results are incomplete; the API timed out collecting them"
            );
        }

        let (mut next_page, last_page) = page_links(&response, page, per_page, body.items.len());
        if page.saturating_mul(per_page) >= SEARCH_RESULT_CAP {
            next_page = None;
        }

        Ok(Page {
            items: body.items,
            next_page,
            last_page,
        })
    }
}

/// Next/last page from the `Link` header; without one, a full page implies more.
fn page_links(
    response: &HttpResponse,
    page: u32,
    per_page: u32,
    count: usize,
) -> (Option<u32>, Option<u32>) {
    match response.header("link") {
        Some(link) => {
            let info = parse_link_header(link);
            (info.next_page, info.last_page)
        }
        None => {
            let full = count > 0 && count >= per_page as usize;
            (full.then_some(page + 1), None)
        }
    }
}

/// Best human-readable message from an error response.
fn error_message(response: &HttpResponse) -> String {
    serde_json::from_slice::<ApiErrorBody>(&response.body)
        .ok()
        .and_then(|b| b.message)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| {
            let text = String::from_utf8_lossy(&response.body);
            let text = text.trim();
            if text.is_empty() {
                format!("HTTP {}", response.status)
            } else {
                text.chars().take(200).collect()
            }
        })
}
