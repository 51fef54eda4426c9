//! repolens - resilient GitHub repository fetching.
//!
//! This library turns a GitHub user or organization into a complete,
//! validated list of repository records. It respects rate limits, retries
//! transient failures and keeps a local disk cache with per-entry TTL.
//!
//! # Features
//!
//! - `reqwest` (default) - Enables [`GitHubClient::new`], backed by a real
//!   HTTP client. Without it, supply your own [`http::HttpTransport`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use repolens::{CachePolicy, CacheStore, FetchRequest, GitHubClient, ItemLimit, OwnerKind, RepoFetchService};
//!
//! let client = GitHubClient::new(repolens::GITHUB_API_URL, None, repolens::github::DEFAULT_TIMEOUT)?;
//! let service = RepoFetchService::new(Arc::new(client), Some(CacheStore::open(".cache")?));
//!
//! let request = FetchRequest::new("octocat", OwnerKind::User, ItemLimit::AtMost(10));
//! let outcome = service.fetch(&request, &CachePolicy::default()).await?;
//! println!("{} repositories (cached: {})", outcome.records.len(), outcome.from_cache);
//! ```

pub mod cache;
pub mod error;
pub mod filter;
pub mod github;
pub mod http;
pub mod model;
pub mod pagination;
pub mod progress;
pub mod rate_limit;
pub mod request;
pub mod service;
pub mod stats;
pub mod validation;

pub use cache::{CacheStats, CacheStore, ClearScope, Clock, SystemClock};
pub use error::{Cause, ErrorContext, ErrorKind, FetchError, Result, classify};
pub use filter::{RepoFilter, SortKey, Visibility, sort_records};
pub use github::{GITHUB_API_URL, GitHubClient, RateLimitInfo, RepoSource};
pub use model::{RawRepository, RepositoryRecord, Strictness};
pub use pagination::{Page, Paginator};
pub use progress::{FetchEvent, FetchPhase, ProgressCallback};
pub use rate_limit::{RateLimitGuard, RetryPolicy, with_retry};
pub use request::{FetchRequest, Fingerprint, ItemLimit, OwnerKind, SearchFilters, SearchSort};
pub use service::{CacheMode, CachePolicy, FetchOutcome, RepoFetchService};
pub use stats::{LanguageCount, RepoStats};
