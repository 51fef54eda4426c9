//! The fetch pipeline: validate, consult the cache, paginate, validate
//! records, persist.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheStats, CacheStore, ClearScope};
use crate::error::{FetchError, Result};
use crate::github::RepoSource;
use crate::model::{RawRepository, RepositoryRecord, Strictness, validate_all};
use crate::pagination::{PageEvent, Paginator};
use crate::progress::{FetchEvent, FetchPhase, ProgressCallback, emit};
use crate::rate_limit::RetryPolicy;
use crate::request::{FetchRequest, Fingerprint};
use crate::validation::{validate_cache_ttl, validate_request};

/// Default lifetime of a new cache entry.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3_600);

/// How a fetch uses the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheMode {
    /// Serve a live entry if there is one; store fresh results.
    #[default]
    Use,
    /// Skip the lookup but store fresh results.
    Refresh,
    /// Neither read nor write.
    Bypass,
}

impl CacheMode {
    #[inline]
    fn reads(self) -> bool {
        self == CacheMode::Use
    }

    #[inline]
    fn writes(self) -> bool {
        self != CacheMode::Bypass
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub mode: CacheMode,
    /// Lifetime given to entries written by this fetch.
    pub ttl: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            mode: CacheMode::Use,
            ttl: DEFAULT_CACHE_TTL,
        }
    }
}

impl CachePolicy {
    pub fn new(mode: CacheMode, ttl: Duration) -> Self {
        Self { mode, ttl }
    }
}

/// Records returned by [`RepoFetchService::fetch`].
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub records: Vec<RepositoryRecord>,
    pub from_cache: bool,
    pub fingerprint: Fingerprint,
}

/// Turns a [`FetchRequest`] into validated records, going to the network
/// only when the cache cannot answer.
pub struct RepoFetchService {
    source: Arc<dyn RepoSource>,
    cache: Option<CacheStore>,
    retry_policy: RetryPolicy,
    strictness: Strictness,
    on_progress: Option<ProgressCallback>,
}

impl RepoFetchService {
    /// `cache: None` disables caching entirely.
    pub fn new(source: Arc<dyn RepoSource>, cache: Option<CacheStore>) -> Self {
        Self {
            source,
            cache,
            retry_policy: RetryPolicy::default(),
            strictness: Strictness::default(),
            on_progress: None,
        }
    }

    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    #[must_use]
    pub fn with_strictness(mut self, strictness: Strictness) -> Self {
        self.strictness = strictness;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    pub fn cache(&self) -> Option<&CacheStore> {
        self.cache.as_ref()
    }

    /// Fetch the repositories described by `request`.
    ///
    /// Input is validated before anything else. Cache read and write
    /// failures are reported as warnings and never fail the fetch. Any
    /// classified error from the remote, after retries, fails the whole
    /// fetch and nothing is cached.
    pub async fn fetch(&self, request: &FetchRequest, policy: &CachePolicy) -> Result<FetchOutcome> {
        let subject = request.description();
        self.phase(FetchPhase::Start, &subject);
        self.phase(FetchPhase::CacheLookup, &subject);

        let owner = match validate_request(request).and_then(|owner| {
            validate_cache_ttl(policy.ttl)?;
            Ok(owner)
        }) {
            Ok(owner) => owner,
            Err(err) => return Err(self.fail(&subject, err)),
        };

        let fingerprint = request.fingerprint();

        if let Some(records) = self.lookup(&fingerprint, policy).await {
            tracing::debug!(%fingerprint, records = records.len(), "Serving from cache");
            self.phase(FetchPhase::CacheHit, &subject);
            self.emit(FetchEvent::Complete {
                total: records.len(),
                from_cache: true,
            });
            self.phase(FetchPhase::Done, &subject);
            return Ok(FetchOutcome {
                records,
                from_cache: true,
                fingerprint,
            });
        }
        self.phase(FetchPhase::CacheMiss, &subject);

        self.phase(FetchPhase::Fetching, &subject);
        let raws = match self.collect(request, owner).await {
            Ok(raws) => raws,
            Err(err) => return Err(self.fail(&subject, err)),
        };

        self.phase(FetchPhase::Validating, &subject);
        let records = match validate_all(raws, self.strictness) {
            Ok(records) => records,
            Err(err) => return Err(self.fail(&subject, err)),
        };

        if policy.mode.writes() && self.cache.is_some() {
            self.phase(FetchPhase::Persisting, &subject);
            self.persist(&fingerprint, &records, policy.ttl).await;
        }

        tracing::debug!(%fingerprint, records = records.len(), "Fetched from remote");
        self.emit(FetchEvent::Complete {
            total: records.len(),
            from_cache: false,
        });
        self.phase(FetchPhase::Done, &subject);

        Ok(FetchOutcome {
            records,
            from_cache: false,
            fingerprint,
        })
    }

    /// Remove cache entries.
    pub async fn clear_cache(&self, scope: ClearScope) -> Result<usize> {
        let cache = self.require_cache("clear_cache")?;
        let removed = cache.clear(scope).await?;
        tracing::debug!(removed, dir = %cache.dir().display(), "Cache cleared");
        Ok(removed)
    }

    pub async fn cache_stats(&self) -> Result<CacheStats> {
        self.require_cache("cache_stats")?.stats().await
    }

    /// Remove expired entries; returns how many were removed.
    pub async fn prune_cache(&self) -> Result<usize> {
        self.require_cache("prune_cache")?.prune_expired().await
    }

    fn require_cache(&self, operation: &str) -> Result<&CacheStore> {
        self.cache.as_ref().ok_or_else(|| {
            FetchError::configuration(operation, "caching is disabled; no cache directory configured")
        })
    }

    async fn lookup(&self, fingerprint: &Fingerprint, policy: &CachePolicy) -> Option<Vec<RepositoryRecord>> {
        let cache = self.cache.as_ref()?;
        if !policy.mode.reads() {
            return None;
        }

        match cache.get(fingerprint).await {
            Ok(hit) => hit,
            Err(err) => {
                tracing::warn!(%fingerprint, error = %err, "Cache read failed; fetching from remote");
                self.warn(format!("cache read failed: {}", err.user_message()));
                None
            }
        }
    }

    async fn persist(&self, fingerprint: &Fingerprint, records: &[RepositoryRecord], ttl: Duration) {
        let Some(cache) = &self.cache else {
            return;
        };
        if let Err(err) = cache.put(fingerprint, records, ttl).await {
            tracing::warn!(%fingerprint, error = %err, "Cache write failed; results not cached");
            self.warn(format!("cache write failed: {}", err.user_message()));
        }
    }

    async fn collect(&self, request: &FetchRequest, owner: &str) -> Result<Vec<RawRepository>> {
        let paginator = Paginator::new(request.limit, self.retry_policy.clone());
        let source = &self.source;

        let mut last_page = None;
        let on_event = |event: PageEvent| {
            let event = match event {
                PageEvent::Requesting { page } => FetchEvent::FetchingPage { page, last_page },
                PageEvent::Fetched {
                    page,
                    count,
                    total_so_far,
                    last_page: advertised,
                } => {
                    last_page = advertised.or(last_page);
                    FetchEvent::FetchedPage {
                        page,
                        count,
                        total_so_far,
                        last_page,
                    }
                }
                PageEvent::Retrying {
                    page,
                    attempt,
                    delay,
                    error,
                } => FetchEvent::RetryBackoff {
                    page,
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                    kind: error.kind(),
                    message: error.message().to_string(),
                },
            };
            self.emit(event);
        };

        match &request.search {
            None => {
                paginator
                    .collect(
                        |page, per_page| source.list_repos(owner, request.kind, page, per_page),
                        on_event,
                    )
                    .await
            }
            Some(filters) => {
                let query = filters.query(owner, request.kind);
                let sort = filters.sort;
                paginator
                    .collect(
                        |page, per_page| source.search_repos(&query, sort, page, per_page),
                        on_event,
                    )
                    .await
            }
        }
    }

    fn fail(&self, subject: &str, err: FetchError) -> FetchError {
        tracing::debug!(subject, kind = %err.kind(), error = %err, "Fetch failed");
        self.phase(FetchPhase::Failed, subject);
        err
    }

    fn phase(&self, phase: FetchPhase, subject: &str) {
        self.emit(FetchEvent::Phase {
            phase,
            subject: subject.to_string(),
        });
    }

    fn warn(&self, message: String) {
        self.emit(FetchEvent::Warning { message });
    }

    #[inline]
    fn emit(&self, event: FetchEvent) {
        emit(self.on_progress.as_ref(), event);
    }
}
