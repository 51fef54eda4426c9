//! Rate-limit detection and retry pacing.
//!
//! [`RateLimitSignal`] reads GitHub's quota headers off a response.
//! [`RateLimitGuard`] decides, per classified error, whether another attempt
//! is allowed and how long to wait first. [`with_retry`] ties the two
//! together around a single fallible operation.

use std::future::Future;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};
use chrono::{DateTime, Utc};

use crate::error::{ErrorKind, FetchError, Result};
use crate::http::{HttpHeaders, header_get};

/// Maximum retries per operation.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// First network backoff step, in milliseconds.
pub const INITIAL_BACKOFF_MS: u64 = 1_000;

/// Network backoff ceiling, in milliseconds.
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// Wait applied to a rate-limit error that carries no retry-after hint.
pub const RATE_LIMIT_FALLBACK_SECS: u64 = 60;

/// Longest rate-limit wait worth sleeping through; longer ones surface.
pub const MAX_RATE_LIMIT_WAIT_SECS: u64 = 900;

/// Rate-limit headers from one response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitSignal {
    /// `x-ratelimit-limit`
    pub limit: Option<u64>,
    /// `x-ratelimit-remaining`
    pub remaining: Option<u64>,
    /// `x-ratelimit-reset`, seconds since the Unix epoch.
    pub reset: Option<i64>,
    /// `retry-after`, in seconds.
    pub retry_after: Option<u64>,
}

impl RateLimitSignal {
    pub fn from_headers(headers: &HttpHeaders) -> Self {
        fn parse<T: std::str::FromStr>(headers: &HttpHeaders, name: &str) -> Option<T> {
            header_get(headers, name).and_then(|v| v.trim().parse().ok())
        }

        Self {
            limit: parse(headers, "x-ratelimit-limit"),
            remaining: parse(headers, "x-ratelimit-remaining"),
            reset: parse(headers, "x-ratelimit-reset"),
            retry_after: parse(headers, "retry-after"),
        }
    }

    /// True when the headers say the quota is spent or a wait was requested.
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.remaining == Some(0) || self.retry_after.is_some()
    }

    /// Seconds to wait: the explicit hint, else time until the quota resets.
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> Option<u64> {
        if self.retry_after.is_some() {
            return self.retry_after;
        }
        if self.remaining != Some(0) {
            return None;
        }
        self.reset
            .map(|reset| u64::try_from(reset - now.timestamp()).unwrap_or(0))
    }

    pub fn reset_at(&self) -> Option<DateTime<Utc>> {
        self.reset.and_then(|secs| DateTime::from_timestamp(secs, 0))
    }
}

/// Retry budget and pacing.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// First network backoff step.
    pub base_delay: Duration,
    /// Network backoff ceiling.
    pub max_delay: Duration,
    /// Multiplier between network backoff steps.
    pub factor: f32,
    /// Wait for rate-limit errors without a hint.
    pub rate_limit_fallback: Duration,
    /// Randomize network backoff steps.
    pub jitter: bool,
    /// Rate-limit waits above this fail immediately instead of sleeping.
    pub max_rate_limit_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_delay: Duration::from_millis(MAX_BACKOFF_MS),
            factor: 2.0,
            rate_limit_fallback: Duration::from_secs(RATE_LIMIT_FALLBACK_SECS),
            jitter: false,
            max_rate_limit_wait: Duration::from_secs(MAX_RATE_LIMIT_WAIT_SECS),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[cfg(test)]
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    #[cfg(test)]
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Build the exponential backoff used for network errors.
    #[must_use]
    pub fn backoff_builder(&self) -> ExponentialBuilder {
        let mut builder = ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(self.max_delay)
            .with_factor(self.factor)
            .with_max_times(self.max_retries as usize);

        if self.jitter {
            builder = builder.with_jitter();
        }

        builder
    }

    /// Fresh guard for one operation.
    #[must_use]
    pub fn guard(&self) -> RateLimitGuard {
        RateLimitGuard {
            backoff: self.backoff_builder().build(),
            policy: self.clone(),
            attempts: 0,
        }
    }
}

/// Per-operation retry state.
pub struct RateLimitGuard {
    policy: RetryPolicy,
    attempts: u32,
    backoff: ExponentialBackoff,
}

impl RateLimitGuard {
    /// Only throttling and network failures are worth another attempt.
    #[inline]
    pub fn is_retryable(err: &FetchError) -> bool {
        matches!(err.kind(), ErrorKind::RateLimit | ErrorKind::Network)
    }

    /// Delay before the next attempt, or `None` when the error must surface.
    ///
    /// A rate-limit wait longer than `max_rate_limit_wait` (a quota that
    /// resets in an hour, say) surfaces at once; the error keeps its
    /// `retry_after` for the caller to report.
    pub fn next_delay(&mut self, err: &FetchError) -> Option<Duration> {
        if !Self::is_retryable(err) || self.attempts >= self.policy.max_retries {
            return None;
        }

        let delay = match err.kind() {
            ErrorKind::RateLimit => {
                let wait = err
                    .context()
                    .retry_after
                    .map(Duration::from_secs)
                    .unwrap_or(self.policy.rate_limit_fallback);
                if wait > self.policy.max_rate_limit_wait {
                    tracing::debug!(
                        wait_secs = wait.as_secs(),
                        max_secs = self.policy.max_rate_limit_wait.as_secs(),
                        "Rate limit resets too far ahead, not waiting"
                    );
                    return None;
                }
                wait
            }
            _ => self.backoff.next()?,
        };

        self.attempts += 1;
        Some(delay)
    }

    /// Retries granted so far.
    #[inline]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Run `operation`, retrying rate-limit and network failures per `policy`.
///
/// `on_retry` is called with the error, the retry number (starting at 1) and
/// the delay before each sleep. When the budget is spent the last error is
/// returned unchanged in kind, with the attempt count recorded in its context.
pub async fn with_retry<T, F, Fut, N>(
    policy: &RetryPolicy,
    mut operation: F,
    mut on_retry: N,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    N: FnMut(&FetchError, u32, Duration),
{
    let mut guard = policy.guard();

    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        match guard.next_delay(&err) {
            Some(delay) => {
                tracing::debug!(
                    kind = %err.kind(),
                    attempt = guard.attempts(),
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retrying after failure"
                );
                on_retry(&err, guard.attempts(), delay);
                tokio::time::sleep(delay).await;
            }
            None if RateLimitGuard::is_retryable(&err) => {
                return Err(err.with_info("attempts", guard.attempts() + 1));
            }
            None => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::time::Instant;

    fn headers(pairs: &[(&str, &str)]) -> HttpHeaders {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn signal_parses_github_headers() {
        let signal = RateLimitSignal::from_headers(&headers(&[
            ("X-RateLimit-Limit", "5000"),
            ("X-RateLimit-Remaining", "0"),
            ("X-RateLimit-Reset", "1700000000"),
            ("Retry-After", "5"),
        ]));

        assert_eq!(signal.limit, Some(5000));
        assert_eq!(signal.remaining, Some(0));
        assert_eq!(signal.reset, Some(1_700_000_000));
        assert_eq!(signal.retry_after, Some(5));
        assert!(signal.is_exhausted());
        assert_eq!(
            signal.reset_at().map(|t| t.timestamp()),
            Some(1_700_000_000)
        );
    }

    #[test]
    fn signal_ignores_garbage_values() {
        let signal = RateLimitSignal::from_headers(&headers(&[
            ("x-ratelimit-remaining", "lots"),
            ("retry-after", "Wed, 21 Oct 2015 07:28:00 GMT"),
        ]));
        assert_eq!(signal, RateLimitSignal::default());
        assert!(!signal.is_exhausted());
    }

    #[test]
    fn retry_after_secs_prefers_hint_then_reset() {
        let now = Utc::now();
        let hinted = RateLimitSignal {
            retry_after: Some(7),
            remaining: Some(0),
            reset: Some(now.timestamp() + 100),
            ..RateLimitSignal::default()
        };
        assert_eq!(hinted.retry_after_secs(now), Some(7));

        let reset_only = RateLimitSignal {
            remaining: Some(0),
            reset: Some(now.timestamp() + 100),
            ..RateLimitSignal::default()
        };
        assert_eq!(reset_only.retry_after_secs(now), Some(100));

        let past_reset = RateLimitSignal {
            remaining: Some(0),
            reset: Some(now.timestamp() - 100),
            ..RateLimitSignal::default()
        };
        assert_eq!(past_reset.retry_after_secs(now), Some(0));

        let quota_left = RateLimitSignal {
            remaining: Some(10),
            reset: Some(now.timestamp() + 100),
            ..RateLimitSignal::default()
        };
        assert_eq!(quota_left.retry_after_secs(now), None);
    }

    #[test]
    fn policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(30));
        assert_eq!(policy.rate_limit_fallback, Duration::from_secs(60));
        assert!(!policy.jitter);
        assert_eq!(policy.max_rate_limit_wait, Duration::from_secs(900));
        assert_eq!(RetryPolicy::none().max_retries, 0);
    }

    #[test]
    fn guard_rejects_terminal_kinds() {
        let mut guard = RetryPolicy::default().guard();
        for err in [
            FetchError::authentication("op", "no"),
            FetchError::not_found("op", "no"),
            FetchError::validation("op", "no"),
            FetchError::configuration("op", "no"),
            FetchError::remote_api("op", "no"),
            FetchError::cache("op", "no"),
        ] {
            assert!(!RateLimitGuard::is_retryable(&err));
            assert_eq!(guard.next_delay(&err), None);
        }
        assert_eq!(guard.attempts(), 0);
    }

    #[test]
    fn guard_network_delays_grow_exponentially_and_cap() {
        let policy = RetryPolicy {
            max_retries: 6,
            ..RetryPolicy::default()
        };
        let mut guard = policy.guard();
        let err = FetchError::network("op", "reset");

        let delays: Vec<Duration> = std::iter::from_fn(|| guard.next_delay(&err)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
                Duration::from_secs(16),
                Duration::from_secs(30),
            ]
        );
        assert_eq!(guard.attempts(), 6);
    }

    #[test]
    fn guard_rate_limit_uses_hint_or_fallback() {
        let mut guard = RetryPolicy::default().guard();

        let hinted = FetchError::rate_limit("op", "slow").with_retry_after(Some(5));
        assert_eq!(guard.next_delay(&hinted), Some(Duration::from_secs(5)));

        let bare = FetchError::rate_limit("op", "slow");
        assert_eq!(guard.next_delay(&bare), Some(Duration::from_secs(60)));

        assert_eq!(guard.attempts(), 2);
    }

    #[test]
    fn guard_surfaces_rate_limit_waits_past_the_ceiling() {
        let mut guard = RetryPolicy {
            max_rate_limit_wait: Duration::from_secs(120),
            ..RetryPolicy::default()
        }
        .guard();

        let at_ceiling = FetchError::rate_limit("op", "slow").with_retry_after(Some(120));
        assert_eq!(guard.next_delay(&at_ceiling), Some(Duration::from_secs(120)));

        // quota reset an hour out
        let far = FetchError::rate_limit("op", "slow").with_retry_after(Some(3_600));
        assert_eq!(guard.next_delay(&far), None);
        assert_eq!(guard.attempts(), 1);

        let strict = RetryPolicy {
            max_rate_limit_wait: Duration::from_secs(30),
            ..RetryPolicy::default()
        };
        let bare = FetchError::rate_limit("op", "slow");
        assert_eq!(strict.guard().next_delay(&bare), None);
    }

    #[tokio::test(start_paused = true)]
    async fn with_retry_surfaces_distant_reset_without_sleeping() {
        let policy = RetryPolicy {
            max_rate_limit_wait: Duration::from_secs(60),
            ..RetryPolicy::default()
        };
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let err = with_retry(
            &policy,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(FetchError::rate_limit("op", "slow").with_retry_after(Some(3_600))) }
            },
            |_, _, _| {},
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::RateLimit);
        assert_eq!(err.context().retry_after, Some(3_600));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[test]
    fn guard_stops_after_budget() {
        let mut guard = RetryPolicy::default().with_max_retries(2).guard();
        let err = FetchError::rate_limit("op", "slow").with_retry_after(Some(1));

        assert!(guard.next_delay(&err).is_some());
        assert!(guard.next_delay(&err).is_some());
        assert_eq!(guard.next_delay(&err), None);
    }

    #[tokio::test(start_paused = true)]
    async fn with_retry_waits_for_retry_after_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_capture = Arc::clone(&calls);
        let mut retries = Vec::new();

        let start = Instant::now();
        let result = with_retry(
            &RetryPolicy::default(),
            || {
                let calls = Arc::clone(&calls_capture);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(FetchError::rate_limit("op", "slow").with_retry_after(Some(5)))
                    } else {
                        Ok(42u32)
                    }
                }
            },
            |err, attempt, delay| retries.push((err.kind(), attempt, delay)),
        )
        .await;

        assert_eq!(result.expect("second attempt succeeds"), 42);
        assert!(start.elapsed() >= Duration::from_secs(5));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            retries,
            vec![(ErrorKind::RateLimit, 1, Duration::from_secs(5))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn with_retry_surfaces_original_kind_after_exhaustion() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_capture = Arc::clone(&calls);

        let err = with_retry(
            &RetryPolicy::default(),
            || {
                let calls = Arc::clone(&calls_capture);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(FetchError::rate_limit("op", "slow").with_retry_after(Some(2)))
                }
            },
            |_, _, _| {},
        )
        .await
        .expect_err("budget exhausted");

        assert_eq!(err.kind(), ErrorKind::RateLimit);
        assert_eq!(err.context().retry_after, Some(2));
        assert_eq!(
            err.context().extra.get("attempts").map(String::as_str),
            Some("4")
        );
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn with_retry_does_not_retry_terminal_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_capture = Arc::clone(&calls);

        let err = with_retry(
            &RetryPolicy::default(),
            || {
                let calls = Arc::clone(&calls_capture);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(FetchError::not_found("op", "missing"))
                }
            },
            |_, _, _| panic!("terminal errors must not be retried"),
        )
        .await
        .expect_err("not found");

        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.context().extra.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
