//! Page-by-page collection with per-page retries.

use std::future::Future;
use std::time::Duration;

use crate::error::{FetchError, Result};
use crate::rate_limit::{RetryPolicy, with_retry};
use crate::request::ItemLimit;

/// One page of results plus where to go next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Next page number, if the remote says there is one.
    pub next_page: Option<u32>,
    /// Last page number, when known.
    pub last_page: Option<u32>,
}

#[cfg(test)]
impl<T> Page<T> {
    pub fn new(items: Vec<T>, next_page: Option<u32>) -> Self {
        Self {
            items,
            next_page,
            last_page: None,
        }
    }
}

/// Pagination info parsed from a `Link` header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkPagination {
    pub next_page: Option<u32>,
    pub last_page: Option<u32>,
}

/// Parse an RFC 8288 `Link` header as GitHub sends it.
///
/// ```text
/// <https://api.github.com/user/1/repos?page=2>; rel="next", <https://api.github.com/user/1/repos?page=5>; rel="last"
/// ```
pub fn parse_link_header(link_header: &str) -> LinkPagination {
    let mut info = LinkPagination::default();

    for part in link_header.split(',') {
        let mut url = None;
        let mut rel = None;

        for segment in part.split(';') {
            let segment = segment.trim();
            if let Some(inner) = segment.strip_prefix('<').and_then(|s| s.strip_suffix('>')) {
                url = Some(inner);
            } else if let Some(rel_value) = segment.strip_prefix("rel=") {
                rel = Some(rel_value.trim_matches('"'));
            }
        }

        if let (Some(url), Some(rel)) = (url, rel)
            && let Some(page) = extract_page_from_url(url)
        {
            match rel {
                "next" => info.next_page = Some(page),
                "last" => info.last_page = Some(page),
                _ => {}
            }
        }
    }

    info
}

/// Extract the `page` query parameter from a URL.
fn extract_page_from_url(url: &str) -> Option<u32> {
    let (_, query) = url.split_once('?')?;
    query
        .split('&')
        .find_map(|param| param.strip_prefix("page="))
        .and_then(|value| value.parse().ok())
}

/// What the paginator is doing, for progress reporting.
#[derive(Debug, Clone)]
pub enum PageEvent {
    Requesting {
        page: u32,
    },
    Fetched {
        page: u32,
        count: usize,
        total_so_far: usize,
        last_page: Option<u32>,
    },
    Retrying {
        page: u32,
        attempt: u32,
        delay: Duration,
        error: FetchError,
    },
}

/// Drives sequential page fetches into one ordered list.
#[derive(Debug, Clone)]
pub struct Paginator {
    limit: ItemLimit,
    policy: RetryPolicy,
}

impl Paginator {
    pub fn new(limit: ItemLimit, policy: RetryPolicy) -> Self {
        Self { limit, policy }
    }

    #[inline]
    pub fn per_page(&self) -> u32 {
        self.limit.per_page()
    }

    /// Fetch pages from 1 until the remote runs out or the limit is reached.
    ///
    /// `fetch_page` receives `(page, per_page)`. A retryable failure repeats
    /// the same page; any other failure discards everything collected so far.
    pub async fn collect<T, F, Fut, E>(&self, mut fetch_page: F, mut on_event: E) -> Result<Vec<T>>
    where
        F: FnMut(u32, u32) -> Fut,
        Fut: Future<Output = Result<Page<T>>>,
        E: FnMut(PageEvent),
    {
        let per_page = self.per_page();
        let mut items: Vec<T> = Vec::new();
        let mut page = 1u32;

        loop {
            on_event(PageEvent::Requesting { page });

            let fetched = with_retry(
                &self.policy,
                || fetch_page(page, per_page),
                |err, attempt, delay| {
                    on_event(PageEvent::Retrying {
                        page,
                        attempt,
                        delay,
                        error: err.clone(),
                    })
                },
            )
            .await?;

            let count = fetched.items.len();
            items.extend(fetched.items);

            let limit_reached = self.limit.is_reached(items.len());
            if let ItemLimit::AtMost(max) = self.limit {
                items.truncate(max);
            }

            on_event(PageEvent::Fetched {
                page,
                count,
                total_so_far: items.len(),
                last_page: fetched.last_page,
            });

            if limit_reached || count == 0 {
                break;
            }
            match fetched.next_page {
                Some(next) if next > page => page = next,
                _ => break,
            }
        }

        Ok(items)
    }
}
