//! Progress events emitted by [`RepoFetchService`](crate::service::RepoFetchService).
//!
//! The service never writes to a terminal. Whoever constructs it passes a
//! [`ProgressCallback`] and decides how events are rendered.

use std::fmt;

use crate::error::ErrorKind;

/// Stage of a single fetch invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchPhase {
    Start,
    CacheLookup,
    CacheHit,
    CacheMiss,
    Fetching,
    Validating,
    Persisting,
    Done,
    Failed,
}

impl FetchPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            FetchPhase::Start => "start",
            FetchPhase::CacheLookup => "cache_lookup",
            FetchPhase::CacheHit => "cache_hit",
            FetchPhase::CacheMiss => "cache_miss",
            FetchPhase::Fetching => "fetching",
            FetchPhase::Validating => "validating",
            FetchPhase::Persisting => "persisting",
            FetchPhase::Done => "done",
            FetchPhase::Failed => "failed",
        }
    }

    /// True for phases after which no further events are emitted.
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, FetchPhase::Done | FetchPhase::Failed)
    }
}

impl fmt::Display for FetchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress events emitted during a fetch.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum FetchEvent {
    /// The fetch entered a new phase.
    Phase {
        phase: FetchPhase,
        /// Human-readable request description, e.g. `user octocat (limit 5)`.
        subject: String,
    },

    /// About to request a page.
    FetchingPage {
        page: u32,
        /// Last page number, if a previous response advertised it.
        last_page: Option<u32>,
    },

    /// A page arrived.
    FetchedPage {
        page: u32,
        /// Number of repositories on this page.
        count: usize,
        /// Running total after truncation to the item limit.
        total_so_far: usize,
        last_page: Option<u32>,
    },

    /// Waiting before re-requesting a page.
    RetryBackoff {
        page: u32,
        /// Retry number, starting at 1.
        attempt: u32,
        delay_ms: u64,
        kind: ErrorKind,
        message: String,
    },

    /// Something went wrong that does not fail the fetch.
    Warning { message: String },

    /// Records were served or fetched.
    Complete {
        total: usize,
        from_cache: bool,
    },
}

/// Callback receiving progress events.
pub type ProgressCallback = Box<dyn Fn(FetchEvent) + Send + Sync>;

/// Emit a progress event if a callback is provided.
#[inline]
pub fn emit(on_progress: Option<&ProgressCallback>, event: FetchEvent) {
    if let Some(cb) = on_progress {
        cb(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn emit_without_callback_is_a_no_op() {
        emit(None, FetchEvent::Warning { message: "ignored".into() });
    }

    #[test]
    fn emit_delivers_events_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let callback: ProgressCallback = Box::new(move |event| {
            seen_clone.lock().unwrap().push(event);
        });

        emit(
            Some(&callback),
            FetchEvent::Phase {
                phase: FetchPhase::Start,
                subject: "user octocat".into(),
            },
        );
        emit(
            Some(&callback),
            FetchEvent::Complete {
                total: 2,
                from_cache: true,
            },
        );

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(matches!(
            seen[0],
            FetchEvent::Phase {
                phase: FetchPhase::Start,
                ..
            }
        ));
        assert!(matches!(seen[1], FetchEvent::Complete { total: 2, .. }));
    }

    #[test]
    fn terminal_phases() {
        assert!(FetchPhase::Done.is_terminal());
        assert!(FetchPhase::Failed.is_terminal());
        assert!(!FetchPhase::Persisting.is_terminal());
        assert_eq!(FetchPhase::CacheMiss.to_string(), "cache_miss");
    }
}
