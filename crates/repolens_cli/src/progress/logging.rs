use repolens::{FetchEvent, FetchPhase};

/// Logging reporter using tracing for structured output.
pub struct LoggingReporter;

impl LoggingReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, event: FetchEvent) {
        match event {
            FetchEvent::Phase { phase, subject } => match phase {
                FetchPhase::Start => tracing::info!(subject = %subject, "Fetching repositories"),
                FetchPhase::CacheHit => {
                    tracing::info!(subject = %subject, "Cache hit - loaded from local cache")
                }
                FetchPhase::CacheMiss => tracing::debug!(subject = %subject, "Cache miss"),
                FetchPhase::Failed => tracing::debug!(subject = %subject, "Fetch failed"),
                phase => tracing::debug!(subject = %subject, phase = %phase, "Fetch phase"),
            },

            FetchEvent::FetchingPage { page, last_page } => {
                tracing::debug!(page, last_page = ?last_page, "Requesting page");
            }

            FetchEvent::FetchedPage {
                page,
                count,
                total_so_far,
                last_page,
            } => {
                tracing::debug!(page, count, total_so_far, last_page = ?last_page, "Fetched page");
            }

            FetchEvent::RetryBackoff {
                page,
                attempt,
                delay_ms,
                kind,
                message,
            } => {
                tracing::warn!(
                    page,
                    attempt,
                    retry_after_ms = delay_ms,
                    kind = %kind,
                    error = %message,
                    "Request failed, backing off"
                );
            }

            FetchEvent::Warning { message } => {
                tracing::warn!(message = %message, "Warning");
            }

            FetchEvent::Complete { total, from_cache } => {
                tracing::info!(total, from_cache, "Fetch complete");
            }

            _ => {}
        }
    }
}

impl Default for LoggingReporter {
    fn default() -> Self {
        Self::new()
    }
}
