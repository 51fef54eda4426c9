//! Classified errors for the fetch pipeline.
//!
//! Every failure that crosses a component boundary is a [`FetchError`]: one
//! [`ErrorKind`] plus an [`ErrorContext`] describing where it happened.
//! Raw transport, parse and I/O failures are turned into a `FetchError` by
//! [`classify`] at the call site that observed them.

use std::collections::BTreeMap;
use std::fmt;

use chrono::Utc;
use thiserror::Error;

use crate::http::HttpError;
use crate::rate_limit::RateLimitSignal;

/// The closed set of failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or rejected credential.
    Authentication,
    /// Remote throttling. Context carries `retry_after` when known.
    RateLimit,
    /// Owner or resource does not exist.
    NotFound,
    /// Connection, DNS or timeout failure.
    Network,
    /// Malformed input or payload.
    Validation,
    /// Invalid local settings.
    Configuration,
    /// Remote error status not covered by another kind.
    RemoteApi,
    /// Local cache read or write failure.
    Cache,
}

impl ErrorKind {
    /// Prefix used by [`FetchError::user_message`].
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Authentication => "Authentication Error",
            Self::RateLimit => "Rate Limit Error",
            Self::NotFound => "Not Found Error",
            Self::Network => "Network Error",
            Self::Validation => "Validation Error",
            Self::Configuration => "Configuration Error",
            Self::RemoteApi => "API Error",
            Self::Cache => "Cache Error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Where and why an error happened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// Operation label, e.g. `list_repos` or `cache.put`.
    pub operation: String,
    /// Offending field, for validation failures.
    pub field: Option<String>,
    /// Offending value, for validation failures.
    pub value: Option<String>,
    /// HTTP status code, when a response was received.
    pub status_code: Option<u16>,
    /// Seconds the remote asked us to wait.
    pub retry_after: Option<u64>,
    /// Free-form diagnostics.
    pub extra: BTreeMap<String, String>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            ..Self::default()
        }
    }

    #[inline]
    pub fn has_retry_info(&self) -> bool {
        self.retry_after.is_some()
    }
}

/// A classified error.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct FetchError {
    kind: ErrorKind,
    message: String,
    context: Box<ErrorContext>,
}

impl FetchError {
    pub fn new(kind: ErrorKind, operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: Box::new(ErrorContext::new(operation)),
        }
    }

    #[inline]
    pub fn authentication(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authentication, operation, message)
    }

    #[inline]
    pub fn rate_limit(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimit, operation, message)
    }

    #[inline]
    pub fn not_found(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, operation, message)
    }

    #[inline]
    pub fn network(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, operation, message)
    }

    #[inline]
    pub fn validation(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, operation, message)
    }

    #[inline]
    pub fn configuration(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, operation, message)
    }

    #[inline]
    pub fn remote_api(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RemoteApi, operation, message)
    }

    #[inline]
    pub fn cache(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cache, operation, message)
    }

    /// Attach the offending field and its value.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>, value: impl fmt::Display) -> Self {
        self.context.field = Some(field.into());
        self.context.value = Some(value.to_string());
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.context.status_code = Some(status);
        self
    }

    #[must_use]
    pub fn with_retry_after(mut self, seconds: Option<u64>) -> Self {
        self.context.retry_after = seconds;
        self
    }

    #[must_use]
    pub fn with_info(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.context.extra.insert(key.into(), value.to_string());
        self
    }

    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[inline]
    pub fn context(&self) -> &ErrorContext {
        &self.context
    }

    /// One-line message for display, prefixed with the kind.
    pub fn user_message(&self) -> String {
        match (self.kind, self.context.field.as_deref()) {
            (ErrorKind::Validation, Some(field)) => {
                format!("{} ({}): {}", self.kind.label(), field, self.message)
            }
            _ => format!("{}: {}", self.kind.label(), self.message),
        }
    }

    /// Actionable hint for the user, if one applies.
    pub fn tip(&self) -> Option<String> {
        let tip = match self.kind {
            ErrorKind::Authentication => {
                "Tip: Set GITHUB_TOKEN environment variable or use --token option".to_string()
            }
            ErrorKind::RateLimit => match self.context.retry_after {
                Some(secs) => format!(
                    "Tip: Wait {secs} seconds before trying again, or use a personal access token for higher limits"
                ),
                None => "Tip: Wait a few minutes before trying again, or use a personal access token for higher limits".to_string(),
            },
            ErrorKind::NotFound => {
                "Tip: Check the username or organization name is correct".to_string()
            }
            ErrorKind::Network => "Tip: Check your internet connection and try again".to_string(),
            ErrorKind::Validation => {
                let field = self.context.field.as_deref()?;
                format!("Tip: Check the {field} value is valid")
            }
            ErrorKind::Configuration => "Tip: Check your configuration settings".to_string(),
            ErrorKind::RemoteApi => {
                "Tip: Check the GitHub API status and try again later".to_string()
            }
            ErrorKind::Cache => {
                "Tip: Try clearing the cache with `repolens cache clear` or use --no-cache"
                    .to_string()
            }
        };
        Some(tip)
    }
}

/// Result type for fetch pipeline operations.
pub type Result<T> = std::result::Result<T, FetchError>;

/// Raw failure shapes observed at component boundaries.
#[derive(Debug)]
pub enum Cause {
    /// A response arrived with a non-success status.
    Status {
        status: u16,
        message: String,
        signal: RateLimitSignal,
    },
    /// No response arrived.
    Transport(HttpError),
    /// A body could not be parsed.
    Decode { message: String },
    /// Local filesystem failure.
    Io(std::io::Error),
    /// Anything else.
    Other { message: String },
}

impl From<HttpError> for Cause {
    fn from(err: HttpError) -> Self {
        Self::Transport(err)
    }
}

impl From<std::io::Error> for Cause {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for Cause {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode {
            message: err.to_string(),
        }
    }
}

/// Convert a raw failure into exactly one classified error.
///
/// Status codes are the strongest signal, then the failure shape, then the
/// message text. The `operation` label breaks the final tie between
/// configuration and validation failures.
pub fn classify(cause: impl Into<Cause>, operation: &str) -> FetchError {
    match cause.into() {
        Cause::Status {
            status,
            message,
            signal,
        } => classify_status(status, message, &signal, operation),
        Cause::Transport(err) => FetchError::network(operation, err.to_string()),
        Cause::Decode { message } => {
            FetchError::remote_api(operation, format!("malformed response: {message}"))
        }
        Cause::Io(err) => FetchError::cache(operation, err.to_string()),
        Cause::Other { message } => {
            let lower = message.to_ascii_lowercase();
            if lower.contains("timeout")
                || lower.contains("timed out")
                || lower.contains("connection")
            {
                FetchError::network(operation, message)
            } else if operation.to_ascii_lowercase().contains("config") {
                FetchError::configuration(operation, message)
            } else {
                FetchError::validation(operation, message)
            }
        }
    }
}

fn classify_status(
    status: u16,
    message: String,
    signal: &RateLimitSignal,
    operation: &str,
) -> FetchError {
    let mentions_rate_limit = message.to_ascii_lowercase().contains("rate limit");
    let err = match status {
        401 => FetchError::authentication(operation, message),
        403 if signal.is_exhausted() || mentions_rate_limit => {
            FetchError::rate_limit(operation, message)
                .with_retry_after(signal.retry_after_secs(Utc::now()))
        }
        403 => FetchError::authentication(operation, message),
        429 => FetchError::rate_limit(operation, message)
            .with_retry_after(signal.retry_after_secs(Utc::now())),
        404 => FetchError::not_found(operation, message),
        422 => FetchError::validation(operation, message),
        _ => FetchError::remote_api(operation, message),
    };
    let err = err.with_status(status);
    match signal.remaining {
        Some(remaining) => err.with_info("ratelimit_remaining", remaining),
        None => err,
    }
}
