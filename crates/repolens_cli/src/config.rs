//! Configuration file support for repolens.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (prefixed with `REPOLENS_`, sections separated by
//!    `__`, e.g. `REPOLENS_CACHE__TTL_SECS=600`)
//! 3. Local config file (./repolens.toml)
//! 4. User config file (~/.config/repolens/config.toml)
//! 5. Built-in defaults
//!
//! `GITHUB_TOKEN` is used when no token is configured anywhere else.
//!
//! Example config file:
//! ```toml
//! [github]
//! token = "ghp_..."  # or use REPOLENS_GITHUB__TOKEN / GITHUB_TOKEN
//! api_url = "https://api.github.com"
//! timeout_secs = 30
//!
//! [cache]
//! directory = "~/.cache/repolens"  # optional, this is the default
//! ttl_secs = 3600
//! enabled = true
//!
//! [retry]
//! max_retries = 3
//! base_delay_ms = 1000
//! max_delay_ms = 30000
//! rate_limit_fallback_secs = 60
//! jitter = false
//! max_rate_limit_wait_secs = 900  # longer waits fail with a rate limit error
//!
//! [limits]
//! default = 100
//! max = 10000
//!
//! [validation]
//! strict = false  # reject records whose timestamps predate created_at
//!
//! [output]
//! format = "table"
//! json_indent = 2
//! summary_languages = 5
//! ```

use std::path::PathBuf;
use std::time::Duration;

use config::builder::{ConfigBuilder as SourceBuilder, DefaultState};
use config::{Config as ConfigBuilder, ConfigError, Environment, File, FileFormat};
use directories::ProjectDirs;
use repolens::validation::{validate_cache_dir, validate_cache_ttl, validate_token};
use repolens::{FetchError, GITHUB_API_URL, RetryPolicy, Strictness};
use serde::Deserialize;

use crate::output::OutputFormat;

const APP_NAME: &str = "repolens";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub github: GitHubConfig,
    pub cache: CacheConfig,
    pub retry: RetryConfig,
    pub limits: LimitsConfig,
    pub validation: ValidationConfig,
    pub output: OutputConfig,
}

/// GitHub API access.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// Personal access token. Unauthenticated requests get 60 per hour.
    pub token: Option<String>,
    /// API base URL; point at `https://host/api/v3` for GitHub Enterprise.
    pub api_url: String,
    pub timeout_secs: u64,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: GITHUB_API_URL.to_string(),
            timeout_secs: 30,
        }
    }
}

/// Disk cache settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Defaults to the platform cache directory.
    pub directory: Option<PathBuf>,
    pub ttl_secs: u64,
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: None,
            ttl_secs: 3_600,
            enabled: true,
        }
    }
}

/// Retry pacing for throttled and failed requests.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Wait used when a rate-limit response carries no retry hint.
    pub rate_limit_fallback_secs: u64,
    /// Randomize network backoff steps.
    pub jitter: bool,
    /// Rate-limit resets further away than this are reported, not waited for.
    pub max_rate_limit_wait_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: repolens::rate_limit::DEFAULT_MAX_RETRIES,
            base_delay_ms: repolens::rate_limit::INITIAL_BACKOFF_MS,
            max_delay_ms: repolens::rate_limit::MAX_BACKOFF_MS,
            rate_limit_fallback_secs: repolens::rate_limit::RATE_LIMIT_FALLBACK_SECS,
            jitter: false,
            max_rate_limit_wait_secs: repolens::rate_limit::MAX_RATE_LIMIT_WAIT_SECS,
        }
    }
}

/// Item limits for fetch commands.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Used when `--limit` is not given.
    pub default: i64,
    /// Explicit limits are clamped to this.
    pub max: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            default: 100,
            max: 10_000,
        }
    }
}

/// Record validation.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Reject inconsistent timestamps instead of raising them to `created_at`.
    pub strict: bool,
}

/// Rendering defaults.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub json_indent: usize,
    /// Languages listed in the summary view.
    pub summary_languages: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Table,
            json_indent: 2,
            summary_languages: 5,
        }
    }
}

/// A config source that could not be read or parsed.
///
/// Built directly rather than through message heuristics: parse errors name
/// keys such as `github.timeout_secs`.
pub(crate) fn config_error(err: ConfigError) -> FetchError {
    FetchError::configuration("load_config", err.to_string())
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// Sources are loaded in order (later sources override earlier):
    /// 1. Built-in defaults
    /// 2. XDG config file (~/.config/repolens/config.toml)
    /// 3. Local config file (./repolens.toml)
    /// 4. Environment variables with REPOLENS_ prefix
    ///
    /// Unreadable or malformed sources fail as `ErrorKind::Configuration`.
    pub fn load() -> Result<Self, FetchError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = Self::default_config_path()
            && path.exists()
        {
            tracing::debug!("Loading config from {:?}", path);
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(false));
        }

        let local_config = PathBuf::from("repolens.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./repolens.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        builder = builder.add_source(Self::environment());

        let mut config = Self::from_builder(builder)?;
        if config.github.token.is_none() {
            config.github.token = std::env::var("GITHUB_TOKEN")
                .ok()
                .filter(|t| !t.trim().is_empty());
        }
        Ok(config)
    }

    fn from_builder(builder: SourceBuilder<DefaultState>) -> Result<Self, FetchError> {
        builder
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(config_error)
    }

    /// `REPOLENS_CACHE__TTL_SECS` -> `cache.ttl_secs`.
    fn environment() -> Environment {
        Environment::with_prefix("REPOLENS")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    /// Check values that would otherwise fail deep inside a fetch.
    pub fn validate(&self) -> Result<(), FetchError> {
        if self.github.timeout_secs == 0 {
            return Err(FetchError::configuration(
                "validate_config",
                "GitHub request timeout must be at least one second",
            )
            .with_field("github.timeout_secs", 0));
        }
        if let Some(token) = &self.github.token {
            validate_token(token)?;
        }
        validate_cache_ttl(self.cache_ttl())?;
        if let Some(dir) = &self.cache.directory {
            validate_cache_dir(&dir.to_string_lossy())?;
        }
        if self.limits.max == 0 {
            return Err(FetchError::configuration(
                "validate_config",
                "limits.max must be positive",
            )
            .with_field("limits.max", 0));
        }
        Ok(())
    }

    pub fn github_token(&self) -> Option<&str> {
        self.github.token.as_deref()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.github.timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    /// Configured cache directory, else the platform cache directory, else `.cache`.
    pub fn cache_dir(&self) -> PathBuf {
        self.cache
            .directory
            .clone()
            .or_else(Self::default_cache_dir)
            .unwrap_or_else(|| PathBuf::from(".cache"))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let base = Duration::from_millis(self.retry.base_delay_ms);
        RetryPolicy {
            max_retries: self.retry.max_retries,
            base_delay: base,
            max_delay: Duration::from_millis(self.retry.max_delay_ms).max(base),
            rate_limit_fallback: Duration::from_secs(self.retry.rate_limit_fallback_secs),
            jitter: self.retry.jitter,
            max_rate_limit_wait: Duration::from_secs(self.retry.max_rate_limit_wait_secs),
            ..RetryPolicy::default()
        }
    }

    pub fn strictness(&self) -> Strictness {
        if self.validation.strict {
            Strictness::Strict
        } else {
            Strictness::Lenient
        }
    }

    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// On Linux, `$XDG_CACHE_HOME/repolens` or `~/.cache/repolens`.
    pub fn default_cache_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.cache_dir().to_path_buf())
    }
}
