use std::sync::Arc;

use repolens::validation::{validate_language, validate_min_forks, validate_min_stars, validate_visibility};
use repolens::{
    CacheMode, CachePolicy, CacheStore, FetchError, GitHubClient, ItemLimit, OwnerKind, RepoFetchService,
    RepoFilter, RepoStats, RepositoryRecord, Visibility,
};

use crate::ViewOptions;
use crate::config::Config;
use crate::error::CliError;
use crate::output::{self, OutputFormat};
use crate::progress::ProgressReporter;

pub(crate) fn build_client(config: &Config) -> Result<GitHubClient, FetchError> {
    let client = GitHubClient::new(&config.github.api_url, config.github_token(), config.timeout())?;
    if !client.is_authenticated() {
        tracing::debug!("No GitHub token configured, requests are unauthenticated");
    }
    Ok(client)
}

/// Open the configured cache, or `None` when caching is disabled.
pub(crate) fn open_cache(config: &Config) -> Result<Option<CacheStore>, FetchError> {
    if !config.cache.enabled {
        return Ok(None);
    }
    CacheStore::open(config.cache_dir()).map(Some)
}

/// Service for fetch commands, reporting progress to the terminal.
///
/// An unusable cache directory degrades to uncached fetching.
pub(crate) fn fetch_service(config: &Config) -> Result<(RepoFetchService, Arc<ProgressReporter>), FetchError> {
    let client = build_client(config)?;
    let cache = match open_cache(config) {
        Ok(cache) => cache,
        Err(e) => {
            tracing::warn!("Cache unavailable, continuing without it: {}", e.user_message());
            None
        }
    };

    let reporter = Arc::new(ProgressReporter::new());
    let service = RepoFetchService::new(Arc::new(client), cache)
        .with_retry_policy(config.retry_policy())
        .with_strictness(config.strictness())
        .with_progress(reporter.as_callback());
    Ok((service, reporter))
}

pub(crate) fn cache_policy(config: &Config, refresh: bool) -> CachePolicy {
    let mode = if !config.cache.enabled {
        CacheMode::Bypass
    } else if refresh {
        CacheMode::Refresh
    } else {
        CacheMode::Use
    };
    CachePolicy::new(mode, config.cache_ttl())
}

/// `--limit`, else the configured default, clamped to `limits.max`.
pub(crate) fn resolve_limit(limit: Option<i64>, config: &Config) -> Result<ItemLimit, FetchError> {
    Ok(ItemLimit::from_raw(limit.unwrap_or(config.limits.default))?.clamp(config.limits.max))
}

/// Post-fetch filter from the view flags.
pub(crate) fn build_filter(view: &ViewOptions) -> Result<RepoFilter, FetchError> {
    validate_visibility(view.public_only, view.private_only)?;

    Ok(RepoFilter {
        language: view
            .language
            .as_deref()
            .map(validate_language)
            .transpose()?
            .flatten()
            .map(str::to_string),
        min_stars: view.min_stars.map(validate_min_stars).transpose()?,
        min_forks: view.min_forks.map(validate_min_forks).transpose()?,
        visibility: Visibility::from_flags(view.public_only, view.private_only),
    })
}

/// Render records in `format` and write them to stdout.
pub(crate) fn emit(
    records: &[RepositoryRecord],
    owner: &str,
    kind: OwnerKind,
    format: OutputFormat,
    config: &Config,
) -> Result<(), CliError> {
    let text = match format {
        OutputFormat::Table => output::render_table(records, owner, kind),
        OutputFormat::Json => output::render_json(records, config.output.json_indent)?,
        OutputFormat::Summary => output::render_summary(
            &RepoStats::from_records(records),
            owner,
            kind,
            config.output.summary_languages,
        ),
    };
    output::print(&text)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use repolens::ErrorKind;

    fn view() -> ViewOptions {
        ViewOptions {
            language: None,
            min_stars: None,
            min_forks: None,
            public_only: false,
            private_only: false,
            sort: None,
            output: None,
        }
    }

    #[test]
    fn cache_policy_follows_flags() {
        let mut config = Config::default();
        assert_eq!(cache_policy(&config, false).mode, CacheMode::Use);
        assert_eq!(cache_policy(&config, true).mode, CacheMode::Refresh);

        config.cache.enabled = false;
        assert_eq!(cache_policy(&config, true).mode, CacheMode::Bypass);
        assert_eq!(cache_policy(&config, false).ttl, config.cache_ttl());
    }

    #[test]
    fn resolve_limit_uses_default_and_clamps() {
        let mut config = Config::default();
        config.limits.max = 50;

        assert_eq!(resolve_limit(None, &config).unwrap(), ItemLimit::AtMost(50));
        assert_eq!(resolve_limit(Some(7), &config).unwrap(), ItemLimit::AtMost(7));
        assert_eq!(resolve_limit(Some(-1), &config).unwrap(), ItemLimit::Unbounded);
        assert_eq!(
            resolve_limit(Some(0), &config).unwrap_err().kind(),
            ErrorKind::Validation
        );
    }

    #[test]
    fn build_filter_trims_and_validates() {
        let mut opts = view();
        opts.language = Some("  Rust ".into());
        opts.min_stars = Some(10);
        opts.private_only = true;

        let filter = build_filter(&opts).unwrap();
        assert_eq!(filter.language.as_deref(), Some("Rust"));
        assert_eq!(filter.min_stars, Some(10));
        assert_eq!(filter.visibility, Visibility::PrivateOnly);

        opts.language = Some("   ".into());
        assert_eq!(build_filter(&opts).unwrap().language, None);

        opts.public_only = true;
        assert_eq!(build_filter(&opts).unwrap_err().kind(), ErrorKind::Validation);
    }

    #[test]
    fn open_cache_respects_enabled_flag() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.cache.directory = Some(dir.path().to_path_buf());

        assert!(open_cache(&config).unwrap().is_some());
        config.cache.enabled = false;
        assert!(open_cache(&config).unwrap().is_none());
    }
}
