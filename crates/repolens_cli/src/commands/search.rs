use repolens::validation::{validate_keywords, validate_owner};
use repolens::{FetchRequest, RepoFilter, SearchFilters, SearchSort, SortKey, sort_records};

use crate::SearchArgs;
use crate::commands::shared::{build_filter, cache_policy, emit, fetch_service, resolve_limit};
use crate::config::Config;
use crate::error::CliError;

/// Server-side ordering for a display sort, where the search API has one.
fn search_sort(key: SortKey) -> Option<SearchSort> {
    match key {
        SortKey::Stars => Some(SearchSort::Stars),
        SortKey::Forks => Some(SearchSort::Forks),
        SortKey::Updated => Some(SearchSort::Updated),
        SortKey::Name | SortKey::Created | SortKey::Size => None,
    }
}

pub(crate) async fn handle_search(args: SearchArgs, config: &Config, refresh: bool) -> Result<(), CliError> {
    let SearchArgs { target, query, view } = args;

    let owner = validate_owner(&target.owner)?.to_string();
    let kind = target.kind();
    let filter = build_filter(&view)?;
    let keywords = query
        .as_deref()
        .map(validate_keywords)
        .transpose()?
        .flatten()
        .map(str::to_string);
    let limit = resolve_limit(target.limit, config)?;
    let sort = view.sort.unwrap_or(SortKey::Updated);
    let format = view.output.unwrap_or(config.output.format);

    // Language and thresholds go to the search endpoint; visibility has no
    // qualifier there and is applied locally.
    let filters = SearchFilters {
        keywords,
        language: filter.language.clone(),
        min_stars: filter.min_stars,
        min_forks: filter.min_forks,
        sort: search_sort(sort),
    };
    let local = RepoFilter {
        visibility: filter.visibility,
        ..RepoFilter::default()
    };

    let request = FetchRequest::new(owner.clone(), kind, limit).with_search(filters);
    let (service, reporter) = fetch_service(config)?;
    let result = service.fetch(&request, &cache_policy(config, refresh)).await;
    reporter.finish();
    let outcome = result?;

    tracing::debug!(
        fetched = outcome.records.len(),
        from_cache = outcome.from_cache,
        "Search complete"
    );

    let mut records = local.apply(outcome.records);
    sort_records(&mut records, sort);

    emit(&records, &owner, kind, format, config)
}
