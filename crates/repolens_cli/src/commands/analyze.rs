use repolens::validation::validate_owner;
use repolens::{FetchRequest, sort_records};

use crate::AnalyzeArgs;
use crate::commands::shared::{build_filter, cache_policy, emit, fetch_service, resolve_limit};
use crate::config::Config;
use crate::error::CliError;

pub(crate) async fn handle_analyze(args: AnalyzeArgs, config: &Config, refresh: bool) -> Result<(), CliError> {
    let AnalyzeArgs { target, view } = args;

    // Reject bad flags before any request is made.
    let owner = validate_owner(&target.owner)?.to_string();
    let kind = target.kind();
    let filter = build_filter(&view)?;
    let limit = resolve_limit(target.limit, config)?;
    let format = view.output.unwrap_or(config.output.format);

    let request = FetchRequest::new(owner.clone(), kind, limit);
    let (service, reporter) = fetch_service(config)?;
    let result = service.fetch(&request, &cache_policy(config, refresh)).await;
    reporter.finish();
    let outcome = result?;

    tracing::debug!(
        fetched = outcome.records.len(),
        from_cache = outcome.from_cache,
        fingerprint = %outcome.fingerprint,
        "Fetched repositories"
    );

    let mut records = filter.apply(outcome.records);
    sort_records(&mut records, view.sort.unwrap_or_default());

    emit(&records, &owner, kind, format, config)
}
