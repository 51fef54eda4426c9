use std::sync::Arc;

use repolens::validation::validate_owner;
use repolens::{CacheStats, ClearScope, FetchRequest, OwnerKind, RepoFetchService};

use crate::CacheAction;
use crate::commands::shared::{build_client, open_cache, resolve_limit};
use crate::config::Config;
use crate::error::CliError;
use crate::output;

pub(crate) async fn handle_cache(action: CacheAction, config: &Config) -> Result<(), CliError> {
    let service = RepoFetchService::new(Arc::new(build_client(config)?), open_cache(config)?);
    let dir = config.cache_dir();

    match action {
        CacheAction::Clear { owner, org, limit } => {
            let scope = match owner {
                Some(owner) => {
                    let kind = if org { OwnerKind::Organization } else { OwnerKind::User };
                    let request = FetchRequest::new(validate_owner(&owner)?, kind, resolve_limit(limit, config)?);
                    tracing::debug!(request = %request.description(), "Clearing one cache entry");
                    ClearScope::Fingerprint(request.fingerprint())
                }
                None => ClearScope::All,
            };
            let removed = service.clear_cache(scope).await?;
            output::print(&format!("Removed {removed} cache entries from {}", dir.display()))?;
        }
        CacheAction::Stats => {
            let stats = service.cache_stats().await?;
            output::print(&format_stats(&stats, &dir.display().to_string()))?;
        }
        CacheAction::Prune => {
            let removed = service.prune_cache().await?;
            output::print(&format!("Removed {removed} expired cache entries"))?;
        }
    }

    Ok(())
}

fn format_stats(stats: &CacheStats, dir: &str) -> String {
    format!(
        "Cache directory: {dir}\nEntries: {} ({} live, {} expired)\nSize: {:.1} KB",
        stats.entries,
        stats.live(),
        stats.expired,
        stats.bytes as f64 / 1024.0
    )
}
