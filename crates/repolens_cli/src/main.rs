//! repolens CLI - inspect the repositories of GitHub users and organizations.

mod commands;
mod config;
mod error;
mod output;
mod progress;
mod shutdown;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use console::style;
use repolens::{OwnerKind, SortKey};
use tracing_subscriber::EnvFilter;

use crate::commands::limits::LimitsFormat;
use crate::config::Config;
use crate::error::CliError;
use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "repolens")]
#[command(version)]
#[command(about = "Fetch, cache and summarize GitHub repositories")]
#[command(
    long_about = "repolens lists the repositories of a GitHub user or organization, \
caches the results on disk, and backs off politely when GitHub rate limits it. \
Results can be filtered, sorted and rendered as a table, JSON or a summary."
)]
#[command(after_long_help = r#"EXAMPLES
    List a user's repositories, most starred first:
        $ repolens analyze octocat

    Summarize an organization's Rust repositories:
        $ repolens analyze rust-lang --org --language rust --output summary

    Search an owner's repositories by keyword:
        $ repolens search octocat --query cli --min-stars 10

    Fetch everything, ignoring any cached copy:
        $ repolens analyze torvalds --limit -1 --refresh

CONFIGURATION
    repolens reads configuration from:
      1. ~/.config/repolens/config.toml (or $XDG_CONFIG_HOME/repolens/config.toml)
      2. ./repolens.toml
      3. Environment variables (REPOLENS_* prefix, e.g. REPOLENS_CACHE__TTL_SECS)
      4. .env file in current directory

ENVIRONMENT VARIABLES
    GITHUB_TOKEN                  GitHub personal access token
    REPOLENS_GITHUB__TOKEN        Same, takes precedence over GITHUB_TOKEN
    REPOLENS_GITHUB__API_URL      API base URL (GitHub Enterprise)
    REPOLENS_CACHE__DIRECTORY     Cache directory
    RUST_LOG                      Log filter (default: repolens=warn,repolens_cli=info)
"#)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

/// Flags accepted by every subcommand; they override configuration.
#[derive(Debug, Clone, Default, clap::Args)]
struct GlobalOptions {
    /// GitHub personal access token
    #[arg(long, global = true)]
    token: Option<String>,

    /// Cache directory
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Lifetime of new cache entries, in seconds
    #[arg(long, global = true)]
    cache_ttl: Option<u64>,

    /// Neither read nor write the cache
    #[arg(long, global = true, conflicts_with = "refresh")]
    no_cache: bool,

    /// Ignore cached results but store fresh ones
    #[arg(long, global = true)]
    refresh: bool,

    /// GitHub API base URL
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// List and analyze the repositories of a user or organization
    Analyze(AnalyzeArgs),
    /// Search an owner's repositories through the GitHub search API
    Search(SearchArgs),
    /// Inspect or clear the local cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Show current rate limit status
    Limits {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = LimitsFormat::Table)]
        output: LimitsFormat,
    },
}

/// Whose repositories to fetch.
#[derive(Debug, Clone, clap::Args)]
pub(crate) struct TargetOptions {
    /// GitHub username or organization name
    pub owner: String,

    /// Treat the owner as an organization
    #[arg(long)]
    pub org: bool,

    /// Maximum number of repositories to fetch (-1 for no limit; default from config or 100)
    #[arg(short, long, allow_negative_numbers = true)]
    pub limit: Option<i64>,
}

impl TargetOptions {
    pub(crate) fn kind(&self) -> OwnerKind {
        if self.org {
            OwnerKind::Organization
        } else {
            OwnerKind::User
        }
    }
}

/// Filters and presentation shared by `analyze` and `search`.
#[derive(Debug, Clone, clap::Args)]
pub(crate) struct ViewOptions {
    /// Only repositories in this language
    #[arg(long)]
    pub language: Option<String>,

    /// Only repositories with at least this many stars
    #[arg(long)]
    pub min_stars: Option<u64>,

    /// Only repositories with at least this many forks
    #[arg(long)]
    pub min_forks: Option<u64>,

    /// Only public repositories
    #[arg(long, conflicts_with = "private_only")]
    pub public_only: bool,

    /// Only private repositories
    #[arg(long)]
    pub private_only: bool,

    /// Sort field: name, stars, forks, updated, created or size
    #[arg(short, long)]
    pub sort: Option<SortKey>,

    /// Output format (default from config or table)
    #[arg(short, long, value_enum)]
    pub output: Option<OutputFormat>,
}

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct AnalyzeArgs {
    #[command(flatten)]
    pub target: TargetOptions,

    #[command(flatten)]
    pub view: ViewOptions,
}

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct SearchArgs {
    #[command(flatten)]
    pub target: TargetOptions,

    /// Keywords matched against repository names and descriptions
    #[arg(short, long)]
    pub query: Option<String>,

    #[command(flatten)]
    pub view: ViewOptions,
}

#[derive(Subcommand)]
pub(crate) enum CacheAction {
    /// Remove cached results (all of them, or those of one request)
    Clear {
        /// Only clear the entry for this owner's listing
        owner: Option<String>,

        /// Treat the owner as an organization
        #[arg(long, requires = "owner")]
        org: bool,

        /// Limit the cached listing was fetched with
        #[arg(short, long, requires = "owner", allow_negative_numbers = true)]
        limit: Option<i64>,
    },
    /// Show cache size and entry counts
    Stats,
    /// Remove expired entries
    Prune,
}

fn init_tracing(verbose: u8) {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new(match verbose {
            0 => "repolens=warn,repolens_cli=info",
            1 => "repolens=debug,repolens_cli=debug",
            _ => "repolens=trace,repolens_cli=trace",
        }),
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Fold command-line flags into the loaded configuration.
fn apply_overrides(config: &mut Config, global: &GlobalOptions) {
    if let Some(token) = &global.token {
        config.github.token = Some(token.clone());
    }
    if let Some(api_url) = &global.api_url {
        config.github.api_url = api_url.clone();
    }
    if let Some(dir) = &global.cache_dir {
        config.cache.directory = Some(dir.clone());
    }
    if let Some(ttl) = global.cache_ttl {
        config.cache.ttl_secs = ttl;
    }
    if global.no_cache {
        config.cache.enabled = false;
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = Config::load()?;
    apply_overrides(&mut config, &cli.global);
    config.validate()?;

    let refresh = cli.global.refresh;
    match cli.command {
        Commands::Analyze(args) => commands::analyze::handle_analyze(args, &config, refresh).await,
        Commands::Search(args) => commands::search::handle_search(args, &config, refresh).await,
        Commands::Cache { action } => commands::cache::handle_cache(action, &config).await,
        Commands::Limits { output } => commands::limits::handle_limits(output, &config).await,
    }
}

/// Headline and optional tip printed to stderr for a failed run.
fn describe(err: &CliError) -> (String, Option<String>) {
    match err {
        CliError::Fetch(e) => (e.user_message(), e.tip()),
        other => (other.to_string(), None),
    }
}

fn report(err: &CliError) -> ExitCode {
    let (headline, tip) = describe(err);
    eprintln!("{} {headline}", style("error:").red().bold());
    if let Some(tip) = tip {
        eprintln!("{}", style(tip).dim());
    }
    ExitCode::from(err.exit_code())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.global.verbose);

    tokio::select! {
        result = run(cli) => match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => report(&e),
        },
        () = shutdown::wait_for_interrupt() => ExitCode::from(shutdown::INTERRUPTED_EXIT_CODE),
    }
}
