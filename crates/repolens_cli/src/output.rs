//! Rendering of fetched repositories: table, JSON and summary views.

use std::io::{self, Write};

use clap::ValueEnum;
use console::style;
use repolens::{OwnerKind, RepoStats, RepositoryRecord};
use serde::{Deserialize, Serialize};
use tabled::{Table, Tabled, settings::Style};

/// Output format for repository listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum OutputFormat {
    /// Display as a formatted table (default)
    #[default]
    Table,
    /// Display as JSON
    Json,
    /// Display aggregate statistics
    Summary,
}

const DESCRIPTION_WIDTH: usize = 50;

/// One table row.
#[derive(Debug, Clone, Tabled)]
struct RepoRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Stars")]
    stars: u64,
    #[tabled(rename = "Forks")]
    forks: u64,
    #[tabled(rename = "Language")]
    language: String,
    #[tabled(rename = "Visibility")]
    visibility: String,
    #[tabled(rename = "Updated")]
    updated: String,
    #[tabled(rename = "Description")]
    description: String,
}

impl From<&RepositoryRecord> for RepoRow {
    fn from(repo: &RepositoryRecord) -> Self {
        let mut visibility = if repo.private { "Private" } else { "Public" }.to_string();
        if repo.archived {
            visibility.push_str(" (archived)");
        }
        Self {
            name: repo.name.clone(),
            stars: repo.stars,
            forks: repo.forks,
            language: repo.language.clone().unwrap_or_else(|| "-".to_string()),
            visibility,
            updated: repo.updated_at.format("%Y-%m-%d").to_string(),
            description: truncate(repo.description.as_deref().unwrap_or(""), DESCRIPTION_WIDTH),
        }
    }
}

fn owner_label(kind: OwnerKind) -> &'static str {
    match kind {
        OwnerKind::User => "User",
        OwnerKind::Organization => "Organization",
    }
}

pub(crate) fn render_table(records: &[RepositoryRecord], owner: &str, kind: OwnerKind) -> String {
    let heading = format!(
        "{} {} - {} repositories",
        owner_label(kind),
        style(owner).bold().cyan(),
        records.len()
    );
    if records.is_empty() {
        return format!("{heading}\nNo repositories found.");
    }

    let mut table = Table::new(records.iter().map(RepoRow::from));
    table.with(Style::rounded());
    format!("{heading}\n{table}")
}

pub(crate) fn render_json(records: &[RepositoryRecord], indent: usize) -> serde_json::Result<String> {
    let indent = vec![b' '; indent];
    let formatter = serde_json::ser::PrettyFormatter::with_indent(&indent);
    let mut buf = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    records.serialize(&mut serializer)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

pub(crate) fn render_summary(stats: &RepoStats, owner: &str, kind: OwnerKind, languages: usize) -> String {
    let mut out = String::new();
    let mut line = |label: &str, value: String| {
        out.push_str(&format!("{} {}\n", style(format!("{label}:")).bold(), value));
    };

    line(owner_label(kind), owner.to_string());
    line("Total Repositories", stats.total.to_string());
    line("Public", stats.public.to_string());
    line("Private", stats.private.to_string());
    line("Archived", stats.archived.to_string());
    line("Forks", stats.forks.to_string());
    line("Total Stars", group_thousands(stats.total_stars));
    line("Total Forks", group_thousands(stats.total_forks));
    line("Total Size", format!("{:.2} MB", stats.total_size_mb));

    out.push_str(&format!("{}\n", style("Top Languages:").bold().magenta()));
    let top = stats.top_languages(languages);
    if top.is_empty() {
        out.push_str("  (none)\n");
    }
    for lang in top {
        out.push_str(&format!("  {}: {} repositories\n", lang.language, lang.repositories));
    }

    out.trim_end().to_string()
}

/// Write rendered output to stdout.
pub(crate) fn print(text: &str) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{text}")?;
    stdout.flush()
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(width.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
