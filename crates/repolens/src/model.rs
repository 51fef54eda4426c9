//! Repository payloads and the validated record built from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FetchError, Result};

const OPERATION: &str = "validate_repository";

/// Repository object as returned by the GitHub REST API.
///
/// Every field is optional so that missing identity fields are reported as a
/// validation failure naming the field, not as an opaque decode error.
///
/// API docs: https://docs.github.com/en/rest/repos/repos#list-repositories-for-a-user
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawRepository {
    pub name: Option<String>,
    pub full_name: Option<String>,
    pub owner: Option<RawOwner>,
    pub description: Option<String>,
    pub html_url: Option<String>,
    pub clone_url: Option<String>,
    pub ssh_url: Option<String>,
    pub language: Option<String>,
    pub stargazers_count: Option<i64>,
    pub forks_count: Option<i64>,
    pub open_issues_count: Option<i64>,
    /// Size in KB.
    pub size: Option<i64>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub pushed_at: Option<String>,
    pub private: Option<bool>,
    pub archived: Option<bool>,
    pub disabled: Option<bool>,
    pub fork: Option<bool>,
    pub topics: Option<Vec<String>>,
    pub license: Option<RawLicense>,
}

/// Repository owner (user or organization).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawOwner {
    pub login: Option<String>,
    /// "User" or "Organization".
    #[serde(rename = "type")]
    pub owner_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawLicense {
    pub spdx_id: Option<String>,
}

/// How inconsistent timestamps are handled during validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Strictness {
    /// Raise `updated_at`/`pushed_at` to `created_at` when they predate it.
    #[default]
    Lenient,
    /// Reject the record.
    Strict,
}

/// Validated snapshot of one repository at fetch time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    pub name: String,
    /// Always `owner/name`.
    pub full_name: String,
    pub owner: String,
    pub owner_type: Option<String>,
    pub description: Option<String>,
    pub html_url: String,
    pub clone_url: String,
    pub ssh_url: String,
    pub language: Option<String>,
    pub stars: u64,
    pub forks: u64,
    pub open_issues: u64,
    pub size_kb: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub pushed_at: Option<DateTime<Utc>>,
    pub private: bool,
    pub archived: bool,
    pub disabled: bool,
    pub fork: bool,
    pub topics: Vec<String>,
    /// SPDX identifier.
    pub license: Option<String>,
}

impl RepositoryRecord {
    /// Validate one raw payload. `index` is the item's position in the fetch
    /// and is reported when identity fields are missing.
    pub fn from_raw(raw: RawRepository, index: usize, strictness: Strictness) -> Result<Self> {
        let position = format!("item #{index}");

        let name = required_text(raw.name, "name", &position)?;
        let owner_login = raw.owner.as_ref().and_then(|o| o.login.clone());
        let owner = required_text(owner_login, "owner.login", &position)?;
        let full_name = format!("{owner}/{name}");

        if let Some(reported) = raw.full_name.as_deref()
            && !reported.eq_ignore_ascii_case(&full_name)
        {
            return Err(FetchError::validation(
                OPERATION,
                format!("full_name '{reported}' does not match '{full_name}'"),
            )
            .with_field("full_name", reported));
        }

        let created_at = required_timestamp(raw.created_at.as_deref(), "created_at", &full_name)?;
        let mut updated_at =
            required_timestamp(raw.updated_at.as_deref(), "updated_at", &full_name)?;
        let mut pushed_at = raw
            .pushed_at
            .as_deref()
            .map(|v| parse_timestamp(v, "pushed_at", &full_name))
            .transpose()?;

        if updated_at < created_at {
            updated_at = reconcile(strictness, "updated_at", &full_name, created_at, updated_at)?;
        }
        if let Some(pushed) = pushed_at
            && pushed < created_at
        {
            pushed_at = Some(reconcile(strictness, "pushed_at", &full_name, created_at, pushed)?);
        }

        Ok(Self {
            owner_type: raw.owner.and_then(|o| o.owner_type),
            description: raw
                .description
                .map(|d| clean_text(&d))
                .filter(|d| !d.is_empty()),
            html_url: raw.html_url.unwrap_or_default(),
            clone_url: raw.clone_url.unwrap_or_default(),
            ssh_url: raw.ssh_url.unwrap_or_default(),
            language: raw.language.filter(|l| !l.trim().is_empty()),
            stars: count(raw.stargazers_count, "stargazers_count", &full_name)?,
            forks: count(raw.forks_count, "forks_count", &full_name)?,
            open_issues: count(raw.open_issues_count, "open_issues_count", &full_name)?,
            size_kb: count(raw.size, "size", &full_name)?,
            created_at,
            updated_at,
            pushed_at,
            private: raw.private.unwrap_or(false),
            archived: raw.archived.unwrap_or(false),
            disabled: raw.disabled.unwrap_or(false),
            fork: raw.fork.unwrap_or(false),
            topics: dedup_topics(raw.topics.unwrap_or_default()),
            license: raw
                .license
                .and_then(|l| l.spdx_id)
                .filter(|id| !id.is_empty()),
            name,
            full_name,
            owner,
        })
    }

    #[inline]
    pub fn is_public(&self) -> bool {
        !self.private
    }

    /// Size in megabytes.
    pub fn size_mb(&self) -> f64 {
        self.size_kb as f64 / 1024.0
    }
}

/// Validate a whole fetch. The first invalid item fails the batch.
pub fn validate_all(raws: Vec<RawRepository>, strictness: Strictness) -> Result<Vec<RepositoryRecord>> {
    raws.into_iter()
        .enumerate()
        .map(|(index, raw)| RepositoryRecord::from_raw(raw, index, strictness))
        .collect()
}

/// Replace control characters with spaces and collapse whitespace runs.
pub fn clean_text(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn required_text(value: Option<String>, field: &str, position: &str) -> Result<String> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(FetchError::validation(
            OPERATION,
            format!("{position} is missing required field '{field}'"),
        )
        .with_field(field, position)),
    }
}

fn parse_timestamp(value: &str, field: &str, repo: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            FetchError::validation(OPERATION, format!("{repo}: invalid {field}: {e}"))
                .with_field(field, value)
        })
}

fn required_timestamp(value: Option<&str>, field: &str, repo: &str) -> Result<DateTime<Utc>> {
    match value {
        Some(v) => parse_timestamp(v, field, repo),
        None => Err(
            FetchError::validation(OPERATION, format!("{repo} is missing '{field}'"))
                .with_field(field, repo),
        ),
    }
}

fn reconcile(
    strictness: Strictness,
    field: &str,
    repo: &str,
    created_at: DateTime<Utc>,
    value: DateTime<Utc>,
) -> Result<DateTime<Utc>> {
    match strictness {
        Strictness::Strict => Err(FetchError::validation(
            OPERATION,
            format!("{repo}: {field} {value} is earlier than created_at {created_at}"),
        )
        .with_field(field, value.to_rfc3339())),
        Strictness::Lenient => {
            tracing::debug!(repo, field, %value, %created_at, "Raising timestamp to created_at");
            Ok(created_at)
        }
    }
}

fn count(value: Option<i64>, field: &str, repo: &str) -> Result<u64> {
    let raw = value.unwrap_or(0);
    u64::try_from(raw).map_err(|_| {
        FetchError::validation(OPERATION, format!("{repo}: {field} must not be negative"))
            .with_field(field, raw)
    })
}

fn dedup_topics(topics: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    topics
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}
