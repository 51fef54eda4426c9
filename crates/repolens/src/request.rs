//! Fetch requests and their cache fingerprints.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::error::{FetchError, Result};

/// Bumped whenever the canonical rendering or the cached record layout changes.
const FINGERPRINT_VERSION: &str = "v1";

/// Largest page GitHub serves.
pub const MAX_PER_PAGE: u32 = 100;

/// Whether the owner is a user or an organization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum OwnerKind {
    #[default]
    User,
    Organization,
}

impl OwnerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Organization => "org",
        }
    }
}

impl fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cap on the number of records a fetch returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemLimit {
    Unbounded,
    AtMost(usize),
}

impl ItemLimit {
    /// Sentinel accepted by [`ItemLimit::from_raw`] for "no limit".
    pub const UNBOUNDED_SENTINEL: i64 = -1;

    /// Parse a user-supplied limit: `-1` or a positive integer.
    pub fn from_raw(raw: i64) -> Result<Self> {
        match raw {
            Self::UNBOUNDED_SENTINEL => Ok(Self::Unbounded),
            n if n > 0 => Ok(Self::AtMost(usize::try_from(n).unwrap_or(usize::MAX))),
            n => Err(FetchError::validation(
                "parse_limit",
                "limit must be a positive integer or -1 for no limit",
            )
            .with_field("limit", n)),
        }
    }

    /// Clamp a bounded limit to `max`. Unbounded stays unbounded.
    #[must_use]
    pub fn clamp(self, max: usize) -> Self {
        match self {
            Self::AtMost(n) => Self::AtMost(n.min(max)),
            Self::Unbounded => Self::Unbounded,
        }
    }

    /// Page size that wastes the least quota for this limit.
    pub fn per_page(self) -> u32 {
        match self {
            Self::Unbounded => MAX_PER_PAGE,
            Self::AtMost(n) => u32::try_from(n).unwrap_or(MAX_PER_PAGE).clamp(1, MAX_PER_PAGE),
        }
    }

    #[inline]
    pub fn is_reached(self, count: usize) -> bool {
        matches!(self, Self::AtMost(n) if count >= n)
    }
}

impl fmt::Display for ItemLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unbounded => f.write_str("all"),
            Self::AtMost(n) => write!(f, "{n}"),
        }
    }
}

/// Server-side sort for search results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchSort {
    Stars,
    Forks,
    Updated,
}

impl SearchSort {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stars => "stars",
            Self::Forks => "forks",
            Self::Updated => "updated",
        }
    }
}

/// Filters applied by the search endpoint, so they shape the fetched data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SearchFilters {
    pub keywords: Option<String>,
    pub language: Option<String>,
    pub min_stars: Option<u64>,
    pub min_forks: Option<u64>,
    pub sort: Option<SearchSort>,
}

impl SearchFilters {
    /// Build the `q` parameter for `/search/repositories`.
    pub fn query(&self, owner: &str, kind: OwnerKind) -> String {
        let mut terms: Vec<String> = Vec::new();

        if let Some(keywords) = self.keywords.as_deref().map(normalize_space)
            && !keywords.is_empty()
        {
            terms.push(keywords);
        }

        let qualifier = match kind {
            OwnerKind::User => "user",
            OwnerKind::Organization => "org",
        };
        terms.push(format!("{qualifier}:{owner}"));

        if let Some(language) = self.language.as_deref().map(normalize_space)
            && !language.is_empty()
        {
            if language.contains(' ') {
                terms.push(format!("language:\"{language}\""));
            } else {
                terms.push(format!("language:{language}"));
            }
        }
        if let Some(stars) = self.min_stars {
            terms.push(format!("stars:>={stars}"));
        }
        if let Some(forks) = self.min_forks {
            terms.push(format!("forks:>={forks}"));
        }

        terms.join(" ")
    }
}

/// Everything that determines which raw data a fetch requests.
///
/// Post-fetch filters (see [`crate::filter::RepoFilter`]) are
/// absent: they run after caching and must not split cache entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchRequest {
    pub owner: String,
    pub kind: OwnerKind,
    pub limit: ItemLimit,
    /// `Some` routes the fetch through the search endpoint.
    pub search: Option<SearchFilters>,
}

impl FetchRequest {
    pub fn new(owner: impl Into<String>, kind: OwnerKind, limit: ItemLimit) -> Self {
        Self {
            owner: owner.into(),
            kind,
            limit,
            search: None,
        }
    }

    #[must_use]
    pub fn with_search(mut self, filters: SearchFilters) -> Self {
        self.search = Some(filters);
        self
    }

    /// Stable, versioned rendering of the fingerprint-relevant fields.
    fn canonical(&self) -> String {
        let mut parts = vec![
            FINGERPRINT_VERSION.to_string(),
            format!("owner={}", self.owner.trim().to_ascii_lowercase()),
            format!("kind={}", self.kind),
            format!("limit={}", self.limit),
        ];

        match &self.search {
            None => parts.push("mode=list".to_string()),
            Some(filters) => {
                parts.push("mode=search".to_string());
                parts.push(format!(
                    "q={}",
                    filters
                        .query(&self.owner.trim().to_ascii_lowercase(), self.kind)
                        .to_lowercase()
                ));
                parts.push(format!(
                    "sort={}",
                    filters.sort.map(SearchSort::as_str).unwrap_or("best-match")
                ));
            }
        }

        parts.join("\n")
    }

    /// Cache key for this request.
    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical().as_bytes());
        Fingerprint(hex::encode(hasher.finalize()))
    }

    /// Short human description for logs and progress output.
    pub fn description(&self) -> String {
        match &self.search {
            None => format!("{} {} (limit {})", self.kind, self.owner, self.limit),
            Some(filters) => format!(
                "search '{}' (limit {})",
                filters.query(&self.owner, self.kind),
                self.limit
            ),
        }
    }
}

/// Hex SHA-256 of a request's canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn normalize_space(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
