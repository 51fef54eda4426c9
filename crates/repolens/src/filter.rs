//! Filtering and ordering applied after records are fetched (or served
//! from cache). Nothing here touches the network or the cache key.

use std::fmt;
use std::str::FromStr;

use crate::model::RepositoryRecord;

/// Which repositories to keep by visibility.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Visibility {
    #[default]
    All,
    PublicOnly,
    PrivateOnly,
}

impl Visibility {
    /// Map the two CLI flags; callers validate they are not both set.
    pub fn from_flags(public_only: bool, private_only: bool) -> Self {
        match (public_only, private_only) {
            (true, _) => Visibility::PublicOnly,
            (false, true) => Visibility::PrivateOnly,
            (false, false) => Visibility::All,
        }
    }
}

/// Post-fetch predicate over [`RepositoryRecord`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoFilter {
    /// Matched case-insensitively; repositories without a language never match.
    pub language: Option<String>,
    pub min_stars: Option<u64>,
    pub min_forks: Option<u64>,
    pub visibility: Visibility,
}

impl RepoFilter {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn matches(&self, repo: &RepositoryRecord) -> bool {
        if let Some(language) = &self.language
            && !repo
                .language
                .as_deref()
                .is_some_and(|l| l.eq_ignore_ascii_case(language.trim()))
        {
            return false;
        }
        if self.min_stars.is_some_and(|min| repo.stars < min) {
            return false;
        }
        if self.min_forks.is_some_and(|min| repo.forks < min) {
            return false;
        }
        match self.visibility {
            Visibility::All => true,
            Visibility::PublicOnly => repo.is_public(),
            Visibility::PrivateOnly => repo.private,
        }
    }

    /// Keep matching records, preserving order.
    pub fn apply(&self, records: Vec<RepositoryRecord>) -> Vec<RepositoryRecord> {
        if self.is_empty() {
            return records;
        }
        records.into_iter().filter(|r| self.matches(r)).collect()
    }
}

/// Ordering for displayed records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    /// Ascending, case-insensitive.
    Name,
    #[default]
    Stars,
    Forks,
    Updated,
    Created,
    Size,
}

impl SortKey {
    pub const ALL: [SortKey; 6] = [
        SortKey::Name,
        SortKey::Stars,
        SortKey::Forks,
        SortKey::Updated,
        SortKey::Created,
        SortKey::Size,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SortKey::Name => "name",
            SortKey::Stars => "stars",
            SortKey::Forks => "forks",
            SortKey::Updated => "updated",
            SortKey::Created => "created",
            SortKey::Size => "size",
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SortKey::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                let valid: Vec<&str> = SortKey::ALL.iter().map(|k| k.as_str()).collect();
                format!("sort field must be one of: {}", valid.join(", "))
            })
    }
}

/// Sort in place. Everything but [`SortKey::Name`] is descending; ties keep
/// their fetched order.
pub fn sort_records(records: &mut [RepositoryRecord], key: SortKey) {
    match key {
        SortKey::Name => records.sort_by_cached_key(|r| r.name.to_lowercase()),
        SortKey::Stars => records.sort_by(|a, b| b.stars.cmp(&a.stars)),
        SortKey::Forks => records.sort_by(|a, b| b.forks.cmp(&a.forks)),
        SortKey::Updated => records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at)),
        SortKey::Created => records.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        SortKey::Size => records.sort_by(|a, b| b.size_kb.cmp(&a.size_kb)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Strictness;
    use crate::model::tests::raw_repo;

    fn record(name: &str, stars: i64, forks: i64, language: Option<&str>, private: bool) -> RepositoryRecord {
        let mut raw = raw_repo("octocat", name);
        raw.stargazers_count = Some(stars);
        raw.forks_count = Some(forks);
        raw.language = language.map(str::to_string);
        raw.private = Some(private);
        RepositoryRecord::from_raw(raw, 0, Strictness::Lenient).unwrap()
    }

    fn names(records: &[RepositoryRecord]) -> Vec<&str> {
        records.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn empty_filter_keeps_everything() {
        let records = vec![record("a", 0, 0, None, true), record("b", 5, 1, Some("Go"), false)];
        assert_eq!(RepoFilter::default().apply(records.clone()), records);
    }

    #[test]
    fn language_match_is_case_insensitive() {
        let filter = RepoFilter {
            language: Some("rust".into()),
            ..RepoFilter::default()
        };
        assert!(filter.matches(&record("a", 0, 0, Some("Rust"), false)));
        assert!(!filter.matches(&record("b", 0, 0, Some("Go"), false)));
        assert!(!filter.matches(&record("c", 0, 0, None, false)));
    }

    #[test]
    fn thresholds_are_inclusive() {
        let filter = RepoFilter {
            min_stars: Some(10),
            min_forks: Some(2),
            ..RepoFilter::default()
        };
        let kept = filter.apply(vec![
            record("exact", 10, 2, None, false),
            record("few-stars", 9, 5, None, false),
            record("few-forks", 50, 1, None, false),
        ]);
        assert_eq!(names(&kept), vec!["exact"]);
    }

    #[test]
    fn visibility_filters() {
        let records = vec![record("pub", 0, 0, None, false), record("priv", 0, 0, None, true)];
        let public = RepoFilter {
            visibility: Visibility::from_flags(true, false),
            ..RepoFilter::default()
        };
        let private = RepoFilter {
            visibility: Visibility::from_flags(false, true),
            ..RepoFilter::default()
        };
        assert_eq!(names(&public.apply(records.clone())), vec!["pub"]);
        assert_eq!(names(&private.apply(records)), vec!["priv"]);
    }

    #[test]
    fn name_sort_is_ascending_and_case_insensitive() {
        let mut records = vec![
            record("zeta", 0, 0, None, false),
            record("Alpha", 0, 0, None, false),
            record("beta", 0, 0, None, false),
        ];
        sort_records(&mut records, SortKey::Name);
        assert_eq!(names(&records), vec!["Alpha", "beta", "zeta"]);
    }

    #[test]
    fn numeric_sorts_are_descending_and_stable() {
        let mut records = vec![
            record("first-tie", 5, 0, None, false),
            record("top", 9, 0, None, false),
            record("second-tie", 5, 0, None, false),
            record("low", 1, 0, None, false),
        ];
        sort_records(&mut records, SortKey::Stars);
        assert_eq!(names(&records), vec!["top", "first-tie", "second-tie", "low"]);
    }

    #[test]
    fn sort_key_parses_names() {
        assert_eq!("Updated".parse::<SortKey>(), Ok(SortKey::Updated));
        assert_eq!("size".parse::<SortKey>(), Ok(SortKey::Size));
        assert!("popularity".parse::<SortKey>().is_err());
    }
}
