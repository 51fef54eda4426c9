//! Aggregate numbers over a set of records.

use std::collections::HashMap;

use serde::Serialize;

use crate::model::RepositoryRecord;

/// Repositories using one language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LanguageCount {
    pub language: String,
    pub repositories: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RepoStats {
    pub total: usize,
    pub public: usize,
    pub private: usize,
    pub archived: usize,
    /// Repositories that are themselves forks.
    pub forks: usize,
    pub total_stars: u64,
    /// Sum of every repository's fork count.
    pub total_forks: u64,
    /// Rounded to two decimals.
    pub total_size_mb: f64,
    /// Most used first; ties ordered by name.
    pub languages: Vec<LanguageCount>,
}

impl RepoStats {
    pub fn from_records(records: &[RepositoryRecord]) -> Self {
        let mut stats = RepoStats {
            total: records.len(),
            ..RepoStats::default()
        };
        let mut languages: HashMap<&str, usize> = HashMap::new();
        let mut size_kb: u64 = 0;

        for repo in records {
            if repo.private {
                stats.private += 1;
            } else {
                stats.public += 1;
            }
            if repo.archived {
                stats.archived += 1;
            }
            if repo.fork {
                stats.forks += 1;
            }
            stats.total_stars = stats.total_stars.saturating_add(repo.stars);
            stats.total_forks = stats.total_forks.saturating_add(repo.forks);
            size_kb = size_kb.saturating_add(repo.size_kb);

            if let Some(language) = repo.language.as_deref() {
                *languages.entry(language).or_default() += 1;
            }
        }

        stats.total_size_mb = (size_kb as f64 / 1024.0 * 100.0).round() / 100.0;

        let mut ranked: Vec<LanguageCount> = languages
            .into_iter()
            .map(|(language, repositories)| LanguageCount {
                language: language.to_string(),
                repositories,
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.repositories
                .cmp(&a.repositories)
                .then_with(|| a.language.cmp(&b.language))
        });
        stats.languages = ranked;

        stats
    }

    pub fn top_languages(&self, n: usize) -> &[LanguageCount] {
        &self.languages[..n.min(self.languages.len())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Strictness;
    use crate::model::tests::raw_repo;

    fn record(name: &str, language: Option<&str>, stars: i64, size: i64) -> RepositoryRecord {
        let mut raw = raw_repo("octocat", name);
        raw.language = language.map(str::to_string);
        raw.stargazers_count = Some(stars);
        raw.size = Some(size);
        RepositoryRecord::from_raw(raw, 0, Strictness::Lenient).unwrap()
    }

    #[test]
    fn empty_input_gives_zeroes() {
        let stats = RepoStats::from_records(&[]);
        assert_eq!(stats, RepoStats::default());
        assert!(stats.top_languages(5).is_empty());
    }

    #[test]
    fn counts_visibility_and_flags() {
        let mut private = record("secret", None, 0, 0);
        private.private = true;
        private.archived = true;
        let mut fork = record("fork", None, 0, 0);
        fork.fork = true;

        let stats = RepoStats::from_records(&[private, fork, record("plain", None, 3, 0)]);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.public, 2);
        assert_eq!(stats.private, 1);
        assert_eq!(stats.archived, 1);
        assert_eq!(stats.forks, 1);
        assert_eq!(stats.total_stars, 3);
        // raw_repo gives every repository two forks
        assert_eq!(stats.total_forks, 6);
    }

    #[test]
    fn size_is_rounded_megabytes() {
        let stats = RepoStats::from_records(&[record("a", None, 0, 1024), record("b", None, 0, 512), record("c", None, 0, 5)]);
        assert_eq!(stats.total_size_mb, 1.5);
    }

    #[test]
    fn languages_rank_by_count_then_name() {
        let stats = RepoStats::from_records(&[
            record("a", Some("Rust"), 0, 0),
            record("b", Some("Go"), 0, 0),
            record("c", Some("Rust"), 0, 0),
            record("d", Some("C"), 0, 0),
            record("e", None, 0, 0),
        ]);
        let ranked: Vec<(&str, usize)> = stats
            .languages
            .iter()
            .map(|l| (l.language.as_str(), l.repositories))
            .collect();
        assert_eq!(ranked, vec![("Rust", 2), ("C", 1), ("Go", 1)]);
        assert_eq!(stats.top_languages(1).len(), 1);
        assert_eq!(stats.top_languages(10).len(), 3);
    }
}
