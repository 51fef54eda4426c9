//! Input checks run before any network call.
//!
//! Each check returns the cleaned value so callers can use it directly.

use std::time::Duration;

use crate::cache::MAX_CACHE_DIR_LEN;
use crate::error::{FetchError, Result};
use crate::request::{FetchRequest, ItemLimit};

/// GitHub logins are at most 39 characters.
pub const MAX_OWNER_LEN: usize = 39;
pub const MAX_LANGUAGE_LEN: usize = 50;
pub const MAX_MIN_STARS: u64 = 1_000_000;
pub const MAX_MIN_FORKS: u64 = 100_000;
pub const MAX_KEYWORDS_LEN: usize = 256;
/// Thirty days.
pub const MAX_CACHE_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);
pub const MIN_TOKEN_LEN: usize = 20;
pub const MAX_TOKEN_LEN: usize = 200;

const OP: &str = "validate";
const CONFIG_OP: &str = "validate_config";

/// Check a GitHub user or organization login.
pub fn validate_owner(owner: &str) -> Result<&str> {
    let cleaned = owner.trim();
    let invalid = |message: &str| FetchError::validation(OP, message).with_field("owner", owner);

    if cleaned.is_empty() {
        return Err(invalid("owner name cannot be empty"));
    }
    if cleaned.chars().count() > MAX_OWNER_LEN {
        return Err(invalid(&format!(
            "owner name cannot exceed {MAX_OWNER_LEN} characters"
        )));
    }
    if !cleaned
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(invalid(
            "owner name can only contain letters, digits, hyphens and underscores",
        ));
    }
    if cleaned.starts_with('-') || cleaned.ends_with('-') {
        return Err(invalid("owner name cannot start or end with a hyphen"));
    }
    if cleaned.contains("--") {
        return Err(invalid("owner name cannot contain consecutive hyphens"));
    }

    Ok(cleaned)
}

/// Check a language filter. Empty input means no filter.
pub fn validate_language(language: &str) -> Result<Option<&str>> {
    let cleaned = language.trim();
    if cleaned.is_empty() {
        return Ok(None);
    }

    if cleaned.chars().count() > MAX_LANGUAGE_LEN {
        return Err(FetchError::validation(
            OP,
            format!("language name cannot exceed {MAX_LANGUAGE_LEN} characters"),
        )
        .with_field("language", language));
    }
    if !cleaned
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c.is_whitespace() || "-+.#/".contains(c))
    {
        return Err(
            FetchError::validation(OP, "language name contains invalid characters")
                .with_field("language", language),
        );
    }

    Ok(Some(cleaned))
}

pub fn validate_min_stars(min_stars: u64) -> Result<u64> {
    if min_stars > MAX_MIN_STARS {
        return Err(
            FetchError::validation(OP, "minimum stars cannot exceed 1,000,000")
                .with_field("min_stars", min_stars),
        );
    }
    Ok(min_stars)
}

pub fn validate_min_forks(min_forks: u64) -> Result<u64> {
    if min_forks > MAX_MIN_FORKS {
        return Err(
            FetchError::validation(OP, "minimum forks cannot exceed 100,000")
                .with_field("min_forks", min_forks),
        );
    }
    Ok(min_forks)
}

/// `--public-only` and `--private-only` cannot both be set.
pub fn validate_visibility(public_only: bool, private_only: bool) -> Result<()> {
    if public_only && private_only {
        return Err(FetchError::validation(
            OP,
            "cannot combine --public-only and --private-only",
        )
        .with_field("visibility", "public+private"));
    }
    Ok(())
}

pub fn validate_keywords(keywords: &str) -> Result<Option<&str>> {
    let cleaned = keywords.trim();
    if cleaned.is_empty() {
        return Ok(None);
    }
    if cleaned.chars().count() > MAX_KEYWORDS_LEN {
        return Err(FetchError::validation(
            OP,
            format!("search query cannot exceed {MAX_KEYWORDS_LEN} characters"),
        )
        .with_field("query", cleaned.chars().take(32).collect::<String>()));
    }
    Ok(Some(cleaned))
}

pub fn validate_cache_ttl(ttl: Duration) -> Result<Duration> {
    if ttl > MAX_CACHE_TTL {
        return Err(FetchError::configuration(
            CONFIG_OP,
            "cache TTL cannot exceed 30 days (2,592,000 seconds)",
        )
        .with_field("cache_ttl", ttl.as_secs()));
    }
    Ok(ttl)
}

pub fn validate_cache_dir(dir: &str) -> Result<&str> {
    let cleaned = dir.trim();
    if cleaned.is_empty() {
        return Err(
            FetchError::configuration(CONFIG_OP, "cache directory cannot be empty")
                .with_field("cache_dir", dir),
        );
    }
    if cleaned.chars().count() > MAX_CACHE_DIR_LEN {
        return Err(FetchError::configuration(
            CONFIG_OP,
            format!("cache directory path cannot exceed {MAX_CACHE_DIR_LEN} characters"),
        )
        .with_field("cache_dir", format!("{}...", cleaned.chars().take(32).collect::<String>())));
    }
    Ok(cleaned)
}

/// Check token length without echoing the token.
pub fn validate_token(token: &str) -> Result<&str> {
    let cleaned = token.trim();
    let len = cleaned.chars().count();

    let problem = if cleaned.is_empty() {
        Some("GitHub token cannot be empty")
    } else if len < MIN_TOKEN_LEN {
        Some("GitHub token appears to be too short")
    } else if len > MAX_TOKEN_LEN {
        Some("GitHub token appears to be too long")
    } else {
        None
    };

    match problem {
        Some(message) => Err(FetchError::configuration(CONFIG_OP, message)
            .with_field("github_token", format!("<{len} characters>"))),
        None => Ok(cleaned),
    }
}

/// Check everything a [`FetchRequest`] carries. Returns the trimmed owner.
pub fn validate_request(request: &FetchRequest) -> Result<&str> {
    let owner = validate_owner(&request.owner)?;

    if request.limit == ItemLimit::AtMost(0) {
        return Err(FetchError::validation(
            OP,
            "limit must be a positive integer or -1 for no limit",
        )
        .with_field("limit", 0));
    }

    if let Some(search) = &request.search {
        if let Some(keywords) = &search.keywords {
            validate_keywords(keywords)?;
        }
        if let Some(language) = &search.language {
            validate_language(language)?;
        }
        if let Some(stars) = search.min_stars {
            validate_min_stars(stars)?;
        }
        if let Some(forks) = search.min_forks {
            validate_min_forks(forks)?;
        }
    }

    Ok(owner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::request::{ItemLimit, OwnerKind, SearchFilters};

    #[test]
    fn owner_accepts_github_logins() {
        for owner in ["octocat", "rust-lang", "a", "user_name", "A1-b2"] {
            assert!(validate_owner(owner).is_ok(), "{owner}");
        }
        assert_eq!(validate_owner("  octocat \n").unwrap(), "octocat");
        assert!(validate_owner(&"a".repeat(39)).is_ok());
    }

    #[test]
    fn owner_rejects_malformed_logins() {
        for owner in ["", "   ", "-lead", "trail-", "dou--ble", "sp ace", "dot.ted", "ünï"] {
            let err = validate_owner(owner).expect_err(owner);
            assert_eq!(err.kind(), ErrorKind::Validation);
            assert_eq!(err.context().field.as_deref(), Some("owner"));
        }
        assert!(validate_owner(&"a".repeat(40)).is_err());
    }

    #[test]
    fn language_allows_common_names() {
        for lang in ["Rust", "C++", "C#", "Objective-C", "Visual Basic .NET", "Vim script", "F#/OCaml"] {
            assert_eq!(validate_language(lang).unwrap(), Some(lang));
        }
        assert_eq!(validate_language("  ").unwrap(), None);
    }

    #[test]
    fn language_rejects_bad_input() {
        assert!(validate_language("Rust; DROP").is_err());
        assert!(validate_language(&"x".repeat(51)).is_err());
    }

    #[test]
    fn numeric_bounds() {
        assert!(validate_min_stars(1_000_000).is_ok());
        assert!(validate_min_stars(1_000_001).is_err());
        assert!(validate_min_forks(100_000).is_ok());
        assert_eq!(
            validate_min_forks(100_001).unwrap_err().context().field.as_deref(),
            Some("min_forks")
        );
    }

    #[test]
    fn visibility_flags_are_exclusive() {
        assert!(validate_visibility(true, false).is_ok());
        assert!(validate_visibility(false, true).is_ok());
        assert!(validate_visibility(false, false).is_ok());
        assert_eq!(
            validate_visibility(true, true).unwrap_err().kind(),
            ErrorKind::Validation
        );
    }

    #[test]
    fn configuration_checks_use_configuration_kind() {
        assert!(validate_cache_ttl(MAX_CACHE_TTL).is_ok());
        assert_eq!(
            validate_cache_ttl(MAX_CACHE_TTL + Duration::from_secs(1))
                .unwrap_err()
                .kind(),
            ErrorKind::Configuration
        );
        assert_eq!(validate_cache_dir(" .cache ").unwrap(), ".cache");
        assert!(validate_cache_dir("").is_err());
        assert!(validate_cache_dir(&"d".repeat(501)).is_err());
    }

    #[test]
    fn token_length_is_checked_without_leaking_it() {
        let short = "ghp_short";
        let err = validate_token(short).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(!err.context().value.as_deref().unwrap_or("").contains("ghp_"));

        assert!(validate_token(&"t".repeat(20)).is_ok());
        assert!(validate_token(&"t".repeat(201)).is_err());
    }

    #[test]
    fn request_validation_covers_search_filters() {
        let ok = FetchRequest::new("octocat", OwnerKind::User, ItemLimit::AtMost(5));
        assert_eq!(validate_request(&ok).unwrap(), "octocat");

        let padded = FetchRequest::new("  octocat ", OwnerKind::User, ItemLimit::AtMost(5));
        assert_eq!(validate_request(&padded).unwrap(), "octocat");

        let zero = FetchRequest::new("octocat", OwnerKind::User, ItemLimit::AtMost(0));
        let err = validate_request(&zero).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.context().field.as_deref(), Some("limit"));

        let bad_owner = FetchRequest::new("bad--owner", OwnerKind::User, ItemLimit::Unbounded);
        assert!(validate_request(&bad_owner).is_err());

        let bad_stars = ok.clone().with_search(SearchFilters {
            min_stars: Some(2_000_000),
            ..SearchFilters::default()
        });
        assert_eq!(
            validate_request(&bad_stars).unwrap_err().context().field.as_deref(),
            Some("min_stars")
        );
    }
}
