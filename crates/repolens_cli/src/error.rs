use repolens::FetchError;
use thiserror::Error;

/// Everything a command can fail with.
///
/// Configuration problems arrive as [`FetchError`]s of the Configuration kind;
/// only writing the rendered output can fail outside that taxonomy.
#[derive(Debug, Error)]
pub(crate) enum CliError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("failed to write output: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// 1 for classified errors, 2 for output failures.
    pub(crate) fn exit_code(&self) -> u8 {
        match self {
            Self::Fetch(_) => 1,
            _ => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes() {
        assert_eq!(CliError::from(FetchError::not_found("list_repos", "missing")).exit_code(), 1);
        assert_eq!(
            CliError::from(FetchError::configuration("load_config", "bad")).exit_code(),
            1
        );
        assert_eq!(CliError::from(std::io::Error::other("pipe closed")).exit_code(), 2);
    }
}
