use std::path::PathBuf;

use thiserror::Error;

/// Errors that stop the runner before or after the batch, never in between.
///
/// Anything that goes wrong while a single job is in flight is folded into
/// that job's record instead; see [`crate::controller::JobController`].
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("ARISTOTLE_API_KEY is not set. Export it and re-run.")]
    MissingApiKey,

    #[error("context file not found: {}", .0.display())]
    MissingContextFile(PathBuf),

    #[error("input file not found: {}", .0.display())]
    MissingInputFile(PathBuf),

    #[error("input file has no usable module name: {}", .0.display())]
    InvalidInputName(PathBuf),

    #[error("Duplicate module identifier: {0}")]
    DuplicateModule(String),

    #[error("Invalid run report: {0}")]
    InvalidReport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_display_includes_path() {
        let err = RunnerError::MissingInputFile(PathBuf::from("properties/Approve.lean"));
        assert_eq!(
            err.to_string(),
            "input file not found: properties/Approve.lean"
        );
    }

    #[test]
    fn duplicate_module_display() {
        let err = RunnerError::DuplicateModule("Transfer".into());
        assert_eq!(err.to_string(), "Duplicate module identifier: Transfer");
    }
}
