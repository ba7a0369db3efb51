//! Error handling for the relevance pipeline

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelevanceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Analysis error: {0}")]
    Analysis(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Processing error: {0}")]
    Processing(String),
}

/// Failure of a single extraction attempt.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("failed to start extraction tool '{tool}': {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("extraction tool exited with {code}: {stderr}")]
    NonZeroExit { code: String, stderr: String },

    #[error("extraction tool produced malformed output: {0}")]
    MalformedOutput(String),

    #[error("extraction tool reported failure: {0}")]
    ToolReported(String),

    #[error("I/O error while talking to extraction tool: {0}")]
    Io(#[from] std::io::Error),

    #[error("extraction timed out after {0:?}")]
    Timeout(Duration),

    #[error("extraction cancelled")]
    Cancelled,
}

impl ExtractionError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ExtractionError::Spawn { source, .. } => {
                source.kind() != std::io::ErrorKind::NotFound
            }
            ExtractionError::Cancelled => false,
            ExtractionError::NonZeroExit { .. }
            | ExtractionError::MalformedOutput(_)
            | ExtractionError::ToolReported(_)
            | ExtractionError::Io(_)
            | ExtractionError::Timeout(_) => true,
        }
    }
}

pub type Result<T> = std::result::Result<T, RelevanceError>;

/// Convert anyhow errors to our custom error type
impl From<anyhow::Error> for RelevanceError {
    fn from(err: anyhow::Error) -> Self {
        RelevanceError::Processing(err.to_string())
    }
}

impl From<toml::de::Error> for RelevanceError {
    fn from(err: toml::de::Error) -> Self {
        RelevanceError::Configuration(format!("Failed to parse TOML: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_tool_is_not_retryable() {
        let err = ExtractionError::Spawn {
            tool: "missing-tool".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_timeout_is_retryable() {
        assert!(ExtractionError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(ExtractionError::MalformedOutput("eof".to_string()).is_retryable());
        assert!(!ExtractionError::Cancelled.is_retryable());
    }

    #[test]
    fn test_extraction_error_wraps_into_crate_error() {
        let err: RelevanceError = ExtractionError::ToolReported("bad pdf".to_string()).into();
        assert!(err.to_string().contains("bad pdf"));
    }
}
