//! Configuration management for the relevance pipeline

use crate::error::{RelevanceError, Result};
use crate::input::retry::RetryPolicy;
use crate::pipeline::types::ProcessingOptions;
use crate::processing::keywords::{ScoringConfig, DEFAULT_MIN_RELEVANCE_SCORE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub scoring: ScoringSettings,
    #[serde(default)]
    pub output: OutputConfig,
}

/// How the external extraction tool is run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub command: String,
    /// Arguments placed before `--url|--file`, e.g. a script path.
    pub args: Vec<String>,
    pub timeout_ms: u64,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub termination_grace_ms: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            command: "python3".to_string(),
            args: vec!["extract_text.py".to_string()],
            timeout_ms: 60_000,
            max_attempts: 3,
            base_delay_ms: 2_000,
            backoff_multiplier: 2.0,
            termination_grace_ms: 2_000,
        }
    }
}

impl ExtractionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            self.backoff_multiplier,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub concurrency: usize,
    pub force_reextract: bool,
    pub skip_analysis: bool,
    pub use_advanced_scoring: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            force_reextract: false,
            skip_analysis: false,
            use_advanced_scoring: false,
        }
    }
}

/// Overrides applied on top of the scoring keyword set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringSettings {
    pub min_relevance_score: f64,
    pub enable_fuzzy_matching: bool,
    pub enable_context_analysis: bool,
    /// TOML file holding a full scoring configuration; built-in keywords otherwise.
    pub keywords_file: Option<PathBuf>,
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            min_relevance_score: DEFAULT_MIN_RELEVANCE_SCORE,
            enable_fuzzy_matching: true,
            enable_context_analysis: true,
            keywords_file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub detailed: bool,
    pub color_output: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Console,
            detailed: false,
            color_output: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    Console,
    Json,
}

impl Config {
    /// Load from the default location, writing defaults on first use.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Self::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| {
            RelevanceError::Configuration(format!(
                "Failed to parse config {}: {}",
                path.display(),
                e
            ))
        })
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| {
            RelevanceError::Configuration(format!("Failed to serialize config: {}", e))
        })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
            .join("doc-relevance")
            .join("config.toml")
    }

    /// Scoring keywords from `keywords_file` (or the built-in set) with the
    /// settings' overrides applied.
    pub fn scoring_config(&self) -> Result<ScoringConfig> {
        let mut config = match &self.scoring.keywords_file {
            Some(path) => ScoringConfig::load(path)?,
            None => ScoringConfig::default(),
        };
        config.min_relevance_score = self.scoring.min_relevance_score;
        config.enable_fuzzy_matching = self.scoring.enable_fuzzy_matching;
        config.enable_context_analysis = self.scoring.enable_context_analysis;
        Ok(config)
    }

    pub fn processing_options(&self) -> ProcessingOptions {
        ProcessingOptions {
            force_reextract: self.batch.force_reextract,
            skip_analysis: self.batch.skip_analysis,
            use_advanced_scoring: self.batch.use_advanced_scoring,
            timeout: self.extraction.timeout(),
            concurrency: self.batch.concurrency.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.batch.concurrency, 3);
        assert_eq!(config.extraction.retry_policy(), RetryPolicy::default());
        assert_eq!(config.extraction.timeout(), Duration::from_secs(60));
        assert_eq!(config.output.format, OutputFormat::Console);
    }

    #[test]
    fn test_save_and_load_from() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.batch.concurrency = 7;
        config.extraction.command = "extractor".to_string();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[batch]\nconcurrency = 5\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.batch.concurrency, 5);
        assert_eq!(config.extraction.max_attempts, 3);
        assert!(config.scoring.enable_fuzzy_matching);
    }

    #[test]
    fn test_invalid_file_is_configuration_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[batch\n").unwrap();

        assert!(matches!(
            Config::load_from(&path),
            Err(RelevanceError::Configuration(_))
        ));
    }

    #[test]
    fn test_scoring_config_applies_overrides() {
        let dir = TempDir::new().unwrap();
        let keywords = dir.path().join("keywords.toml");
        std::fs::write(
            &keywords,
            r#"
[[keywords]]
term = "laneway house"
weight = 8.0
category = "include"
"#,
        )
        .unwrap();

        let mut config = Config::default();
        config.scoring.keywords_file = Some(keywords);
        config.scoring.min_relevance_score = 0.3;
        config.scoring.enable_fuzzy_matching = false;

        let scoring = config.scoring_config().unwrap();
        assert_eq!(scoring.keywords.len(), 1);
        assert_eq!(scoring.keywords[0].term, "laneway house");
        assert_eq!(scoring.min_relevance_score, 0.3);
        assert!(!scoring.enable_fuzzy_matching);
    }

    #[test]
    fn test_processing_options_from_config() {
        let mut config = Config::default();
        config.batch.concurrency = 0;
        config.batch.use_advanced_scoring = true;

        let options = config.processing_options();
        assert_eq!(options.concurrency, 1);
        assert!(options.use_advanced_scoring);
    }
}
