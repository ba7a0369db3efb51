//! Data types exchanged with the pipeline's callers

use crate::input::text_extractor::ExtractionMetadata;
use crate::pipeline::progress::DocumentStatus;
use crate::processing::strategy::AnalysisOutcome;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// One unit of work, as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentItem {
    pub id: String,
    pub source_url: String,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub content_text: Option<String>,
    #[serde(default)]
    pub content_hash: Option<String>,
}

impl DocumentItem {
    pub fn new(id: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source_url: source_url.into(),
            group_id: None,
            content_text: None,
            content_hash: None,
        }
    }

    pub fn with_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    pub fn with_content(mut self, text: impl Into<String>) -> Self {
        self.content_text = Some(text.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingOptions {
    pub force_reextract: bool,
    pub skip_analysis: bool,
    pub use_advanced_scoring: bool,
    /// Per-attempt extraction timeout.
    pub timeout: Duration,
    pub concurrency: usize,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            force_reextract: false,
            skip_analysis: false,
            use_advanced_scoring: false,
            timeout: Duration::from_secs(60),
            concurrency: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPhase {
    Extraction,
    Analysis,
}

impl fmt::Display for ErrorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorPhase::Extraction => write!(f, "extraction"),
            ErrorPhase::Analysis => write!(f, "analysis"),
        }
    }
}

/// A per-document failure recorded without stopping the batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItemError {
    pub document_id: String,
    pub phase: ErrorPhase,
    pub message: String,
    pub retryable: bool,
}

/// Outcome of processing one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub document_id: String,
    pub success: bool,
    pub content_extracted: bool,
    pub content_analyzed: bool,
    pub was_cached: bool,
    pub content_hash: Option<String>,
    pub content_changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_text: Option<String>,
    pub extraction_metadata: Option<ExtractionMetadata>,
    pub analysis: Option<AnalysisOutcome>,
    pub error: Option<String>,
    pub errors: Vec<BatchItemError>,
    pub status: DocumentStatus,
    pub processing_time_ms: u64,
}

impl ProcessingResult {
    pub fn new(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            success: false,
            content_extracted: false,
            content_analyzed: false,
            was_cached: false,
            content_hash: None,
            content_changed: false,
            content_text: None,
            extraction_metadata: None,
            analysis: None,
            error: None,
            errors: Vec::new(),
            status: DocumentStatus::Pending,
            processing_time_ms: 0,
        }
    }

    /// A failed result with a single error in `phase`.
    pub fn failed(
        document_id: impl Into<String>,
        phase: ErrorPhase,
        message: impl Into<String>,
        retryable: bool,
    ) -> Self {
        let mut result = Self::new(document_id);
        let message = message.into();
        result.errors.push(BatchItemError {
            document_id: result.document_id.clone(),
            phase,
            message: message.clone(),
            retryable,
        });
        result.error = Some(message);
        result.status = DocumentStatus::Error;
        result
    }

    pub fn is_relevant(&self) -> bool {
        self.analysis
            .as_ref()
            .map(|a| a.is_relevant())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// Freshly extracted; cache hits are counted under `cached`.
    pub extracted: usize,
    pub analyzed: usize,
    pub cached: usize,
    pub relevant: usize,
    pub elapsed_ms: u64,
    /// Documents per minute of wall-clock time.
    pub throughput_per_minute: f64,
}

impl BatchSummary {
    pub fn from_results(results: &[ProcessingResult], elapsed: Duration) -> Self {
        let minutes = elapsed.as_secs_f64() / 60.0;
        let total = results.len();
        Self {
            total,
            successful: results.iter().filter(|r| r.success).count(),
            failed: results.iter().filter(|r| !r.success).count(),
            extracted: results
                .iter()
                .filter(|r| r.content_extracted && !r.was_cached)
                .count(),
            analyzed: results.iter().filter(|r| r.content_analyzed).count(),
            cached: results.iter().filter(|r| r.was_cached).count(),
            relevant: results.iter().filter(|r| r.is_relevant()).count(),
            elapsed_ms: elapsed.as_millis() as u64,
            throughput_per_minute: if minutes > 0.0 {
                total as f64 / minutes
            } else {
                0.0
            },
        }
    }
}

/// Everything a batch run produced. `results` are in completion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchProcessingResult {
    pub results: Vec<ProcessingResult>,
    pub summary: BatchSummary,
    pub errors: Vec<BatchItemError>,
    pub cancelled: bool,
}

impl BatchProcessingResult {
    /// Results ordered by document id.
    pub fn sorted_results(&self) -> Vec<&ProcessingResult> {
        let mut sorted: Vec<&ProcessingResult> = self.results.iter().collect();
        sorted.sort_by(|a, b| a.document_id.cmp(&b.document_id));
        sorted
    }
}
