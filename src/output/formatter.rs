//! Output formatters for analysis outcomes, extractions and batch runs

use crate::config::OutputFormat;
use crate::error::Result;
use crate::input::text_extractor::ExtractionResult;
use crate::pipeline::types::BatchProcessingResult;
use crate::processing::strategy::AnalysisOutcome;
use colored::{Color, Colorize};
use serde_json::json;

/// Renders pipeline results for a human or another program.
pub trait OutputFormatter {
    fn format_analysis(&self, document_id: &str, outcome: &AnalysisOutcome) -> Result<String>;
    fn format_extraction(&self, source: &str, result: &ExtractionResult) -> Result<String>;
    fn format_batch(&self, batch: &BatchProcessingResult) -> Result<String>;
    fn supports_format(&self) -> OutputFormat;
}

/// Build the formatter configured for `format`.
pub fn formatter_for(format: OutputFormat, use_colors: bool, detailed: bool) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::Console => Box::new(ConsoleFormatter::new(use_colors, detailed)),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
    }
}

/// Console formatter with optional colours
pub struct ConsoleFormatter {
    use_colors: bool,
    detailed: bool,
}

/// JSON formatter for scripting
pub struct JsonFormatter {
    pretty: bool,
}

impl ConsoleFormatter {
    pub fn new(use_colors: bool, detailed: bool) -> Self {
        Self { use_colors, detailed }
    }

    fn colorize(&self, text: &str, color: Color) -> String {
        if self.use_colors {
            text.color(color).to_string()
        } else {
            text.to_string()
        }
    }

    fn format_header(&self, title: &str) -> String {
        if self.use_colors {
            format!("\n{}\n", title.color(Color::Blue).bold())
        } else {
            format!("\n{}\n", title)
        }
    }

    fn format_verdict(&self, relevant: bool) -> String {
        let (label, color) = if relevant {
            ("RELEVANT", Color::Green)
        } else {
            ("NOT RELEVANT", Color::Red)
        };

        if self.use_colors {
            format!("[{}]", label.color(color).bold())
        } else {
            format!("[{}]", label)
        }
    }

    fn format_outcome_body(&self, outcome: &AnalysisOutcome) -> String {
        let mut output = String::new();

        let score = match outcome {
            AnalysisOutcome::Keyword(r) => format!("{:.3}", r.relevance_score),
            AnalysisOutcome::Advanced(r) => format!("{:.2}/100", r.score),
        };
        output.push_str(&format!(
            "{} score {} | confidence {:.2} | {} matches | strategy {}\n",
            self.format_verdict(outcome.is_relevant()),
            score,
            outcome.confidence(),
            outcome.total_matches(),
            outcome.strategy()
        ));

        if let Some(error) = outcome.error() {
            output.push_str(&format!("{} {}\n", self.colorize("error:", Color::Red), error));
        }

        for detail in outcome.match_details() {
            output.push_str(&format!(
                "  {} {} ×{} ({}, similarity {:.2})\n",
                self.colorize("•", Color::Cyan),
                detail.keyword,
                detail.count,
                detail.match_type,
                detail.similarity
            ));

            if self.detailed {
                for context in &detail.contexts {
                    output.push_str(&format!("      {}\n", self.colorize(context, Color::BrightBlack)));
                }
            }
        }

        if self.detailed {
            let categories = outcome.category_scores();
            if !categories.is_empty() {
                output.push_str("  categories:");
                for (category, score) in categories {
                    output.push_str(&format!(" {}={:.2}", category, score));
                }
                output.push('\n');
            }
        }

        output
    }
}

impl OutputFormatter for ConsoleFormatter {
    fn format_analysis(&self, document_id: &str, outcome: &AnalysisOutcome) -> Result<String> {
        let mut output = self.format_header(&format!("Document {}", document_id));
        output.push_str(&self.format_outcome_body(outcome));
        Ok(output)
    }

    fn format_extraction(&self, source: &str, result: &ExtractionResult) -> Result<String> {
        let mut output = self.format_header(&format!("Extraction of {}", source));

        if !result.success {
            output.push_str(&format!(
                "{} after {} attempt(s): {}\n",
                self.colorize("FAILED", Color::Red),
                result.attempts,
                result.error.as_deref().unwrap_or("unknown error")
            ));
            return Ok(output);
        }

        output.push_str(&format!(
            "{} in {} attempt(s), {}ms\n",
            self.colorize("OK", Color::Green),
            result.attempts,
            result.duration_ms
        ));
        if let Some(hash) = &result.content_hash {
            output.push_str(&format!("sha256: {}\n", hash));
        }
        if let Some(metadata) = &result.metadata {
            output.push_str(&format!(
                "{} words, {} lines, {} chars via {}\n",
                metadata.word_count,
                metadata.line_count,
                metadata.character_count,
                metadata.extraction_method
            ));
        }
        if self.detailed {
            if let Some(text) = &result.text {
                output.push('\n');
                output.push_str(text);
                output.push('\n');
            }
        }

        Ok(output)
    }

    fn format_batch(&self, batch: &BatchProcessingResult) -> Result<String> {
        let summary = &batch.summary;
        let mut output = self.format_header("Batch summary");

        output.push_str(&format!(
            "{} documents: {} ok, {} failed | {} extracted, {} cached, {} analysed, {} relevant\n",
            summary.total,
            self.colorize(&summary.successful.to_string(), Color::Green),
            self.colorize(&summary.failed.to_string(), Color::Red),
            summary.extracted,
            summary.cached,
            summary.analyzed,
            summary.relevant
        ));
        output.push_str(&format!(
            "elapsed {:.1}s | {:.1} documents/min\n",
            summary.elapsed_ms as f64 / 1000.0,
            summary.throughput_per_minute
        ));
        if batch.cancelled {
            output.push_str(&format!("{}\n", self.colorize("batch was cancelled", Color::Yellow)));
        }

        output.push_str(&self.format_header("Documents"));
        for result in batch.sorted_results() {
            let status = if result.success {
                self.colorize("ok", Color::Green)
            } else {
                self.colorize("failed", Color::Red)
            };
            let verdict = match &result.analysis {
                Some(outcome) if outcome.error().is_none() => {
                    format!(" {}", self.format_verdict(outcome.is_relevant()))
                }
                _ => String::new(),
            };
            let cached = if result.was_cached { " (cached)" } else { "" };
            output.push_str(&format!("  {} {}{}{}\n", result.document_id, status, cached, verdict));

            if let Some(error) = &result.error {
                output.push_str(&format!("      {}\n", self.colorize(error, Color::BrightBlack)));
            }
            if self.detailed {
                if let Some(outcome) = &result.analysis {
                    for line in self.format_outcome_body(outcome).lines() {
                        output.push_str(&format!("      {}\n", line));
                    }
                }
            }
        }

        if !batch.errors.is_empty() {
            output.push_str(&self.format_header("Errors"));
            for error in &batch.errors {
                output.push_str(&format!(
                    "  {} [{}{}] {}\n",
                    error.document_id,
                    error.phase,
                    if error.retryable { ", retryable" } else { "" },
                    error.message
                ));
            }
        }

        Ok(output)
    }

    fn supports_format(&self) -> OutputFormat {
        OutputFormat::Console
    }
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn render<T: serde::Serialize>(&self, value: &T) -> Result<String> {
        if self.pretty {
            Ok(serde_json::to_string_pretty(value)?)
        } else {
            Ok(serde_json::to_string(value)?)
        }
    }
}

impl OutputFormatter for JsonFormatter {
    fn format_analysis(&self, document_id: &str, outcome: &AnalysisOutcome) -> Result<String> {
        self.render(&json!({ "document_id": document_id, "analysis": outcome }))
    }

    fn format_extraction(&self, source: &str, result: &ExtractionResult) -> Result<String> {
        self.render(&json!({ "source": source, "extraction": result }))
    }

    fn format_batch(&self, batch: &BatchProcessingResult) -> Result<String> {
        self.render(batch)
    }

    fn supports_format(&self) -> OutputFormat {
        OutputFormat::Json
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::{BatchSummary, ErrorPhase, ProcessingResult};
    use crate::processing::keyword_analyzer::KeywordAnalyzer;
    use crate::processing::strategy::DocumentAnalyzer;
    use std::time::Duration;

    fn outcome() -> AnalysisOutcome {
        KeywordAnalyzer::new().unwrap().analyze_document(
            "doc-1",
            "This bylaw permits an accessory dwelling unit (ADU) with a separate entrance.",
        )
    }

    fn batch() -> BatchProcessingResult {
        let mut ok = ProcessingResult::new("b");
        ok.success = true;
        ok.analysis = Some(outcome());
        let failed = ProcessingResult::failed("a", ErrorPhase::Extraction, "timed out", true);
        let results = vec![ok, failed];
        BatchProcessingResult {
            summary: BatchSummary::from_results(&results, Duration::from_secs(1)),
            errors: results[1].errors.clone(),
            results,
            cancelled: false,
        }
    }

    #[test]
    fn test_console_analysis_without_colors() {
        let formatter = ConsoleFormatter::new(false, true);
        let text = formatter.format_analysis("doc-1", &outcome()).unwrap();

        assert!(text.contains("[RELEVANT]"));
        assert!(text.contains("accessory dwelling unit"));
        assert!(text.contains("categories:"));
    }

    #[test]
    fn test_console_batch_lists_errors_sorted() {
        let formatter = ConsoleFormatter::new(false, false);
        let text = formatter.format_batch(&batch()).unwrap();

        assert!(text.contains("2 documents: 1 ok, 1 failed"));
        assert!(text.contains("[extraction, retryable] timed out"));
        let a = text.find("  a failed").unwrap();
        let b = text.find("  b ok").unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_json_batch_round_trips() {
        let formatter = JsonFormatter::new(false);
        let text = formatter.format_batch(&batch()).unwrap();
        let parsed: BatchProcessingResult = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.summary.failed, 1);
        assert_eq!(formatter.supports_format(), OutputFormat::Json);
    }

    #[test]
    fn test_formatter_for() {
        assert_eq!(
            formatter_for(OutputFormat::Console, false, false).supports_format(),
            OutputFormat::Console
        );
        assert_eq!(
            formatter_for(OutputFormat::Json, false, false).supports_format(),
            OutputFormat::Json
        );
    }
}
