//! Common interface over the two scoring engines

use crate::matching::term::{MatchDetail, MatchType};
use crate::processing::keyword_analyzer::{AnalysisResult, KeywordAnalyzer};
use crate::processing::relevance_scorer::{RelevanceScorer, ScoringResult};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStrategy {
    /// Weighted primary/secondary/supporting/context keywords, 0-1 score.
    Keyword,
    /// Include/exclude/priority/context keywords, 0-100 score.
    Advanced,
}

impl AnalysisStrategy {
    pub fn from_flag(use_advanced_scoring: bool) -> Self {
        if use_advanced_scoring {
            AnalysisStrategy::Advanced
        } else {
            AnalysisStrategy::Keyword
        }
    }
}

impl fmt::Display for AnalysisStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisStrategy::Keyword => write!(f, "keyword"),
            AnalysisStrategy::Advanced => write!(f, "advanced"),
        }
    }
}

/// Result of either engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    Keyword(AnalysisResult),
    Advanced(ScoringResult),
}

impl AnalysisOutcome {
    pub fn strategy(&self) -> AnalysisStrategy {
        match self {
            AnalysisOutcome::Keyword(_) => AnalysisStrategy::Keyword,
            AnalysisOutcome::Advanced(_) => AnalysisStrategy::Advanced,
        }
    }

    pub fn is_relevant(&self) -> bool {
        match self {
            AnalysisOutcome::Keyword(r) => r.is_relevant,
            AnalysisOutcome::Advanced(r) => r.is_relevant,
        }
    }

    /// Score on a common 0-1 scale.
    pub fn relevance_fraction(&self) -> f64 {
        match self {
            AnalysisOutcome::Keyword(r) => r.relevance_score,
            AnalysisOutcome::Advanced(r) => r.score / 100.0,
        }
    }

    pub fn confidence(&self) -> f64 {
        match self {
            AnalysisOutcome::Keyword(r) => r.confidence_score,
            AnalysisOutcome::Advanced(r) => r.confidence,
        }
    }

    pub fn total_matches(&self) -> usize {
        match self {
            AnalysisOutcome::Keyword(r) => r.total_matches,
            AnalysisOutcome::Advanced(r) => r.total_matches,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            AnalysisOutcome::Keyword(r) => r.error.as_deref(),
            AnalysisOutcome::Advanced(r) => r.error.as_deref(),
        }
    }

    /// Evidence for every hit, strongest first.
    pub fn match_details(&self) -> Vec<&MatchDetail> {
        match self {
            AnalysisOutcome::Keyword(r) => r.matches.iter().map(|m| &m.detail).collect(),
            AnalysisOutcome::Advanced(r) => r.matches.iter().map(|m| &m.detail).collect(),
        }
    }

    /// `(keyword, match type, occurrences)` for every hit, strongest first.
    pub fn matched_keywords(&self) -> Vec<(&str, MatchType, usize)> {
        self.match_details()
            .into_iter()
            .map(|d| (d.keyword.as_str(), d.match_type, d.count))
            .collect()
    }

    /// Per-category score contributions, keyed by category name.
    pub fn category_scores(&self) -> Vec<(String, f64)> {
        match self {
            AnalysisOutcome::Keyword(r) => r
                .category_scores
                .iter()
                .map(|(c, s)| (c.to_string(), *s))
                .collect(),
            AnalysisOutcome::Advanced(r) => r
                .category_scores
                .iter()
                .map(|(c, s)| (c.to_string(), *s))
                .collect(),
        }
    }
}

/// A scoring engine that can judge one document's text.
pub trait DocumentAnalyzer: Send + Sync {
    fn strategy(&self) -> AnalysisStrategy;

    fn analyze_document(&self, document_id: &str, text: &str) -> AnalysisOutcome;
}

impl DocumentAnalyzer for KeywordAnalyzer {
    fn strategy(&self) -> AnalysisStrategy {
        AnalysisStrategy::Keyword
    }

    fn analyze_document(&self, document_id: &str, text: &str) -> AnalysisOutcome {
        AnalysisOutcome::Keyword(self.analyze(document_id, text))
    }
}

impl DocumentAnalyzer for RelevanceScorer {
    fn strategy(&self) -> AnalysisStrategy {
        AnalysisStrategy::Advanced
    }

    fn analyze_document(&self, _document_id: &str, text: &str) -> AnalysisOutcome {
        AnalysisOutcome::Advanced(self.score(text))
    }
}
