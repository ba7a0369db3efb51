//! Keyword definitions and the two scoring engines

pub mod keywords;
pub mod keyword_analyzer;
pub mod relevance_scorer;
pub mod strategy;

pub use keyword_analyzer::{AnalysisResult, KeywordAnalyzer};
pub use relevance_scorer::{PreparedConfig, RelevanceScorer, ScoringResult};
pub use strategy::{AnalysisOutcome, AnalysisStrategy, DocumentAnalyzer};
