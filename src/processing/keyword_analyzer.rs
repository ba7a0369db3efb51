//! Weighted keyword analysis producing a 0-1 relevance and confidence pair

use crate::error::{RelevanceError, Result};
use crate::matching::term::{tokenize, MatchDetail, MAX_CONTEXTS_PER_KEYWORD};
use crate::processing::keywords::{
    compile_keywords, default_analyzer_keywords, validate_analyzer_keywords, AnalyzerKeyword,
    CompiledKeyword, KeywordCategory,
};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

/// Stored context snippets across all matches of one document.
pub const MAX_CONTEXTS_PER_DOCUMENT: usize = 5;

/// Weighted score that maps to a normalised relevance of 1.0.
const NORMALIZATION_DIVISOR: f64 = 50.0;
const PRIMARY_BONUS_PER_MATCH: f64 = 0.05;
const MAX_PRIMARY_BONUS: f64 = 0.2;
/// Matches per 1,000 words that earn the full density bonus.
const DENSITY_DIVISOR: f64 = 20.0;
const MAX_DENSITY_BONUS: f64 = 0.1;
const BASE_CONFIDENCE: f64 = 0.5;
const MAX_DIVERSITY_BONUS: f64 = 0.3;
const MAX_SIMILARITY_BONUS: f64 = 0.2;
const RELEVANCE_THRESHOLD: f64 = 0.15;

pub const NO_CONTENT_ERROR: &str = "No content text available for analysis";

/// A match tagged with the keyword's category and its share of the score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordMatch<C> {
    #[serde(flatten)]
    pub detail: MatchDetail,
    pub category: C,
    pub weight: f64,
    pub contribution: f64,
}

/// Verdict of the keyword analyzer for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub document_id: String,
    pub is_relevant: bool,
    /// Within `[0, 1]`.
    pub relevance_score: f64,
    /// Within `[0, 1]`.
    pub confidence_score: f64,
    pub matches: Vec<KeywordMatch<KeywordCategory>>,
    pub total_matches: usize,
    /// Matches per 1,000 words.
    pub keyword_density: f64,
    pub category_scores: BTreeMap<KeywordCategory, f64>,
    pub word_count: usize,
    pub character_count: usize,
    pub processing_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalysisResult {
    fn no_content(document_id: &str, started: Instant) -> Self {
        Self {
            document_id: document_id.to_string(),
            is_relevant: false,
            relevance_score: 0.0,
            confidence_score: 0.0,
            matches: Vec::new(),
            total_matches: 0,
            keyword_density: 0.0,
            category_scores: BTreeMap::new(),
            word_count: 0,
            character_count: 0,
            processing_time_ms: started.elapsed().as_millis() as u64,
            error: Some(NO_CONTENT_ERROR.to_string()),
        }
    }

    /// Keywords that fired, strongest first.
    pub fn matched_keywords(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        self.matches
            .iter()
            .filter(|m| seen.insert(m.detail.keyword.as_str()))
            .map(|m| m.detail.keyword.as_str())
            .collect()
    }
}

/// Applies a weighted keyword set to document text.
///
/// Keywords are compiled once at construction and are read-only afterwards,
/// so one analyzer can be shared across concurrent tasks.
#[derive(Debug, Clone)]
pub struct KeywordAnalyzer {
    keywords: Vec<CompiledKeyword<KeywordCategory>>,
    fuzzy_enabled: bool,
}

impl KeywordAnalyzer {
    /// Create an analyzer with the built-in keyword set
    pub fn new() -> Result<Self> {
        Self::with_keywords(default_analyzer_keywords())
    }

    /// Create an analyzer with a custom keyword set
    pub fn with_keywords(keywords: Vec<AnalyzerKeyword>) -> Result<Self> {
        let warnings = validate_analyzer_keywords(&keywords).into_result()?;
        for warning in warnings {
            log::warn!("Keyword set: {}", warning);
        }

        let keywords = compile_keywords(&keywords)?;
        if keywords.is_empty() {
            return Err(RelevanceError::Configuration(
                "keyword analyzer needs at least one active keyword".to_string(),
            ));
        }

        Ok(Self {
            keywords,
            fuzzy_enabled: true,
        })
    }

    pub fn with_fuzzy(mut self, enabled: bool) -> Self {
        self.fuzzy_enabled = enabled;
        self
    }

    pub fn keyword_count(&self) -> usize {
        self.keywords.len()
    }

    /// Score one document. Never fails: empty text yields a zero result
    /// carrying [`NO_CONTENT_ERROR`].
    pub fn analyze(&self, document_id: &str, text: &str) -> AnalysisResult {
        let started = Instant::now();
        if text.trim().is_empty() {
            return AnalysisResult::no_content(document_id, started);
        }

        let tokens = tokenize(text);
        let word_count = text.split_whitespace().count();
        let character_count = text.chars().count();

        let mut matches = Vec::new();
        for keyword in &self.keywords {
            let definition = &keyword.definition;
            for detail in keyword.matcher.find(text, &tokens, self.fuzzy_enabled) {
                let contribution = definition.category.multiplier()
                    * definition.weight
                    * detail.count as f64
                    * detail.similarity;
                matches.push(KeywordMatch {
                    detail,
                    category: definition.category,
                    weight: definition.weight,
                    contribution,
                });
            }
        }

        sort_matches(&mut matches);
        cap_keyword_contexts(&mut matches);
        cap_contexts(&mut matches, MAX_CONTEXTS_PER_DOCUMENT);

        let total_matches: usize = matches.iter().map(|m| m.detail.count).sum();
        let weighted: f64 = matches.iter().map(|m| m.contribution).sum();
        let normalized = (weighted / NORMALIZATION_DIVISOR).clamp(0.0, 1.0);

        let primary_matches: usize = matches
            .iter()
            .filter(|m| m.category == KeywordCategory::Primary)
            .map(|m| m.detail.count)
            .sum();
        let primary_bonus = (primary_matches as f64 * PRIMARY_BONUS_PER_MATCH).min(MAX_PRIMARY_BONUS);

        let keyword_density = density_per_thousand(total_matches, word_count);
        let density_bonus = (keyword_density / DENSITY_DIVISOR).min(1.0) * MAX_DENSITY_BONUS;

        let relevance_score = (normalized + primary_bonus + density_bonus).clamp(0.0, 1.0);
        let confidence_score = confidence(&matches);

        let mut category_scores = BTreeMap::new();
        for m in &matches {
            *category_scores.entry(m.category).or_insert(0.0) += m.contribution;
        }

        let is_relevant = relevance_score > RELEVANCE_THRESHOLD && !matches.is_empty();

        debug!(
            "Analyzed {}: relevance={:.3} confidence={:.3} matches={}",
            document_id, relevance_score, confidence_score, total_matches
        );

        AnalysisResult {
            document_id: document_id.to_string(),
            is_relevant,
            relevance_score,
            confidence_score,
            matches,
            total_matches,
            keyword_density,
            category_scores,
            word_count,
            character_count,
            processing_time_ms: started.elapsed().as_millis() as u64,
            error: None,
        }
    }
}

fn confidence(matches: &[KeywordMatch<KeywordCategory>]) -> f64 {
    if matches.is_empty() {
        return BASE_CONFIDENCE;
    }

    let categories: BTreeSet<KeywordCategory> = matches.iter().map(|m| m.category).collect();
    let diversity = categories.len() as f64 / KeywordCategory::COUNT as f64;

    let avg_similarity =
        matches.iter().map(|m| m.detail.similarity).sum::<f64>() / matches.len() as f64;
    let similarity_bonus = if avg_similarity > 0.5 {
        ((avg_similarity - 0.5) / 0.5 * MAX_SIMILARITY_BONUS).min(MAX_SIMILARITY_BONUS)
    } else {
        0.0
    };

    (BASE_CONFIDENCE + diversity * MAX_DIVERSITY_BONUS + similarity_bonus).clamp(0.0, 1.0)
}

/// Occurrences per 1,000 words.
pub(crate) fn density_per_thousand(matches: usize, words: usize) -> f64 {
    if words == 0 {
        0.0
    } else {
        matches as f64 / words as f64 * 1000.0
    }
}

/// Strongest contribution first; ties broken by keyword then match type so
/// the order is reproducible.
pub(crate) fn sort_matches<C>(matches: &mut [KeywordMatch<C>]) {
    matches.sort_by(|a, b| {
        b.contribution
            .abs()
            .total_cmp(&a.contribution.abs())
            .then_with(|| a.detail.keyword.cmp(&b.detail.keyword))
            .then_with(|| a.detail.match_type.cmp(&b.detail.match_type))
    });
}

/// A keyword that hit in several tiers still keeps at most
/// `MAX_CONTEXTS_PER_KEYWORD` snippets in total.
pub(crate) fn cap_keyword_contexts<C>(matches: &mut [KeywordMatch<C>]) {
    let mut used: BTreeMap<String, usize> = BTreeMap::new();
    for m in matches.iter_mut() {
        let count = used.entry(m.detail.keyword.clone()).or_insert(0);
        let keep = m
            .detail
            .contexts
            .len()
            .min(MAX_CONTEXTS_PER_KEYWORD.saturating_sub(*count));
        m.detail.contexts.truncate(keep);
        *count += keep;
    }
}

/// Keep at most `limit` context snippets across all matches, in match order.
pub(crate) fn cap_contexts<C>(matches: &mut [KeywordMatch<C>], limit: usize) {
    let mut remaining = limit;
    for m in matches.iter_mut() {
        let keep = m.detail.contexts.len().min(remaining);
        m.detail.contexts.truncate(keep);
        remaining -= keep;
    }
}
