//! Include/exclude/priority/context scoring producing a 0-100 score

use crate::error::Result;
use crate::matching::term::{tokenize, MatchType};
use crate::processing::keyword_analyzer::{
    cap_keyword_contexts, density_per_thousand, sort_matches, KeywordMatch,
};
use crate::processing::keywords::{compile_keywords, CompiledKeyword, ScoringCategory, ScoringConfig};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

const PRIORITY_BONUS: f64 = 0.8;
const EXCLUDE_PENALTY: f64 = 1.5;
const FUZZY_BONUS: f64 = 0.2;
const VARIATION_BONUS: f64 = 0.1;
/// Occurrences per 1,000 words that earn a density bonus.
const DENSITY_SWEET_SPOT: (f64, f64) = (2.0, 20.0);
const DENSITY_BONUS_DIVISOR: f64 = 4.0;
const MAX_DENSITY_BONUS: f64 = 5.0;
const EXCLUDE_CONFIDENCE_PENALTY: f64 = 0.1;
const PRIORITY_CONFIDENCE_BONUS: f64 = 0.1;
const TOP_KEYWORDS: usize = 10;

pub const NO_CONTENT_ERROR: &str = "No content text available for scoring";

/// Verdict of the relevance scorer for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringResult {
    /// Within `[0, 100]`, rounded to two decimals.
    pub score: f64,
    pub is_relevant: bool,
    /// Within `[0, 1]`.
    pub confidence: f64,
    pub matches: Vec<KeywordMatch<ScoringCategory>>,
    pub total_matches: usize,
    /// Occurrences per 1,000 words.
    pub keyword_density: f64,
    pub density_bonus: f64,
    pub category_scores: BTreeMap<ScoringCategory, f64>,
    pub word_count: usize,
    pub character_count: usize,
    pub processing_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScoringResult {
    fn no_content(started: Instant) -> Self {
        Self {
            score: 0.0,
            is_relevant: false,
            confidence: 0.0,
            matches: Vec::new(),
            total_matches: 0,
            keyword_density: 0.0,
            density_bonus: 0.0,
            category_scores: BTreeMap::new(),
            word_count: 0,
            character_count: 0,
            processing_time_ms: started.elapsed().as_millis() as u64,
            error: Some(NO_CONTENT_ERROR.to_string()),
        }
    }
}

/// A scoring configuration with its keywords compiled.
#[derive(Debug, Clone)]
pub struct PreparedConfig {
    config: ScoringConfig,
    keywords: Vec<CompiledKeyword<ScoringCategory>>,
}

impl PreparedConfig {
    /// Validate and compile. Validation issues are returned as errors,
    /// warnings are logged.
    pub fn new(config: ScoringConfig) -> Result<Self> {
        for warning in config.validate().into_result()? {
            log::warn!("Scoring config: {}", warning);
        }
        let keywords = compile_keywords(&config.keywords)?;
        Ok(Self { config, keywords })
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentScore {
    pub document_id: String,
    pub result: ScoringResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordFrequency {
    pub keyword: String,
    pub occurrences: usize,
    pub documents: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchScoringResult {
    pub results: Vec<DocumentScore>,
    pub average_score: f64,
    pub average_confidence: f64,
    pub relevant_count: usize,
    /// Ten most frequent keywords across the batch.
    pub top_keywords: Vec<KeywordFrequency>,
    pub processing_time_ms: u64,
}

/// Scores text against an include/exclude/priority/context keyword set.
#[derive(Debug, Clone)]
pub struct RelevanceScorer {
    prepared: PreparedConfig,
}

impl RelevanceScorer {
    pub fn new(config: ScoringConfig) -> Result<Self> {
        Ok(Self {
            prepared: PreparedConfig::new(config)?,
        })
    }

    pub fn config(&self) -> &ScoringConfig {
        self.prepared.config()
    }

    pub fn prepared(&self) -> &PreparedConfig {
        &self.prepared
    }

    /// Score with the scorer's own configuration.
    pub fn score(&self, text: &str) -> ScoringResult {
        Self::score_with(text, &self.prepared)
    }

    /// Score with an explicit configuration.
    pub fn score_with(text: &str, prepared: &PreparedConfig) -> ScoringResult {
        let started = Instant::now();
        if text.trim().is_empty() {
            return ScoringResult::no_content(started);
        }

        let config = &prepared.config;
        let tokens = tokenize(text);
        let word_count = text.split_whitespace().count();
        let character_count = text.chars().count();

        let mut matches = Vec::new();
        for keyword in &prepared.keywords {
            let definition = &keyword.definition;
            if definition.category == ScoringCategory::Context && !config.enable_context_analysis {
                continue;
            }

            for detail in keyword
                .matcher
                .find(text, &tokens, config.enable_fuzzy_matching)
            {
                let base = definition.weight * detail.count as f64 * detail.similarity;
                let mut contribution = match definition.category {
                    ScoringCategory::Include => base,
                    ScoringCategory::Priority => base * (1.0 + PRIORITY_BONUS),
                    ScoringCategory::Exclude => -base * EXCLUDE_PENALTY,
                    ScoringCategory::Context => base * definition.effective_context_weight(),
                };

                if definition.category.is_positive() {
                    contribution += contribution
                        * match detail.match_type {
                            MatchType::Exact => 0.0,
                            MatchType::Variation => VARIATION_BONUS,
                            MatchType::Fuzzy => FUZZY_BONUS,
                        };
                }

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

        let total_matches: usize = matches.iter().map(|m| m.detail.count).sum();
        let raw: f64 = matches.iter().map(|m| m.contribution).sum();

        let keyword_density = density_per_thousand(total_matches, word_count);
        let density_bonus = if (DENSITY_SWEET_SPOT.0..=DENSITY_SWEET_SPOT.1).contains(&keyword_density) {
            (keyword_density / DENSITY_BONUS_DIVISOR).min(MAX_DENSITY_BONUS)
        } else {
            0.0
        };

        let score = round2(100.0 * ((raw + density_bonus) / 100.0).clamp(0.0, 1.0));
        let confidence = confidence(&matches);
        let is_relevant = score >= config.min_relevance_score * 100.0 && total_matches > 0;

        let mut category_scores = BTreeMap::new();
        for m in &matches {
            *category_scores.entry(m.category).or_insert(0.0) += m.contribution;
        }

        ScoringResult {
            score,
            is_relevant,
            confidence,
            matches,
            total_matches,
            keyword_density,
            density_bonus,
            category_scores,
            word_count,
            character_count,
            processing_time_ms: started.elapsed().as_millis() as u64,
            error: None,
        }
    }

    /// Score many `(id, text)` pairs with the scorer's configuration.
    ///
    /// Documents are walked in chunks of `concurrency_hint`; scoring itself is
    /// CPU-bound and runs sequentially.
    pub fn score_batch(&self, documents: &[(String, String)], concurrency_hint: usize) -> BatchScoringResult {
        let started = Instant::now();
        let chunk_size = concurrency_hint.max(1);
        let mut results = Vec::with_capacity(documents.len());

        for (index, chunk) in documents.chunks(chunk_size).enumerate() {
            debug!("Scoring chunk {} ({} documents)", index + 1, chunk.len());
            for (id, text) in chunk {
                results.push(DocumentScore {
                    document_id: id.clone(),
                    result: self.score(text),
                });
            }
        }

        let count = results.len().max(1) as f64;
        let average_score = round2(results.iter().map(|r| r.result.score).sum::<f64>() / count);
        let average_confidence = results.iter().map(|r| r.result.confidence).sum::<f64>() / count;
        let relevant_count = results.iter().filter(|r| r.result.is_relevant).count();
        let top_keywords = keyword_frequencies(&results);

        info!(
            "Scored {} documents: {} relevant, average score {:.2}",
            results.len(),
            relevant_count,
            average_score
        );

        BatchScoringResult {
            results,
            average_score,
            average_confidence,
            relevant_count,
            top_keywords,
            processing_time_ms: started.elapsed().as_millis() as u64,
        }
    }
}

fn confidence(matches: &[KeywordMatch<ScoringCategory>]) -> f64 {
    if matches.is_empty() {
        return 0.0;
    }

    let avg_similarity =
        matches.iter().map(|m| m.detail.similarity).sum::<f64>() / matches.len() as f64;
    let categories: BTreeSet<ScoringCategory> = matches.iter().map(|m| m.category).collect();
    let diversity = categories.len() as f64 / ScoringCategory::COUNT as f64;

    let mut confidence = 0.6 * avg_similarity + 0.3 * diversity;
    if categories.contains(&ScoringCategory::Exclude) {
        confidence -= EXCLUDE_CONFIDENCE_PENALTY;
    }
    if categories.contains(&ScoringCategory::Priority) {
        confidence += PRIORITY_CONFIDENCE_BONUS;
    }
    confidence.clamp(0.0, 1.0)
}

fn keyword_frequencies(results: &[DocumentScore]) -> Vec<KeywordFrequency> {
    let mut table: BTreeMap<&str, (usize, BTreeSet<&str>)> = BTreeMap::new();
    for doc in results {
        for m in &doc.result.matches {
            let entry = table.entry(m.detail.keyword.as_str()).or_default();
            entry.0 += m.detail.count;
            entry.1.insert(doc.document_id.as_str());
        }
    }

    let mut frequencies: Vec<KeywordFrequency> = table
        .into_iter()
        .map(|(keyword, (occurrences, docs))| KeywordFrequency {
            keyword: keyword.to_string(),
            occurrences,
            documents: docs.len(),
        })
        .collect();
    frequencies.sort_by(|a, b| b.occurrences.cmp(&a.occurrences).then_with(|| a.keyword.cmp(&b.keyword)));
    frequencies.truncate(TOP_KEYWORDS);
    frequencies
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::term::MAX_CONTEXTS_PER_KEYWORD;
    use crate::processing::keywords::KeywordDefinition;

    const ADU_SENTENCE: &str =
        "This bylaw permits an accessory dwelling unit (ADU) with a separate entrance.";

    fn scorer_with(keywords: Vec<KeywordDefinition<ScoringCategory>>) -> RelevanceScorer {
        RelevanceScorer::new(ScoringConfig {
            keywords,
            ..ScoringConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_default_config_relevant_sentence() {
        let scorer = RelevanceScorer::new(ScoringConfig::default()).unwrap();
        let result = scorer.score(ADU_SENTENCE);

        assert!(result.is_relevant);
        assert!(result.score >= 15.0);
        for keyword in ["accessory dwelling unit", "adu"] {
            assert!(result
                .matches
                .iter()
                .any(|m| m.detail.keyword == keyword && m.detail.match_type == MatchType::Exact));
        }
    }

    #[test]
    fn test_empty_text() {
        let scorer = RelevanceScorer::new(ScoringConfig::default()).unwrap();
        let result = scorer.score("");
        assert_eq!(result.score, 0.0);
        assert!(!result.is_relevant);
        assert_eq!(result.error.as_deref(), Some(NO_CONTENT_ERROR));
    }

    #[test]
    fn test_exclude_outweighs_include() {
        let scorer = scorer_with(vec![
            KeywordDefinition::new("garden suite", 5.0, ScoringCategory::Include),
            KeywordDefinition::new("hotel", 5.0, ScoringCategory::Exclude),
        ]);
        let result = scorer.score("garden suite hotel");
        assert_eq!(result.score, 0.0);
        assert!(!result.is_relevant);
        assert!(result.category_scores[&ScoringCategory::Exclude] < 0.0);
    }

    #[test]
    fn test_priority_gets_bonus() {
        let include = scorer_with(vec![KeywordDefinition::new("garden suite", 5.0, ScoringCategory::Include)]);
        let priority = scorer_with(vec![KeywordDefinition::new("garden suite", 5.0, ScoringCategory::Priority)]);

        let text = "A garden suite may be built behind the principal dwelling on any lot in the area.";
        let a = include.score(text);
        let b = priority.score(text);
        assert!((b.category_scores[&ScoringCategory::Priority] - 9.0).abs() < 1e-9);
        assert!(b.score > a.score);
        assert!(b.confidence > a.confidence);
    }

    #[test]
    fn test_context_weight_and_toggle() {
        let mut config = ScoringConfig {
            keywords: vec![
                KeywordDefinition::new("adu", 10.0, ScoringCategory::Include),
                KeywordDefinition::new("zoning", 4.0, ScoringCategory::Context).with_context_weight(0.25),
            ],
            ..ScoringConfig::default()
        };
        let text = "adu zoning";

        let result = RelevanceScorer::new(config.clone()).unwrap().score(text);
        assert!((result.category_scores[&ScoringCategory::Context] - 1.0).abs() < 1e-9);

        config.enable_context_analysis = false;
        let result = RelevanceScorer::new(config).unwrap().score(text);
        assert!(!result.category_scores.contains_key(&ScoringCategory::Context));
    }

    #[test]
    fn test_variation_bonus() {
        let scorer = scorer_with(vec![KeywordDefinition::new("adu", 10.0, ScoringCategory::Include)]);
        let filler = " lorem".repeat(99);
        let result = scorer.score(&format!("adus{}", filler));
        let adu = &result.matches[0];
        assert_eq!(adu.detail.match_type, MatchType::Variation);
        assert!((adu.contribution - 9.0 * 1.1).abs() < 1e-9);
    }

    #[test]
    fn test_density_sweet_spot() {
        let scorer = scorer_with(vec![KeywordDefinition::new("adu", 10.0, ScoringCategory::Include)]);

        // 1 match in 100 words = 10 per thousand
        let text = format!("adu{}", " word".repeat(99));
        let result = scorer.score(&text);
        assert!((result.keyword_density - 10.0).abs() < 1e-9);
        assert!((result.density_bonus - 2.5).abs() < 1e-9);
        assert_eq!(result.score, 12.5);

        // 1 match in 10 words is outside the band
        let text = format!("adu{}", " word".repeat(9));
        let result = scorer.score(&text);
        assert_eq!(result.density_bonus, 0.0);
        assert_eq!(result.score, 10.0);
    }

    #[test]
    fn test_score_bounded_and_rounded() {
        let scorer = RelevanceScorer::new(ScoringConfig::default()).unwrap();
        let result = scorer.score(&"adu garden suite secondary suite ".repeat(100));
        assert_eq!(result.score, 100.0);
        assert!(result.confidence <= 1.0);
    }

    #[test]
    fn test_contexts_capped_per_keyword() {
        let scorer = RelevanceScorer::new(ScoringConfig::default()).unwrap();
        let result = scorer.score(&"adu adus. ".repeat(10));
        let adu_contexts: usize = result
            .matches
            .iter()
            .filter(|m| m.detail.keyword == "adu")
            .map(|m| m.detail.contexts.len())
            .sum();
        assert!(adu_contexts <= MAX_CONTEXTS_PER_KEYWORD);
    }

    #[test]
    fn test_scoring_is_idempotent() {
        let scorer = RelevanceScorer::new(ScoringConfig::default()).unwrap();
        let mut a = scorer.score(ADU_SENTENCE);
        let mut b = scorer.score(ADU_SENTENCE);
        a.processing_time_ms = 0;
        b.processing_time_ms = 0;
        assert_eq!(a, b);
    }

    #[test]
    fn test_batch_scoring() {
        let scorer = RelevanceScorer::new(ScoringConfig::default()).unwrap();
        let documents = vec![
            ("a".to_string(), ADU_SENTENCE.to_string()),
            ("b".to_string(), "Library hours are changing.".to_string()),
            ("c".to_string(), "An ADU or garden suite needs a building permit.".to_string()),
        ];
        let batch = scorer.score_batch(&documents, 2);

        assert_eq!(batch.results.len(), 3);
        assert_eq!(batch.relevant_count, 2);
        assert_eq!(batch.top_keywords[0].keyword, "adu");
        assert_eq!(batch.top_keywords[0].documents, 2);
        assert!(batch.top_keywords.len() <= 10);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ScoringConfig {
            min_relevance_score: 3.0,
            ..ScoringConfig::default()
        };
        assert!(RelevanceScorer::new(config).is_err());
    }
}
