//! Keyword definitions, categories and configuration validation

use crate::error::{RelevanceError, Result};
use crate::matching::term::{TermMatcher, DEFAULT_FUZZY_THRESHOLD};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

pub const MIN_WEIGHT: f64 = 1.0;
pub const MAX_WEIGHT: f64 = 10.0;
pub const MIN_FUZZY_THRESHOLD: f64 = 0.5;
pub const DEFAULT_CONTEXT_WEIGHT: f64 = 0.5;
pub const DEFAULT_MIN_RELEVANCE_SCORE: f64 = 0.15;

/// Keyword classes used by the keyword analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeywordCategory {
    Primary,
    Secondary,
    Supporting,
    Context,
}

impl KeywordCategory {
    pub const COUNT: usize = 4;

    /// Weight applied to every hit in this category.
    pub fn multiplier(self) -> f64 {
        match self {
            KeywordCategory::Primary => 1.0,
            KeywordCategory::Secondary => 0.8,
            KeywordCategory::Supporting => 0.6,
            KeywordCategory::Context => 0.3,
        }
    }
}

impl fmt::Display for KeywordCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeywordCategory::Primary => write!(f, "primary"),
            KeywordCategory::Secondary => write!(f, "secondary"),
            KeywordCategory::Supporting => write!(f, "supporting"),
            KeywordCategory::Context => write!(f, "context"),
        }
    }
}

/// Keyword classes used by the relevance scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringCategory {
    Include,
    Exclude,
    Priority,
    Context,
}

impl ScoringCategory {
    pub const COUNT: usize = 4;

    /// Categories whose hits push a document towards relevance.
    pub fn is_positive(self) -> bool {
        !matches!(self, ScoringCategory::Exclude)
    }
}

impl fmt::Display for ScoringCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoringCategory::Include => write!(f, "include"),
            ScoringCategory::Exclude => write!(f, "exclude"),
            ScoringCategory::Priority => write!(f, "priority"),
            ScoringCategory::Context => write!(f, "context"),
        }
    }
}

fn default_active() -> bool {
    true
}

/// One scoring term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordDefinition<C> {
    pub term: String,
    /// 1 to 10.
    pub weight: f64,
    pub category: C,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuzzy_threshold: Option<f64>,
    /// Fraction of a context hit that counts towards the score.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_weight: Option<f64>,
}

pub type AnalyzerKeyword = KeywordDefinition<KeywordCategory>;
pub type ScoringKeyword = KeywordDefinition<ScoringCategory>;

impl<C> KeywordDefinition<C> {
    pub fn new(term: impl Into<String>, weight: f64, category: C) -> Self {
        Self {
            term: term.into(),
            weight,
            category,
            is_active: true,
            fuzzy_threshold: None,
            context_weight: None,
        }
    }

    pub fn with_fuzzy_threshold(mut self, threshold: f64) -> Self {
        self.fuzzy_threshold = Some(threshold);
        self
    }

    pub fn with_context_weight(mut self, weight: f64) -> Self {
        self.context_weight = Some(weight);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn effective_fuzzy_threshold(&self) -> f64 {
        self.fuzzy_threshold.unwrap_or(DEFAULT_FUZZY_THRESHOLD)
    }

    pub fn effective_context_weight(&self) -> f64 {
        self.context_weight.unwrap_or(DEFAULT_CONTEXT_WEIGHT)
    }
}

/// A keyword together with its compiled matcher, built once per run.
#[derive(Debug, Clone)]
pub struct CompiledKeyword<C> {
    pub definition: KeywordDefinition<C>,
    pub matcher: TermMatcher,
}

/// Compile the active keywords of a set. Inactive ones are skipped.
pub fn compile_keywords<C: Clone>(keywords: &[KeywordDefinition<C>]) -> Result<Vec<CompiledKeyword<C>>> {
    keywords
        .iter()
        .filter(|k| k.is_active)
        .map(|k| {
            Ok(CompiledKeyword {
                definition: k.clone(),
                matcher: TermMatcher::new(&k.term, k.effective_fuzzy_threshold())?,
            })
        })
        .collect()
}

/// Outcome of a configuration validation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    /// Turn blocking issues into an error, handing back the warnings otherwise.
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.issues.is_empty() {
            Ok(self.warnings)
        } else {
            Err(RelevanceError::Configuration(self.issues.join("; ")))
        }
    }
}

/// Check weights, thresholds and duplicate terms of a keyword list.
pub fn validate_keywords<C: fmt::Display>(keywords: &[KeywordDefinition<C>]) -> ValidationReport {
    let mut report = ValidationReport::default();
    let mut seen = HashSet::new();

    for keyword in keywords {
        let term = keyword.term.trim().to_lowercase();
        if term.is_empty() {
            report.issues.push("Keyword with empty term".to_string());
            continue;
        }

        if !(MIN_WEIGHT..=MAX_WEIGHT).contains(&keyword.weight) {
            report.issues.push(format!(
                "Keyword '{}' has weight {} outside {}-{}",
                term, keyword.weight, MIN_WEIGHT, MAX_WEIGHT
            ));
        }

        if let Some(threshold) = keyword.fuzzy_threshold {
            if !(MIN_FUZZY_THRESHOLD..=1.0).contains(&threshold) {
                report.issues.push(format!(
                    "Keyword '{}' has fuzzy threshold {} outside {}-1.0",
                    term, threshold, MIN_FUZZY_THRESHOLD
                ));
            }
        }

        if let Some(context_weight) = keyword.context_weight {
            if !(0.0..=1.0).contains(&context_weight) {
                report.issues.push(format!(
                    "Keyword '{}' has context weight {} outside 0.0-1.0",
                    term, context_weight
                ));
            }
        }

        if !seen.insert(term.clone()) {
            report.issues.push(format!(
                "Duplicate keyword '{}' ({})",
                term, keyword.category
            ));
        }
    }

    if !keywords.iter().any(|k| k.is_active) {
        report.warnings.push("No active keywords defined".to_string());
    }

    report
}

/// Validate a keyword set intended for the keyword analyzer.
pub fn validate_analyzer_keywords(keywords: &[AnalyzerKeyword]) -> ValidationReport {
    let mut report = validate_keywords(keywords);
    if !keywords
        .iter()
        .any(|k| k.is_active && k.category == KeywordCategory::Primary)
    {
        report
            .warnings
            .push("No primary keywords defined; relevance will rely on weaker categories".to_string());
    }
    report
}

fn default_min_relevance_score() -> f64 {
    DEFAULT_MIN_RELEVANCE_SCORE
}

fn default_enabled() -> bool {
    true
}

/// Keyword configuration for the relevance scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default)]
    pub keywords: Vec<ScoringKeyword>,
    /// Fraction of 100 a document must reach to be relevant.
    #[serde(default = "default_min_relevance_score")]
    pub min_relevance_score: f64,
    #[serde(default = "default_enabled")]
    pub enable_fuzzy_matching: bool,
    #[serde(default = "default_enabled")]
    pub enable_context_analysis: bool,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            keywords: default_scoring_keywords(),
            min_relevance_score: DEFAULT_MIN_RELEVANCE_SCORE,
            enable_fuzzy_matching: true,
            enable_context_analysis: true,
        }
    }
}

impl ScoringConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content).map_err(|e| {
            RelevanceError::Configuration(format!("{}: {}", path.display(), e))
        })
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| {
            RelevanceError::Configuration(format!("Failed to serialize keywords: {}", e))
        })
    }

    pub fn validate(&self) -> ValidationReport {
        let mut report = validate_keywords(&self.keywords);

        if !(0.0..=1.0).contains(&self.min_relevance_score) {
            report.issues.push(format!(
                "min_relevance_score {} outside 0.0-1.0",
                self.min_relevance_score
            ));
        }

        let has_positive = self.keywords.iter().any(|k| {
            k.is_active
                && matches!(k.category, ScoringCategory::Include | ScoringCategory::Priority)
        });
        if !has_positive {
            report
                .warnings
                .push("No include or priority keywords defined; no document can score highly".to_string());
        }

        report
    }
}

/// Built-in keyword set for the keyword analyzer.
pub fn default_analyzer_keywords() -> Vec<AnalyzerKeyword> {
    use KeywordCategory::*;

    vec![
        KeywordDefinition::new("accessory dwelling unit", 10.0, Primary),
        KeywordDefinition::new("adu", 10.0, Primary),
        KeywordDefinition::new("additional dwelling unit", 10.0, Primary),
        KeywordDefinition::new("secondary suite", 9.0, Primary),
        KeywordDefinition::new("garden suite", 9.0, Primary),
        KeywordDefinition::new("laneway house", 9.0, Primary),
        KeywordDefinition::new("coach house", 8.0, Secondary),
        KeywordDefinition::new("granny flat", 8.0, Secondary),
        KeywordDefinition::new("in-law suite", 8.0, Secondary),
        KeywordDefinition::new("basement apartment", 7.0, Secondary),
        KeywordDefinition::new("carriage house", 7.0, Secondary),
        KeywordDefinition::new("tiny home", 6.0, Secondary),
        KeywordDefinition::new("bylaw", 5.0, Supporting),
        KeywordDefinition::new("zoning", 5.0, Supporting),
        KeywordDefinition::new("setback", 4.0, Supporting),
        KeywordDefinition::new("lot coverage", 4.0, Supporting),
        KeywordDefinition::new("permit", 4.0, Supporting),
        KeywordDefinition::new("parking", 3.0, Supporting),
        KeywordDefinition::new("dwelling", 3.0, Context),
        KeywordDefinition::new("housing", 3.0, Context),
        KeywordDefinition::new("residential", 2.0, Context),
        KeywordDefinition::new("density", 2.0, Context),
    ]
}

/// Built-in keyword set for the relevance scorer.
pub fn default_scoring_keywords() -> Vec<ScoringKeyword> {
    use ScoringCategory::*;

    vec![
        KeywordDefinition::new("accessory dwelling unit", 10.0, Include),
        KeywordDefinition::new("adu", 10.0, Include),
        KeywordDefinition::new("additional dwelling unit", 10.0, Include),
        KeywordDefinition::new("secondary suite", 9.0, Include),
        KeywordDefinition::new("garden suite", 9.0, Include),
        KeywordDefinition::new("laneway house", 9.0, Include),
        KeywordDefinition::new("coach house", 8.0, Include),
        KeywordDefinition::new("granny flat", 7.0, Include),
        KeywordDefinition::new("accessory dwelling units permitted", 10.0, Priority),
        KeywordDefinition::new("adu bylaw", 10.0, Priority),
        KeywordDefinition::new("secondary suites permitted", 9.0, Priority),
        KeywordDefinition::new("bylaw", 5.0, Context),
        KeywordDefinition::new("zoning", 5.0, Context),
        KeywordDefinition::new("setback", 4.0, Context),
        KeywordDefinition::new("permit", 4.0, Context).with_context_weight(0.4),
        KeywordDefinition::new("housing", 3.0, Context),
        KeywordDefinition::new("industrial", 6.0, Exclude),
        KeywordDefinition::new("commercial kitchen", 6.0, Exclude),
        KeywordDefinition::new("hotel", 5.0, Exclude),
    ]
}
