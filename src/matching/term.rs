//! Per-term matching shared by both analyzers
//!
//! A term is matched in three tiers: exact whole-word hits, hits on one of
//! its generated variations, and fuzzy hits on individual words. The fuzzy
//! tier only runs when the exact tier found nothing.

use crate::error::{RelevanceError, Result};
use crate::matching::fuzzy::{similarity, variations};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Characters of surrounding text captured on each side of a match.
pub const CONTEXT_RADIUS: usize = 100;

/// Stored context snippets per keyword.
pub const MAX_CONTEXTS_PER_KEYWORD: usize = 3;

/// Similarity assigned to a variation hit.
pub const VARIATION_SIMILARITY: f64 = 0.9;

/// Default similarity a word needs to count as a fuzzy hit.
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.8;

/// Words shorter than this never take part in fuzzy matching.
const MIN_FUZZY_WORD_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Exact,
    Variation,
    Fuzzy,
}

impl std::fmt::Display for MatchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchType::Exact => write!(f, "exact"),
            MatchType::Variation => write!(f, "variation"),
            MatchType::Fuzzy => write!(f, "fuzzy"),
        }
    }
}

/// Evidence that a keyword fired in a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchDetail {
    pub keyword: String,
    pub match_type: MatchType,
    /// Always within `[0, 1]`.
    pub similarity: f64,
    pub count: usize,
    /// Byte offsets of each occurrence in the analysed text.
    pub positions: Vec<usize>,
    pub contexts: Vec<String>,
    /// Distinct surface forms that produced the hit.
    pub matched_terms: Vec<String>,
}

/// A whitespace-delimited word with surrounding punctuation stripped.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub text: String,
    pub offset: usize,
}

/// Split text into lower-cased words, remembering their byte offsets.
pub fn tokenize(text: &str) -> Vec<Token> {
    let base = text.as_ptr() as usize;
    text.split_whitespace()
        .filter_map(|raw| {
            let trimmed = raw.trim_matches(|c: char| !c.is_alphanumeric());
            if trimmed.is_empty() {
                return None;
            }
            Some(Token {
                text: trimmed.to_lowercase(),
                offset: trimmed.as_ptr() as usize - base,
            })
        })
        .collect()
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Snippet of `text` around `start..end`, with `...` on truncated sides.
pub fn extract_context(text: &str, start: usize, end: usize) -> String {
    let mut from = start.saturating_sub(CONTEXT_RADIUS);
    while !text.is_char_boundary(from) {
        from -= 1;
    }
    let mut to = end.saturating_add(CONTEXT_RADIUS).min(text.len());
    while !text.is_char_boundary(to) {
        to += 1;
    }

    let body = text[from..to].split_whitespace().collect::<Vec<_>>().join(" ");
    let mut snippet = String::with_capacity(body.len() + 6);
    if from > 0 {
        snippet.push_str("...");
    }
    snippet.push_str(&body);
    if to < text.len() {
        snippet.push_str("...");
    }
    snippet
}

/// Compiled matcher for one keyword.
#[derive(Debug, Clone)]
pub struct TermMatcher {
    term: String,
    exact: Regex,
    variation: Option<Regex>,
    variations: BTreeSet<String>,
    fuzzy_threshold: f64,
}

impl TermMatcher {
    pub fn new(term: &str, fuzzy_threshold: f64) -> Result<Self> {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return Err(RelevanceError::Configuration(
                "keyword term must not be empty".to_string(),
            ));
        }

        let exact = Self::word_pattern(std::slice::from_ref(&term))?;
        let variations = variations(&term);

        // Longest alternatives first so "suites" wins over "suite"
        let mut alternatives: Vec<String> = variations.iter().cloned().collect();
        alternatives.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        let variation = if alternatives.is_empty() {
            None
        } else {
            Some(Self::word_pattern(&alternatives)?)
        };

        Ok(Self {
            term,
            exact,
            variation,
            variations,
            fuzzy_threshold: fuzzy_threshold.clamp(0.0, 1.0),
        })
    }

    /// Whole-word pattern over `alternatives`. A word boundary is only
    /// required at an edge that is itself a word character, so terms such as
    /// "sq. ft." still match.
    fn word_pattern(alternatives: &[String]) -> Result<Regex> {
        let body = alternatives
            .iter()
            .map(|a| {
                let lead = if a.chars().next().is_some_and(is_word_char) { r"\b" } else { "" };
                let trail = if a.chars().last().is_some_and(is_word_char) { r"\b" } else { "" };
                format!("{}{}{}", lead, regex::escape(a), trail)
            })
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&format!(r"(?i)(?:{})", body)).map_err(|e| {
            RelevanceError::Configuration(format!("Failed to compile keyword pattern: {}", e))
        })
    }

    pub fn term(&self) -> &str {
        &self.term
    }

    pub fn variations(&self) -> &BTreeSet<String> {
        &self.variations
    }

    pub fn fuzzy_threshold(&self) -> f64 {
        self.fuzzy_threshold
    }

    /// Run all three tiers against `text`.
    ///
    /// `tokens` must come from [`tokenize`] on the same text. Returns at most
    /// one detail per match type.
    pub fn find(&self, text: &str, tokens: &[Token], fuzzy: bool) -> Vec<MatchDetail> {
        let mut details = Vec::new();

        let exact = self.find_pattern(text, &self.exact, MatchType::Exact, 1.0);
        let has_exact = exact.is_some();
        details.extend(exact);

        if let Some(pattern) = &self.variation {
            details.extend(self.find_pattern(
                text,
                pattern,
                MatchType::Variation,
                VARIATION_SIMILARITY,
            ));
        }

        if fuzzy && !has_exact {
            details.extend(self.find_fuzzy(text, tokens));
        }

        details
    }

    fn find_pattern(
        &self,
        text: &str,
        pattern: &Regex,
        match_type: MatchType,
        similarity: f64,
    ) -> Option<MatchDetail> {
        let mut positions = Vec::new();
        let mut contexts = Vec::new();
        let mut matched_terms = BTreeSet::new();

        for m in pattern.find_iter(text) {
            positions.push(m.start());
            if contexts.len() < MAX_CONTEXTS_PER_KEYWORD {
                contexts.push(extract_context(text, m.start(), m.end()));
            }
            matched_terms.insert(m.as_str().to_lowercase());
        }

        if positions.is_empty() {
            return None;
        }

        Some(MatchDetail {
            keyword: self.term.clone(),
            match_type,
            similarity,
            count: positions.len(),
            positions,
            contexts,
            matched_terms: matched_terms.into_iter().collect(),
        })
    }

    fn find_fuzzy(&self, text: &str, tokens: &[Token]) -> Option<MatchDetail> {
        let mut positions = Vec::new();
        let mut contexts = Vec::new();
        let mut matched_terms = BTreeSet::new();
        let mut best = 0.0_f64;

        for token in tokens {
            if token.text.chars().count() < MIN_FUZZY_WORD_LEN
                || token.text == self.term
                || self.variations.contains(&token.text)
            {
                continue;
            }

            let score = similarity(&token.text, &self.term);
            if score < self.fuzzy_threshold || score >= 1.0 {
                continue;
            }

            best = best.max(score);
            positions.push(token.offset);
            if contexts.len() < MAX_CONTEXTS_PER_KEYWORD {
                contexts.push(extract_context(
                    text,
                    token.offset,
                    token.offset + token.text.len(),
                ));
            }
            matched_terms.insert(token.text.clone());
        }

        if positions.is_empty() {
            return None;
        }

        Some(MatchDetail {
            keyword: self.term.clone(),
            match_type: MatchType::Fuzzy,
            similarity: best,
            count: positions.len(),
            positions,
            contexts,
            matched_terms: matched_terms.into_iter().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(term: &str, text: &str) -> Vec<MatchDetail> {
        let matcher = TermMatcher::new(term, DEFAULT_FUZZY_THRESHOLD).unwrap();
        matcher.find(text, &tokenize(text), true)
    }

    #[test]
    fn test_tokenize_strips_punctuation_and_keeps_offsets() {
        let text = "An (ADU), permitted.";
        let tokens = tokenize(text);
        let words: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(words, vec!["an", "adu", "permitted"]);
        assert_eq!(&text[tokens[1].offset..tokens[1].offset + 3], "ADU");
    }

    #[test]
    fn test_exact_whole_word_only() {
        let details = run("adu", "The ADU is not an adult. adu!");
        let exact = details.iter().find(|d| d.match_type == MatchType::Exact).unwrap();
        assert_eq!(exact.count, 2);
        assert_eq!(exact.similarity, 1.0);
    }

    #[test]
    fn test_term_with_punctuation_edges() {
        let details = run("sq. ft.", "Units up to 800 sq. ft. are allowed; SQ. FT. limits apply.");
        let exact = details.iter().find(|d| d.match_type == MatchType::Exact).unwrap();
        assert_eq!(exact.count, 2);

        let details = run("sq. ft.", "the sq. ftx figure");
        assert!(details.iter().all(|d| d.match_type != MatchType::Exact));
    }

    #[test]
    fn test_variation_match() {
        let details = run("adu", "adus");
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].match_type, MatchType::Variation);
        assert_eq!(details[0].similarity, 0.9);
        assert_eq!(details[0].matched_terms, vec!["adus".to_string()]);
    }

    #[test]
    fn test_fuzzy_skipped_when_exact_present() {
        let details = run("setback", "setback rules and a setbak typo");
        assert!(details.iter().all(|d| d.match_type != MatchType::Fuzzy));
    }

    #[test]
    fn test_fuzzy_match_on_typo() {
        let details = run("setback", "minimum setbak applies");
        let fuzzy = details.iter().find(|d| d.match_type == MatchType::Fuzzy).unwrap();
        assert_eq!(fuzzy.count, 1);
        assert!(fuzzy.similarity >= 0.8 && fuzzy.similarity < 1.0);
    }

    #[test]
    fn test_fuzzy_ignores_variations() {
        // "permits" is a variation of "permit", it must not also count as fuzzy
        let details = run("permit", "two permits issued");
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].match_type, MatchType::Variation);
    }

    #[test]
    fn test_context_is_capped_and_marked() {
        let filler = "word ".repeat(60);
        let text = format!("{}adu {}adu {}adu {}adu {}", filler, filler, filler, filler, filler);
        let details = run("adu", &text);
        let exact = &details[0];
        assert_eq!(exact.count, 4);
        assert_eq!(exact.contexts.len(), MAX_CONTEXTS_PER_KEYWORD);
        assert!(exact.contexts[0].starts_with("..."));
        assert!(exact.contexts[0].ends_with("..."));
    }

    #[test]
    fn test_context_without_truncation() {
        let text = "short adu text";
        assert_eq!(extract_context(text, 6, 9), "short adu text");
    }

    #[test]
    fn test_context_respects_char_boundaries() {
        let text = format!("{}adu{}", "é".repeat(120), "ü".repeat(120));
        let start = text.find("adu").unwrap();
        let snippet = extract_context(&text, start, start + 3);
        assert!(snippet.contains("adu"));
    }

    #[test]
    fn test_empty_term_rejected() {
        assert!(TermMatcher::new("  ", 0.8).is_err());
    }
}
