//! Edit-distance similarity and rule-based lexical variations

use std::collections::BTreeSet;
use strsim::levenshtein;

/// Generated variations shorter than this are discarded.
const MIN_VARIATION_LEN: usize = 3;

/// Levenshtein distance between the lower-cased forms of `a` and `b`.
///
/// Distance against an empty string is the other string's length.
pub fn edit_distance(a: &str, b: &str) -> usize {
    levenshtein(&a.to_lowercase(), &b.to_lowercase())
}

/// Normalised similarity in `[0, 1]`.
///
/// `1 - distance / max(len(a), len(b))`, case-insensitive. Lengths are counted
/// in characters so the result is symmetric and exactly `1.0` for strings that
/// only differ in case.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }

    let distance = levenshtein(&a, &b);
    (1.0 - distance as f64 / max_len as f64).clamp(0.0, 1.0)
}

/// Rule-based lexical variations of a term.
///
/// Covers the plural toggle, `-ing`/`-ed` verb forms (with trailing-`e`
/// elision) and `-ly`/`-er`/`-est` suffixes. The root term itself is never
/// part of the result.
pub fn variations(term: &str) -> BTreeSet<String> {
    let root = term.trim().to_lowercase();
    let mut out = BTreeSet::new();
    if root.is_empty() {
        return out;
    }

    match root.strip_suffix('s') {
        Some(singular) => {
            out.insert(singular.to_string());
        }
        None => {
            out.insert(format!("{}s", root));
        }
    }

    match root.strip_suffix('e') {
        Some(stem) => {
            out.insert(format!("{}ing", stem));
            out.insert(format!("{}ed", stem));
        }
        None => {
            out.insert(format!("{}ing", root));
            out.insert(format!("{}ed", root));
        }
    }

    for suffix in ["ly", "er", "est"] {
        out.insert(format!("{}{}", root, suffix));
    }

    out.retain(|v| v.chars().count() >= MIN_VARIATION_LEN && *v != root);
    out
}
