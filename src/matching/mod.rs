//! Approximate string matching shared by both scoring engines

pub mod fuzzy;
pub mod term;

pub use term::{MatchDetail, MatchType};
