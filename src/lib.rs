//! Document relevance library
//!
//! Text comes out of an external extraction tool, gets scored against
//! weighted keyword sets and is reported per document or per batch.

pub mod cli;
pub mod config;
pub mod error;
pub mod input;
pub mod matching;
pub mod output;
pub mod pipeline;
pub mod processing;

pub use config::Config;
pub use error::{ExtractionError, RelevanceError, Result};
