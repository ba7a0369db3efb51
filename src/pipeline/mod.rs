//! Batch pipeline: document items in, processing results out

pub mod processor;
pub mod progress;
pub mod types;

pub use processor::{DocumentProcessor, ProgressCallback, CANCELLED_ERROR};
pub use progress::{BatchPhase, DocumentStatus, ProcessingProgress, ProgressStore};
pub use types::{
    BatchItemError, BatchProcessingResult, BatchSummary, DocumentItem, ErrorPhase,
    ProcessingOptions, ProcessingResult,
};
