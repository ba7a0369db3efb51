//! Input processing module
//! Handles source detection, subprocess extraction, retries and content caching

pub mod manager;
pub mod retry;
pub mod source;
pub mod text_extractor;

pub use manager::{content_hash, ContentCache, InputManager, MemoryContentCache};
pub use retry::RetryPolicy;
pub use text_extractor::{ExtractionClient, ExtractionResult, TextExtractor};
