//! Input manager: cache-aware extraction and content identity

use crate::input::retry::RetryPolicy;
use crate::input::text_extractor::{extract_with_retry, ExtractionResult, TextExtractor};
use crate::pipeline::types::DocumentItem;
use async_trait::async_trait;
use log::{debug, info};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// SHA-256 of `text`, hex encoded.
pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Whether freshly extracted content differs from what was known before.
/// Unknown previous content counts as a change.
pub fn has_changed(previous_hash: Option<&str>, current_hash: &str) -> bool {
    previous_hash != Some(current_hash)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedContent {
    pub text: String,
    pub content_hash: String,
}

impl CachedContent {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let content_hash = content_hash(&text);
        Self { text, content_hash }
    }
}

/// Lookup of previously extracted content, keyed by document id.
#[async_trait]
pub trait ContentCache: Send + Sync {
    async fn lookup(&self, document_id: &str) -> Option<CachedContent>;

    async fn store(&self, document_id: &str, content: CachedContent);
}

/// Process-local cache.
#[derive(Debug, Default)]
pub struct MemoryContentCache {
    entries: RwLock<HashMap<String, CachedContent>>,
}

impl MemoryContentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

#[async_trait]
impl ContentCache for MemoryContentCache {
    async fn lookup(&self, document_id: &str) -> Option<CachedContent> {
        self.entries.read().await.get(document_id).cloned()
    }

    async fn store(&self, document_id: &str, content: CachedContent) {
        self.entries
            .write()
            .await
            .insert(document_id.to_string(), content);
    }
}

/// Decides between reusing content and running the extractor.
#[derive(Clone)]
pub struct InputManager {
    extractor: Arc<dyn TextExtractor>,
    cache: Option<Arc<dyn ContentCache>>,
    retry: RetryPolicy,
}

impl InputManager {
    pub fn new(extractor: Arc<dyn TextExtractor>) -> Self {
        Self {
            extractor,
            cache: None,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn ContentCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Text for `item`: content already on the item, then the cache, then the
    /// extractor. `force` skips straight to the extractor.
    pub async fn extract_text(
        &self,
        item: &DocumentItem,
        force: bool,
        timeout: Duration,
    ) -> ExtractionResult {
        if !force {
            if let Some(existing) = self.reuse_existing(item).await {
                return existing;
            }
        }
        self.extract_fresh(item, timeout).await
    }

    /// Content already known for `item`, if any.
    pub async fn reuse_existing(&self, item: &DocumentItem) -> Option<ExtractionResult> {
        if let Some(text) = item.content_text.as_ref().filter(|t| !t.trim().is_empty()) {
            info!("Using existing content for document {}", item.id);
            return Some(ExtractionResult::cached(text.clone(), item.content_hash.clone()));
        }

        let cache = self.cache.as_ref()?;
        let hit = cache.lookup(&item.id).await?;
        info!("Using cached content for document {}", item.id);
        Some(ExtractionResult::cached(hit.text, Some(hit.content_hash)))
    }

    /// Run the extractor with retries and remember successful output.
    pub async fn extract_fresh(&self, item: &DocumentItem, timeout: Duration) -> ExtractionResult {
        let result =
            extract_with_retry(self.extractor.as_ref(), &item.source_url, timeout, &self.retry)
                .await;

        if let (Some(cache), Some(text), Some(hash)) =
            (&self.cache, &result.text, &result.content_hash)
        {
            debug!("Caching extracted content for document {}", item.id);
            cache
                .store(
                    &item.id,
                    CachedContent {
                        text: text.clone(),
                        content_hash: hash.clone(),
                    },
                )
                .await;
        }

        result
    }
}
