//! Document processor: extraction plus analysis, one document or a whole batch
//!
//! Batches run on a fixed set of worker tasks pulling from a shared FIFO
//! queue, so at most `concurrency` documents are in flight. Completed results
//! flow back over a channel to a single collector that owns the counters and
//! drives the progress callback.

use crate::error::{RelevanceError, Result};
use crate::input::manager::{has_changed, ContentCache, InputManager};
use crate::input::retry::RetryPolicy;
use crate::input::text_extractor::{ExtractionClient, TextExtractor};
use crate::pipeline::progress::{BatchPhase, DocumentStatus, ProcessingProgress, ProgressStore};
use crate::pipeline::types::{
    BatchItemError, BatchProcessingResult, BatchSummary, DocumentItem, ErrorPhase,
    ProcessingOptions, ProcessingResult,
};
use crate::processing::keyword_analyzer::KeywordAnalyzer;
use crate::processing::keywords::{ScoringConfig, ValidationReport};
use crate::processing::relevance_scorer::{PreparedConfig, RelevanceScorer};
use crate::processing::strategy::{AnalysisOutcome, DocumentAnalyzer};
use log::{debug, info, warn};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch, Mutex};

/// Error recorded for documents that never ran because the batch was cancelled.
pub const CANCELLED_ERROR: &str = "cancelled";

/// Called with a progress snapshot after every completed document.
pub type ProgressCallback = Arc<dyn Fn(&ProcessingProgress) + Send + Sync>;

type PreparedGroups = HashMap<String, Arc<PreparedConfig>>;

/// Drives extraction and analysis. Cheap to clone; clones share the
/// extractor, cache, engines and progress store.
#[derive(Clone)]
pub struct DocumentProcessor {
    input: InputManager,
    keyword_analyzer: Arc<KeywordAnalyzer>,
    relevance_scorer: Arc<RelevanceScorer>,
    group_configs: Arc<HashMap<String, ScoringConfig>>,
    progress: ProgressStore,
}

impl DocumentProcessor {
    /// Create a new processor from explicit collaborators
    pub fn new(
        extractor: Arc<dyn TextExtractor>,
        keyword_analyzer: KeywordAnalyzer,
        relevance_scorer: RelevanceScorer,
    ) -> Self {
        Self {
            input: InputManager::new(extractor),
            keyword_analyzer: Arc::new(keyword_analyzer),
            relevance_scorer: Arc::new(relevance_scorer),
            group_configs: Arc::new(HashMap::new()),
            progress: ProgressStore::new(),
        }
    }

    /// Create a processor around a subprocess client. The client's retry
    /// policy becomes the processor's; the per-attempt timeout still comes from
    /// [`ProcessingOptions::timeout`].
    pub fn from_client(
        client: ExtractionClient,
        keyword_analyzer: KeywordAnalyzer,
        relevance_scorer: RelevanceScorer,
    ) -> Self {
        let retry = *client.retry_policy();
        Self::new(Arc::new(client), keyword_analyzer, relevance_scorer).with_retry(retry)
    }

    /// Create a new processor with the built-in keyword sets
    pub fn with_defaults(extractor: Arc<dyn TextExtractor>) -> Result<Self> {
        Ok(Self::new(
            extractor,
            KeywordAnalyzer::new()?,
            RelevanceScorer::new(ScoringConfig::default())?,
        ))
    }

    pub fn with_cache(mut self, cache: Arc<dyn ContentCache>) -> Self {
        self.input = self.input.with_cache(cache);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.input = self.input.with_retry(retry);
        self
    }

    /// Scoring configuration used for items owned by `group_id` when advanced
    /// scoring is on. Validated when a run starts.
    pub fn with_group_config(mut self, group_id: impl Into<String>, config: ScoringConfig) -> Self {
        Arc::make_mut(&mut self.group_configs).insert(group_id.into(), config);
        self
    }

    /// Handle onto the live per-document status map.
    pub fn progress(&self) -> ProgressStore {
        self.progress.clone()
    }

    /// Validate the default scoring configuration and every group override.
    pub fn validate_configuration(&self) -> ValidationReport {
        let mut report = self.relevance_scorer.config().validate();

        let mut groups: Vec<(&String, &ScoringConfig)> = self.group_configs.iter().collect();
        groups.sort_by(|a, b| a.0.cmp(b.0));
        for (group_id, config) in groups {
            let group_report = config.validate();
            report.issues.extend(
                group_report
                    .issues
                    .into_iter()
                    .map(|issue| format!("group {}: {}", group_id, issue)),
            );
            report.warnings.extend(
                group_report
                    .warnings
                    .into_iter()
                    .map(|warning| format!("group {}: {}", group_id, warning)),
            );
        }

        report
    }

    fn prepare_groups(&self) -> Result<PreparedGroups> {
        let report = self.validate_configuration();
        if !report.is_valid() {
            return Err(RelevanceError::Configuration(report.issues.join("; ")));
        }

        self.group_configs
            .iter()
            .map(|(group_id, config)| {
                Ok((group_id.clone(), Arc::new(PreparedConfig::new(config.clone())?)))
            })
            .collect()
    }

    /// Extract and analyse one document. Never fails: problems are reported
    /// on the returned result.
    ///
    /// The document shows up in the progress store only while this call runs.
    pub async fn process_document(
        &self,
        item: &DocumentItem,
        options: &ProcessingOptions,
    ) -> ProcessingResult {
        let groups = match self.prepare_groups() {
            Ok(groups) => groups,
            Err(e) => {
                return ProcessingResult::failed(&item.id, ErrorPhase::Analysis, e.to_string(), false)
            }
        };

        self.progress.track(&item.id);
        let result = self.process_with(item, options, Arc::new(groups)).await;
        self.progress.remove(&item.id);
        result
    }

    async fn process_with(
        &self,
        item: &DocumentItem,
        options: &ProcessingOptions,
        groups: Arc<PreparedGroups>,
    ) -> ProcessingResult {
        let started = Instant::now();
        let mut result = ProcessingResult::new(&item.id);

        self.progress.advance(&item.id, DocumentStatus::Checking);
        let reused = if options.force_reextract {
            None
        } else {
            self.input.reuse_existing(item).await
        };

        let extraction = match reused {
            Some(cached) => {
                self.progress.advance(&item.id, DocumentStatus::Cached);
                cached
            }
            None => {
                self.progress.advance(&item.id, DocumentStatus::Extracting);
                let extracted = self.input.extract_fresh(item, options.timeout).await;
                if extracted.success {
                    self.progress.advance(&item.id, DocumentStatus::Extracted);
                }
                extracted
            }
        };

        let text = match (extraction.success, extraction.text) {
            (true, Some(text)) => text,
            (_, _) => {
                let message = extraction
                    .error
                    .unwrap_or_else(|| "extraction produced no text".to_string());
                warn!("Extraction failed for {}: {}", item.id, message);
                self.progress.fail(&item.id, message.clone());
                result.errors.push(BatchItemError {
                    document_id: item.id.clone(),
                    phase: ErrorPhase::Extraction,
                    message: message.clone(),
                    retryable: extraction.retryable,
                });
                result.error = Some(message);
                result.status = DocumentStatus::Error;
                result.processing_time_ms = started.elapsed().as_millis() as u64;
                return result;
            }
        };

        result.success = true;
        result.content_extracted = true;
        result.was_cached = extraction.was_cached;
        result.extraction_metadata = extraction.metadata;
        result.content_changed = extraction
            .content_hash
            .as_deref()
            .map(|hash| has_changed(item.content_hash.as_deref(), hash))
            .unwrap_or(true);
        result.content_hash = extraction.content_hash;
        result.status = if extraction.was_cached {
            DocumentStatus::Cached
        } else {
            DocumentStatus::Extracted
        };

        if !options.skip_analysis {
            self.progress.advance(&item.id, DocumentStatus::Analyzing);
            result.status = DocumentStatus::Analyzing;

            match self.analyze(item, &text, options, groups).await {
                Ok(outcome) => {
                    if let Some(error) = outcome.error() {
                        result.errors.push(BatchItemError {
                            document_id: item.id.clone(),
                            phase: ErrorPhase::Analysis,
                            message: error.to_string(),
                            retryable: false,
                        });
                        result.error = Some(error.to_string());
                    } else {
                        result.content_analyzed = true;
                        debug!(
                            "Document {} analysed: relevant={} score={:.3}",
                            item.id,
                            outcome.is_relevant(),
                            outcome.relevance_fraction()
                        );
                    }
                    result.analysis = Some(outcome);
                }
                Err(message) => {
                    warn!("Analysis failed for {}: {}", item.id, message);
                    result.errors.push(BatchItemError {
                        document_id: item.id.clone(),
                        phase: ErrorPhase::Analysis,
                        message: message.clone(),
                        retryable: false,
                    });
                    result.error = Some(message);
                }
            }
        }

        self.progress.advance(&item.id, DocumentStatus::Completed);
        result.status = DocumentStatus::Completed;
        result.content_text = Some(text);
        result.processing_time_ms = started.elapsed().as_millis() as u64;
        result
    }

    /// Run the selected engine on a blocking thread; a panic inside the
    /// engine comes back as an error message.
    async fn analyze(
        &self,
        item: &DocumentItem,
        text: &str,
        options: &ProcessingOptions,
        groups: Arc<PreparedGroups>,
    ) -> std::result::Result<AnalysisOutcome, String> {
        let document_id = item.id.clone();
        let group_id = item.group_id.clone();
        let text = text.to_string();

        let task = if options.use_advanced_scoring {
            let scorer = self.relevance_scorer.clone();
            tokio::task::spawn_blocking(move || {
                let prepared = group_id.as_ref().and_then(|g| groups.get(g));
                match prepared {
                    Some(prepared) => {
                        AnalysisOutcome::Advanced(RelevanceScorer::score_with(&text, prepared))
                    }
                    None => scorer.analyze_document(&document_id, &text),
                }
            })
        } else {
            let analyzer = self.keyword_analyzer.clone();
            tokio::task::spawn_blocking(move || analyzer.analyze_document(&document_id, &text))
        };

        task.await
            .map_err(|e| format!("analysis task failed: {}", e))
    }

    /// Process every item with at most `options.concurrency` in flight.
    pub async fn batch_process_documents(
        &self,
        items: Vec<DocumentItem>,
        options: &ProcessingOptions,
        on_progress: Option<ProgressCallback>,
    ) -> Result<BatchProcessingResult> {
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        self.batch_process_documents_with_cancel(items, options, on_progress, cancel_rx)
            .await
    }

    /// Like [`batch_process_documents`](Self::batch_process_documents), stopping
    /// early once `cancel` turns `true`. In-flight documents are aborted and
    /// queued ones are reported as failed with [`CANCELLED_ERROR`].
    pub async fn batch_process_documents_with_cancel(
        &self,
        items: Vec<DocumentItem>,
        options: &ProcessingOptions,
        on_progress: Option<ProgressCallback>,
        cancel: watch::Receiver<bool>,
    ) -> Result<BatchProcessingResult> {
        let groups = Arc::new(self.prepare_groups()?);
        let started = Instant::now();
        let total = items.len();
        let concurrency = options.concurrency.max(1).min(total.max(1));

        self.progress.begin(items.iter().map(|item| item.id.as_str()));
        info!(
            "Processing {} documents with concurrency {}",
            total, concurrency
        );

        let queue: Arc<Mutex<VecDeque<DocumentItem>>> =
            Arc::new(Mutex::new(items.into_iter().collect()));
        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<ProcessingResult>();

        let mut workers = Vec::with_capacity(concurrency);
        for worker_id in 0..concurrency {
            let processor = self.clone();
            let queue = queue.clone();
            let result_tx = result_tx.clone();
            let options = options.clone();
            let groups = groups.clone();
            let mut cancel = cancel.clone();

            workers.push(tokio::spawn(async move {
                loop {
                    if *cancel.borrow() {
                        break;
                    }
                    let next = queue.lock().await.pop_front();
                    let Some(item) = next else {
                        break;
                    };

                    let document_id = item.id.clone();
                    let task_processor = processor.clone();
                    let task_options = options.clone();
                    let task_groups = groups.clone();
                    let mut task = tokio::spawn(async move {
                        task_processor
                            .process_with(&item, &task_options, task_groups)
                            .await
                    });

                    let result = tokio::select! {
                        joined = &mut task => match joined {
                            Ok(result) => result,
                            Err(e) => {
                                processor.progress.abort(&document_id, e.to_string());
                                ProcessingResult::failed(
                                    document_id,
                                    ErrorPhase::Extraction,
                                    format!("document task failed: {}", e),
                                    true,
                                )
                            }
                        },
                        _ = wait_for_cancel(&mut cancel) => {
                            task.abort();
                            processor.progress.abort(&document_id, CANCELLED_ERROR);
                            ProcessingResult::failed(
                                document_id,
                                ErrorPhase::Extraction,
                                CANCELLED_ERROR,
                                true,
                            )
                        }
                    };

                    if result_tx.send(result).is_err() {
                        break;
                    }
                }
                debug!("Worker {} finished", worker_id);
            }));
        }
        drop(result_tx);

        let mut progress = ProcessingProgress::new(total);
        let mut results = Vec::with_capacity(total);
        let mut errors = Vec::new();

        while let Some(result) = result_rx.recv().await {
            record_completion(&mut progress, &result, started.elapsed(), options);
            errors.extend(result.errors.iter().cloned());
            if let Some(callback) = &on_progress {
                callback(&progress);
            }
            results.push(result);
        }

        for worker in workers {
            if let Err(e) = worker.await {
                warn!("Batch worker failed: {}", e);
            }
        }

        let cancelled = *cancel.borrow();
        let leftover: Vec<DocumentItem> = queue.lock().await.drain(..).collect();
        if !leftover.is_empty() {
            info!("Batch cancelled with {} documents not started", leftover.len());
        }
        for item in leftover {
            self.progress.abort(&item.id, CANCELLED_ERROR);
            let result =
                ProcessingResult::failed(item.id, ErrorPhase::Extraction, CANCELLED_ERROR, true);
            record_completion(&mut progress, &result, started.elapsed(), options);
            errors.extend(result.errors.iter().cloned());
            results.push(result);
        }

        let elapsed = started.elapsed();
        progress.phase = if cancelled {
            BatchPhase::Error
        } else {
            BatchPhase::Completed
        };
        progress.eta_ms = Some(0);
        if let Some(callback) = &on_progress {
            callback(&progress);
        }

        let summary = BatchSummary::from_results(&results, elapsed);
        info!(
            "Batch finished: {} ok, {} failed, {} relevant in {:.1}s",
            summary.successful,
            summary.failed,
            summary.relevant,
            elapsed.as_secs_f64()
        );

        Ok(BatchProcessingResult {
            results,
            summary,
            errors,
            cancelled,
        })
    }
}

/// Resolves once `cancel` reads `true`. Never resolves if the sender is gone
/// without having cancelled.
async fn wait_for_cancel(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

fn record_completion(
    progress: &mut ProcessingProgress,
    result: &ProcessingResult,
    elapsed: Duration,
    options: &ProcessingOptions,
) {
    progress.processed += 1;
    if result.was_cached {
        progress.cached += 1;
    } else if result.content_extracted {
        progress.extracted += 1;
    }
    if result.content_analyzed {
        progress.analyzed += 1;
    }
    if !result.success {
        progress.failed += 1;
    }
    progress.errors.extend(result.errors.iter().cloned());
    progress.current_item = Some(result.document_id.clone());
    progress.phase = if options.skip_analysis || progress.analyzed == 0 {
        BatchPhase::Extraction
    } else {
        BatchPhase::Analysis
    };

    let per_item = elapsed.as_millis() as f64 / progress.processed as f64;
    progress.eta_ms = Some((per_item * progress.remaining() as f64).round() as u64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractionError;
    use crate::input::text_extractor::{ExtractedText, ExtractionMetadata};
    use crate::processing::keywords::{ScoringCategory, ScoringKeyword};
    use async_trait::async_trait;

    struct StaticExtractor(&'static str);

    #[async_trait]
    impl TextExtractor for StaticExtractor {
        async fn extract(
            &self,
            _source: &str,
            _timeout: Duration,
        ) -> std::result::Result<ExtractedText, ExtractionError> {
            Ok(ExtractedText {
                text: self.0.to_string(),
                metadata: ExtractionMetadata::default(),
            })
        }
    }

    const RELEVANT: &str =
        "This bylaw permits an accessory dwelling unit (ADU) with a separate entrance.";

    fn processor(text: &'static str) -> DocumentProcessor {
        DocumentProcessor::with_defaults(Arc::new(StaticExtractor(text)))
            .unwrap()
            .with_retry(RetryPolicy::once())
    }

    #[tokio::test]
    async fn test_process_document_extracts_and_analyses() {
        let processor = processor(RELEVANT);
        let item = DocumentItem::new("doc-1", "https://example.org/doc.pdf");

        let result = processor
            .process_document(&item, &ProcessingOptions::default())
            .await;

        assert!(result.success);
        assert!(result.content_extracted);
        assert!(result.content_analyzed);
        assert!(result.content_changed);
        assert!(result.is_relevant());
        assert_eq!(result.status, DocumentStatus::Completed);
    }

    #[tokio::test]
    async fn test_single_documents_do_not_linger_in_progress_store() {
        let processor = processor(RELEVANT);
        let progress = processor.progress();
        progress.begin(["doc-1"]);
        progress.advance("doc-1", DocumentStatus::Completed);

        for id in ["doc-1", "doc-2", "doc-3"] {
            let item = DocumentItem::new(id, "/tmp/doc.pdf");
            let result = processor
                .process_document(&item, &ProcessingOptions::default())
                .await;
            assert_eq!(result.status, DocumentStatus::Completed);
        }

        assert!(progress.snapshot().is_empty());
    }

    #[test]
    fn test_from_client_keeps_client_retry_policy() {
        let policy = RetryPolicy::new(5, Duration::from_millis(10), 3.0);
        let client = ExtractionClient::new("extract-text").with_retry(policy);

        let processor = DocumentProcessor::from_client(
            client,
            KeywordAnalyzer::new().unwrap(),
            RelevanceScorer::new(ScoringConfig::default()).unwrap(),
        );

        assert_eq!(processor.input.retry_policy(), &policy);
    }

    #[tokio::test]
    async fn test_empty_text_is_analysis_error_not_failure() {
        let processor = processor("   ");
        let item = DocumentItem::new("doc-1", "/tmp/doc.pdf");

        let result = processor
            .process_document(&item, &ProcessingOptions::default())
            .await;

        assert!(result.success);
        assert!(!result.content_analyzed);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].phase, ErrorPhase::Analysis);
        assert!(result.error.unwrap().starts_with("No content text available"));
    }

    #[tokio::test]
    async fn test_skip_analysis() {
        let processor = processor(RELEVANT);
        let options = ProcessingOptions {
            skip_analysis: true,
            ..Default::default()
        };

        let result = processor
            .process_document(&DocumentItem::new("doc-1", "/tmp/doc.pdf"), &options)
            .await;

        assert!(result.success);
        assert!(result.analysis.is_none());
        assert!(!result.content_analyzed);
    }

    #[tokio::test]
    async fn test_unchanged_content_is_detected() {
        let processor = processor(RELEVANT);
        let mut item = DocumentItem::new("doc-1", "/tmp/doc.pdf");
        item.content_hash = Some(crate::input::manager::content_hash(RELEVANT));

        let result = processor
            .process_document(&item, &ProcessingOptions::default())
            .await;

        assert!(!result.was_cached);
        assert!(!result.content_changed);
    }

    #[tokio::test]
    async fn test_group_config_used_for_advanced_scoring() {
        let hotels = ScoringConfig {
            keywords: vec![ScoringKeyword::new("hotel", 10.0, ScoringCategory::Include)],
            ..ScoringConfig::default()
        };
        let processor = processor("The hotel hotel hotel expansion was approved.")
            .with_group_config("hospitality", hotels);
        let options = ProcessingOptions {
            use_advanced_scoring: true,
            ..Default::default()
        };

        let grouped = processor
            .process_document(
                &DocumentItem::new("a", "/tmp/a.pdf").with_group("hospitality"),
                &options,
            )
            .await;
        let ungrouped = processor
            .process_document(&DocumentItem::new("b", "/tmp/b.pdf"), &options)
            .await;

        assert!(grouped.is_relevant());
        assert!(!ungrouped.is_relevant());
        assert!(matches!(grouped.analysis, Some(AnalysisOutcome::Advanced(_))));
    }

    #[tokio::test]
    async fn test_invalid_group_config_refuses_batch() {
        let broken = ScoringConfig {
            keywords: vec![ScoringKeyword::new("adu", 42.0, ScoringCategory::Include)],
            ..ScoringConfig::default()
        };
        let processor = processor(RELEVANT).with_group_config("broken", broken);

        assert!(!processor.validate_configuration().is_valid());
        let err = processor
            .batch_process_documents(
                vec![DocumentItem::new("a", "/tmp/a.pdf")],
                &ProcessingOptions::default(),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RelevanceError::Configuration(ref m) if m.contains("group broken")));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let processor = processor(RELEVANT);
        let batch = processor
            .batch_process_documents(Vec::new(), &ProcessingOptions::default(), None)
            .await
            .unwrap();

        assert!(batch.results.is_empty());
        assert_eq!(batch.summary.total, 0);
        assert!(!batch.cancelled);
    }

    #[test]
    fn test_record_completion_eta() {
        let mut progress = ProcessingProgress::new(4);
        let mut result = ProcessingResult::new("a");
        result.success = true;
        result.content_extracted = true;
        result.content_analyzed = true;

        record_completion(
            &mut progress,
            &result,
            Duration::from_millis(1000),
            &ProcessingOptions::default(),
        );

        assert_eq!(progress.processed, 1);
        assert_eq!(progress.extracted, 1);
        assert_eq!(progress.analyzed, 1);
        assert_eq!(progress.phase, BatchPhase::Analysis);
        assert_eq!(progress.eta_ms, Some(3000));
    }
}
