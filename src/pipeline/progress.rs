//! Per-document status tracking and batch progress snapshots

use crate::pipeline::types::BatchItemError;
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Where one document is in the pipeline.
///
/// `pending → checking → extracting → extracted|cached → analyzing → completed`,
/// with `error` reachable from `extracting` or `analyzing`. An aborted
/// document ([`ProgressStore::abort`]) goes to `error` from any non-terminal
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Checking,
    Extracting,
    Extracted,
    Cached,
    Analyzing,
    Completed,
    Error,
}

impl DocumentStatus {
    fn rank(self) -> u8 {
        match self {
            DocumentStatus::Pending => 0,
            DocumentStatus::Checking => 1,
            DocumentStatus::Extracting => 2,
            DocumentStatus::Extracted | DocumentStatus::Cached => 3,
            DocumentStatus::Analyzing => 4,
            DocumentStatus::Completed | DocumentStatus::Error => 5,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, DocumentStatus::Completed | DocumentStatus::Error)
    }

    pub fn can_advance_to(self, next: DocumentStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            DocumentStatus::Error => {
                matches!(self, DocumentStatus::Extracting | DocumentStatus::Analyzing)
            }
            _ => next.rank() > self.rank(),
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Checking => "checking",
            DocumentStatus::Extracting => "extracting",
            DocumentStatus::Extracted => "extracted",
            DocumentStatus::Cached => "cached",
            DocumentStatus::Analyzing => "analyzing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Error => "error",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentProgress {
    pub document_id: String,
    pub status: DocumentStatus,
    pub updated_at: DateTime<Utc>,
    pub error: Option<String>,
}

/// Phase of a whole batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchPhase {
    Extraction,
    Analysis,
    Completed,
    Error,
}

/// Snapshot handed to progress callbacks after every completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingProgress {
    pub phase: BatchPhase,
    pub total: usize,
    pub processed: usize,
    pub extracted: usize,
    pub analyzed: usize,
    pub failed: usize,
    pub cached: usize,
    pub current_item: Option<String>,
    pub eta_ms: Option<u64>,
    pub started_at: DateTime<Utc>,
    pub errors: Vec<BatchItemError>,
}

impl ProcessingProgress {
    pub fn new(total: usize) -> Self {
        Self {
            phase: BatchPhase::Extraction,
            total,
            processed: 0,
            extracted: 0,
            analyzed: 0,
            failed: 0,
            cached: 0,
            current_item: None,
            eta_ms: None,
            started_at: Utc::now(),
            errors: Vec::new(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.processed)
    }

    /// Fraction of documents processed, 0-1.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.processed as f64 / self.total as f64
        }
    }
}

/// Live document-id → status map, shared between the workers and any poller.
#[derive(Debug, Clone, Default)]
pub struct ProgressStore {
    inner: Arc<Mutex<HashMap<String, DocumentProgress>>>,
}

impl ProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, DocumentProgress>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reset the store and register every document as pending.
    pub fn begin<'a>(&self, document_ids: impl IntoIterator<Item = &'a str>) {
        let now = Utc::now();
        let mut map = self.lock();
        map.clear();
        for id in document_ids {
            map.insert(
                id.to_string(),
                DocumentProgress {
                    document_id: id.to_string(),
                    status: DocumentStatus::Pending,
                    updated_at: now,
                    error: None,
                },
            );
        }
    }

    /// Register one document as pending, replacing any earlier entry for it.
    pub fn track(&self, document_id: &str) {
        self.lock().insert(
            document_id.to_string(),
            DocumentProgress {
                document_id: document_id.to_string(),
                status: DocumentStatus::Pending,
                updated_at: Utc::now(),
                error: None,
            },
        );
    }

    /// Move `document_id` to `status`. Regressions are ignored and reported
    /// as `false`.
    pub fn advance(&self, document_id: &str, status: DocumentStatus) -> bool {
        self.advance_with_error(document_id, status, None)
    }

    pub fn fail(&self, document_id: &str, error: impl Into<String>) -> bool {
        self.advance_with_error(document_id, DocumentStatus::Error, Some(error.into()))
    }

    /// Force a non-terminal document into `error`, whatever stage it reached.
    /// Used when a document is cancelled or its task dies.
    pub fn abort(&self, document_id: &str, reason: impl Into<String>) -> bool {
        let mut map = self.lock();
        let entry = map
            .entry(document_id.to_string())
            .or_insert_with(|| DocumentProgress {
                document_id: document_id.to_string(),
                status: DocumentStatus::Pending,
                updated_at: Utc::now(),
                error: None,
            });

        if entry.status.is_terminal() {
            return false;
        }
        entry.status = DocumentStatus::Error;
        entry.updated_at = Utc::now();
        entry.error = Some(reason.into());
        true
    }

    /// Drop one document's entry.
    pub fn remove(&self, document_id: &str) -> Option<DocumentProgress> {
        self.lock().remove(document_id)
    }

    fn advance_with_error(
        &self,
        document_id: &str,
        status: DocumentStatus,
        error: Option<String>,
    ) -> bool {
        let mut map = self.lock();
        let entry = map
            .entry(document_id.to_string())
            .or_insert_with(|| DocumentProgress {
                document_id: document_id.to_string(),
                status: DocumentStatus::Pending,
                updated_at: Utc::now(),
                error: None,
            });

        if !entry.status.can_advance_to(status) {
            debug!(
                "Ignoring status change {} -> {} for {}",
                entry.status, status, document_id
            );
            return false;
        }

        entry.status = status;
        entry.updated_at = Utc::now();
        if error.is_some() {
            entry.error = error;
        }
        true
    }

    pub fn get(&self, document_id: &str) -> Option<DocumentProgress> {
        self.lock().get(document_id).cloned()
    }

    pub fn status(&self, document_id: &str) -> Option<DocumentStatus> {
        self.lock().get(document_id).map(|p| p.status)
    }

    /// All entries, ordered by document id.
    pub fn snapshot(&self) -> Vec<DocumentProgress> {
        let mut entries: Vec<DocumentProgress> = self.lock().values().cloned().collect();
        entries.sort_by(|a, b| a.document_id.cmp(&b.document_id));
        entries
    }

    pub fn count(&self, status: DocumentStatus) -> usize {
        self.lock().values().filter(|p| p.status == status).count()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}
