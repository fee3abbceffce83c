use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing document activity since startup.
#[derive(Default)]
pub struct DocumentMetrics {
    documents_ingested: AtomicU64,
    chunks_indexed: AtomicU64,
    questions_answered: AtomicU64,
    documents_deleted: AtomicU64,
}

impl DocumentMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an ingested document and the number of chunks stored for it.
    pub fn record_ingest(&self, chunk_count: u64) {
        self.documents_ingested.fetch_add(1, Ordering::Relaxed);
        self.chunks_indexed
            .fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record a question that produced an answer.
    pub fn record_question(&self) {
        self.questions_answered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a delete request that removed at least one chunk.
    pub fn record_deletion(&self) {
        self.documents_deleted.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_ingested: self.documents_ingested.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            questions_answered: self.questions_answered.load(Ordering::Relaxed),
            documents_deleted: self.documents_deleted.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of the counters used for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Documents ingested since startup.
    pub documents_ingested: u64,
    /// Chunks written across all ingested documents.
    pub chunks_indexed: u64,
    /// Questions that received an answer.
    pub questions_answered: u64,
    /// Delete requests that removed a document.
    pub documents_deleted: u64,
}
