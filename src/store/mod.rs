//! Vector store abstraction shared by ingestion, retrieval, and the document registry.
//!
//! Two backends implement [`VectorStore`]: an on-disk JSON index ([`local::LocalVectorStore`])
//! and a remote Qdrant collection ([`crate::qdrant::QdrantStore`]).

pub mod local;

use crate::config::{Config, SourceMatch, VectorBackend};
use crate::qdrant::{QdrantError, QdrantStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use time::OffsetDateTime;

pub use local::LocalVectorStore;

/// Errors raised by vector store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the on-disk index failed.
    #[error("Vector store I/O failed at {path}: {source}")]
    Io {
        /// File or directory being accessed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The on-disk index could not be encoded or decoded.
    #[error("Vector store serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Remote Qdrant request failed.
    #[error("Qdrant request failed: {0}")]
    Qdrant(#[from] QdrantError),
    /// A vector did not match the dimension of the collection.
    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension of the collection.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },
}

/// Metadata persisted with every chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Path of the file as handed to ingestion.
    pub source: String,
    /// Base file name; the identifier used by listing, filtering, and deletion.
    pub document: String,
    /// Path of the persistent copy written to the upload directory.
    pub stored_path: String,
    /// Position of the chunk within its document.
    pub chunk_index: usize,
    /// SHA-256 of the chunk text, hex encoded.
    pub chunk_hash: String,
    /// RFC 3339 ingestion timestamp.
    pub ingested_at: String,
}

/// Chunk ready to be written to the store.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    /// Chunk text.
    pub text: String,
    /// Embedding of `text`.
    pub vector: Vec<f32>,
    /// Metadata stored alongside the vector.
    pub metadata: ChunkMetadata,
}

/// Chunk as read back from the store.
#[derive(Debug, Clone)]
pub struct StoredChunk {
    /// Identifier assigned by the store.
    pub id: String,
    /// Chunk text.
    pub text: String,
    /// Stored metadata.
    pub metadata: ChunkMetadata,
}

/// Search hit with its similarity score (higher is closer).
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    /// Matching chunk.
    pub chunk: StoredChunk,
    /// Cosine similarity to the query vector.
    pub score: f32,
}

/// Restricts retrieval and deletion to the chunks of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFilter {
    value: String,
    mode: SourceMatch,
}

impl SourceFilter {
    /// Build a filter for `value` under the given matching rule.
    pub fn new(value: impl Into<String>, mode: SourceMatch) -> Self {
        Self {
            value: value.into(),
            mode,
        }
    }

    /// Requested file name (or substring in `Contains` mode).
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Matching rule in effect.
    pub fn mode(&self) -> SourceMatch {
        self.mode
    }

    /// Whether a chunk with this metadata belongs to the filtered file.
    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        match self.mode {
            SourceMatch::Exact => metadata.document == self.value,
            SourceMatch::Contains => metadata.source.contains(&self.value),
        }
    }
}

/// Persistence and similarity search for embedded chunks.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Persist records and return the identifiers assigned to them, in input order.
    async fn add(&self, records: Vec<ChunkRecord>) -> Result<Vec<String>, StoreError>;

    /// Return up to `limit` chunks ranked by similarity to `vector`.
    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        filter: Option<&SourceFilter>,
    ) -> Result<Vec<ScoredChunk>, StoreError>;

    /// Return every stored chunk without its vector.
    async fn entries(&self) -> Result<Vec<StoredChunk>, StoreError>;

    /// Remove the given identifiers, returning how many were present.
    async fn delete(&self, ids: &[String]) -> Result<usize, StoreError>;
}

/// Open the backend selected by configuration.
pub async fn open_vector_store(config: &Config) -> Result<Arc<dyn VectorStore>, StoreError> {
    match config.vector_store {
        VectorBackend::Local => {
            let store = LocalVectorStore::open(
                &config.vector_store_path,
                &config.collection_name,
                config.embedding_dimension,
            )
            .await?;
            Ok(Arc::new(store))
        }
        VectorBackend::Qdrant => {
            let url = config.qdrant_url.as_deref().ok_or_else(|| {
                QdrantError::InvalidUrl("QDRANT_URL is required for the qdrant backend".into())
            })?;
            let store = QdrantStore::connect(
                url,
                config.qdrant_api_key.clone(),
                &config.collection_name,
                config.embedding_dimension,
            )
            .await?;
            Ok(Arc::new(store))
        }
    }
}

/// Compute a deterministic SHA-256 hash for the chunk text.
pub fn compute_chunk_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Current timestamp formatted for metadata storage.
pub fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(source: &str, document: &str) -> ChunkMetadata {
        ChunkMetadata {
            source: source.into(),
            document: document.into(),
            stored_path: format!("uploads/{document}"),
            chunk_index: 0,
            chunk_hash: compute_chunk_hash("text"),
            ingested_at: "2025-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn exact_filter_compares_document_names() {
        let filter = SourceFilter::new("report.pdf", SourceMatch::Exact);
        assert!(filter.matches(&metadata("/tmp/report.pdf", "report.pdf")));
        assert!(!filter.matches(&metadata("/tmp/old_report.pdf", "old_report.pdf")));
    }

    #[test]
    fn contains_filter_matches_source_substrings() {
        let filter = SourceFilter::new("report", SourceMatch::Contains);
        assert!(filter.matches(&metadata("/tmp/report.pdf", "report.pdf")));
        assert!(filter.matches(&metadata("/tmp/old_report.pdf", "old_report.pdf")));
        assert!(!filter.matches(&metadata("/tmp/notes.docx", "notes.docx")));
    }

    #[test]
    fn chunk_hash_is_stable() {
        let h1 = compute_chunk_hash("Hello world");
        let h2 = compute_chunk_hash("Hello world");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn timestamp_is_rfc3339_like() {
        let ts = current_timestamp_rfc3339();
        assert!(ts.contains('T') && ts.ends_with('Z'));
    }
}
