//! On-disk vector index.
//!
//! Each collection lives in `<dir>/<collection>.json`. The file is the only source of truth:
//! every operation re-reads it, and mutations run read-modify-write under a lock shared by all
//! handles on the same path in this process. Writes go through a temporary file plus rename,
//! so readers never observe a partially written index.

use super::{ChunkRecord, ScoredChunk, SourceFilter, StoreError, StoredChunk, VectorStore};
use crate::store::ChunkMetadata;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, PoisonError};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LocalEntry {
    id: String,
    text: String,
    vector: Vec<f32>,
    metadata: ChunkMetadata,
}

impl LocalEntry {
    fn to_stored(&self) -> StoredChunk {
        StoredChunk {
            id: self.id.clone(),
            text: self.text.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    collection: String,
    dimension: usize,
    #[serde(default)]
    entries: Vec<LocalEntry>,
}

type IndexLock = Arc<Mutex<()>>;

static INDEX_LOCKS: OnceLock<std::sync::Mutex<HashMap<PathBuf, IndexLock>>> = OnceLock::new();

/// Lock guarding one index file, shared by every handle opened on it.
fn index_lock(path: &Path) -> IndexLock {
    let locks = INDEX_LOCKS.get_or_init(Default::default);
    let mut locks = locks.lock().unwrap_or_else(PoisonError::into_inner);
    locks.entry(path.to_path_buf()).or_default().clone()
}

/// JSON-file backed vector store with brute-force cosine search.
pub struct LocalVectorStore {
    path: PathBuf,
    collection: String,
    dimension: usize,
    lock: IndexLock,
}

impl LocalVectorStore {
    /// Open (or create) the collection index under `dir`.
    pub async fn open(
        dir: impl AsRef<Path>,
        collection: &str,
        dimension: usize,
    ) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| StoreError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        let dir = tokio::fs::canonicalize(dir)
            .await
            .unwrap_or_else(|_| dir.to_path_buf());
        let path = dir.join(format!("{collection}.json"));

        let store = Self {
            lock: index_lock(&path),
            path,
            collection: collection.to_string(),
            dimension,
        };
        let entries = store.load().await?;

        tracing::debug!(
            path = %store.path.display(),
            entries = entries.len(),
            dimension,
            "Opened local vector store"
        );
        Ok(store)
    }

    /// Location of the index file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current contents of the index file; a missing file is an empty index.
    async fn load(&self) -> Result<Vec<LocalEntry>, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        let index: IndexFile = serde_json::from_slice(&bytes)?;
        if index.dimension != self.dimension && !index.entries.is_empty() {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: index.dimension,
            });
        }
        Ok(index.entries)
    }

    async fn persist(&self, entries: Vec<LocalEntry>) -> Result<(), StoreError> {
        let index = IndexFile {
            collection: self.collection.clone(),
            dimension: self.dimension,
            entries,
        };
        let bytes = serde_json::to_vec(&index)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|source| StoreError::Io {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|source| StoreError::Io {
                path: self.path.clone(),
                source,
            })
    }
}

#[async_trait]
impl VectorStore for LocalVectorStore {
    async fn add(&self, records: Vec<ChunkRecord>) -> Result<Vec<String>, StoreError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(record) = records
            .iter()
            .find(|record| record.vector.len() != self.dimension)
        {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: record.vector.len(),
            });
        }

        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            let id = Uuid::new_v4().to_string();
            ids.push(id.clone());
            entries.push(LocalEntry {
                id,
                text: record.text,
                vector: record.vector,
                metadata: record.metadata,
            });
        }
        let total = entries.len();
        self.persist(entries).await?;

        tracing::debug!(
            collection = %self.collection,
            added = ids.len(),
            total,
            "Chunks persisted"
        );
        Ok(ids)
    }

    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        filter: Option<&SourceFilter>,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        if vector.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        let entries = {
            let _guard = self.lock.lock().await;
            self.load().await?
        };
        let mut hits: Vec<ScoredChunk> = entries
            .iter()
            .filter(|entry| filter.is_none_or(|filter| filter.matches(&entry.metadata)))
            .map(|entry| ScoredChunk {
                score: cosine_similarity(vector, &entry.vector).unwrap_or(0.0),
                chunk: entry.to_stored(),
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn entries(&self) -> Result<Vec<StoredChunk>, StoreError> {
        let _guard = self.lock.lock().await;
        let entries = self.load().await?;
        Ok(entries.iter().map(LocalEntry::to_stored).collect())
    }

    async fn delete(&self, ids: &[String]) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let targets: HashSet<&str> = ids.iter().map(String::as_str).collect();

        let _guard = self.lock.lock().await;
        let entries = self.load().await?;
        let before = entries.len();
        let remaining: Vec<LocalEntry> = entries
            .into_iter()
            .filter(|entry| !targets.contains(entry.id.as_str()))
            .collect();
        let removed = before - remaining.len();
        if removed == 0 {
            return Ok(0);
        }
        self.persist(remaining).await?;

        tracing::debug!(collection = %self.collection, removed, "Chunks deleted");
        Ok(removed)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let x64 = f64::from(x);
        let y64 = f64::from(y);
        dot += x64 * y64;
        norm_a += x64 * x64;
        norm_b += y64 * y64;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= f64::EPSILON {
        return None;
    }
    Some((dot / denom) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceMatch;

    fn record(document: &str, index: usize, vector: Vec<f32>) -> ChunkRecord {
        ChunkRecord {
            text: format!("{document} chunk {index}"),
            vector,
            metadata: ChunkMetadata {
                source: format!("/incoming/{document}"),
                document: document.into(),
                stored_path: format!("uploads/{document}"),
                chunk_index: index,
                chunk_hash: format!("hash-{index}"),
                ingested_at: "2025-01-01T00:00:00Z".into(),
            },
        }
    }

    #[tokio::test]
    async fn add_assigns_unique_ids_and_persists() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalVectorStore::open(dir.path(), "docs", 2)
            .await
            .expect("open");
        let ids = store
            .add(vec![
                record("a.pdf", 0, vec![1.0, 0.0]),
                record("a.pdf", 1, vec![0.0, 1.0]),
            ])
            .await
            .expect("add");

        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
        assert!(store.path().exists());

        let reopened = LocalVectorStore::open(dir.path(), "docs", 2)
            .await
            .expect("reopen");
        let entries = reopened.entries().await.expect("entries");
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().any(|entry| entry.id == ids[0]));
    }

    #[tokio::test]
    async fn search_ranks_by_similarity_and_applies_filter() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalVectorStore::open(dir.path(), "docs", 2)
            .await
            .expect("open");
        store
            .add(vec![
                record("a.pdf", 0, vec![1.0, 0.0]),
                record("b.docx", 0, vec![0.9, 0.1]),
                record("b.docx", 1, vec![0.0, 1.0]),
            ])
            .await
            .expect("add");

        let hits = store.search(&[1.0, 0.0], 2, None).await.expect("search");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.metadata.document, "a.pdf");
        assert_eq!(hits[1].chunk.metadata.document, "b.docx");

        let filter = SourceFilter::new("b.docx", SourceMatch::Exact);
        let scoped = store
            .search(&[1.0, 0.0], 5, Some(&filter))
            .await
            .expect("search");
        assert_eq!(scoped.len(), 2);
        assert!(scoped.iter().all(|hit| hit.chunk.metadata.document == "b.docx"));

        let missing = SourceFilter::new("c.pdf", SourceMatch::Exact);
        let none = store
            .search(&[1.0, 0.0], 5, Some(&missing))
            .await
            .expect("search");
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn delete_removes_only_requested_ids() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalVectorStore::open(dir.path(), "docs", 2)
            .await
            .expect("open");
        let ids = store
            .add(vec![
                record("a.pdf", 0, vec![1.0, 0.0]),
                record("b.docx", 0, vec![0.0, 1.0]),
            ])
            .await
            .expect("add");

        let removed = store
            .delete(&[ids[0].clone(), "unknown".into()])
            .await
            .expect("delete");
        assert_eq!(removed, 1);

        let entries = store.entries().await.expect("entries");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, ids[1]);
        assert_eq!(store.delete(&[]).await.expect("noop"), 0);
    }

    #[tokio::test]
    async fn rejects_vectors_of_wrong_dimension() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalVectorStore::open(dir.path(), "docs", 3)
            .await
            .expect("open");
        let error = store
            .add(vec![record("a.pdf", 0, vec![1.0, 0.0])])
            .await
            .expect_err("dimension");
        assert!(matches!(
            error,
            StoreError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
        assert!(store.entries().await.expect("entries").is_empty());
    }

    #[tokio::test]
    async fn two_handles_on_one_directory_keep_both_writes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = LocalVectorStore::open(dir.path(), "docs", 2)
            .await
            .expect("open first");
        let second = LocalVectorStore::open(dir.path(), "docs", 2)
            .await
            .expect("open second");

        let first_ids = first
            .add(vec![record("a.pdf", 0, vec![1.0, 0.0])])
            .await
            .expect("add through first");
        let second_ids = second
            .add(vec![record("b.docx", 0, vec![0.0, 1.0])])
            .await
            .expect("add through second");

        for handle in [&first, &second] {
            let entries = handle.entries().await.expect("entries");
            assert_eq!(entries.len(), 2);
        }
        let hits = first
            .search(&[0.0, 1.0], 1, None)
            .await
            .expect("search");
        assert_eq!(hits[0].chunk.id, second_ids[0]);

        let reopened = LocalVectorStore::open(dir.path(), "docs", 2)
            .await
            .expect("reopen");
        let documents: HashSet<String> = reopened
            .entries()
            .await
            .expect("entries")
            .into_iter()
            .map(|entry| entry.metadata.document)
            .collect();
        assert_eq!(
            documents,
            HashSet::from(["a.pdf".to_string(), "b.docx".to_string()])
        );

        assert_eq!(second.delete(&first_ids).await.expect("delete"), 1);
        let remaining = first.entries().await.expect("entries");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, second_ids[0]);
    }

    #[tokio::test]
    async fn concurrent_adds_through_separate_handles_are_not_lost() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = LocalVectorStore::open(dir.path(), "docs", 2)
            .await
            .expect("open first");
        let second = LocalVectorStore::open(dir.path(), "docs", 2)
            .await
            .expect("open second");

        let (left, right) = tokio::join!(
            first.add(vec![record("a.pdf", 0, vec![1.0, 0.0])]),
            second.add(vec![record("b.docx", 0, vec![0.0, 1.0])]),
        );
        left.expect("first add");
        right.expect("second add");

        assert_eq!(first.entries().await.expect("entries").len(), 2);
    }

    #[tokio::test]
    async fn index_written_outside_the_handle_is_visible() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalVectorStore::open(dir.path(), "docs", 2)
            .await
            .expect("open");
        assert!(store.entries().await.expect("entries").is_empty());

        let writer = LocalVectorStore::open(dir.path(), "docs", 2)
            .await
            .expect("open writer");
        writer
            .add(vec![record("c.pdf", 0, vec![1.0, 0.0])])
            .await
            .expect("add");
        let entries = store.entries().await.expect("entries");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].metadata.document, "c.pdf");

        std::fs::remove_file(store.path()).expect("remove index");
        assert!(store.entries().await.expect("entries").is_empty());
    }

    #[test]
    fn cosine_similarity_handles_degenerate_vectors() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), None);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), None);
        let same = cosine_similarity(&[1.0, 2.0], &[1.0, 2.0]).expect("score");
        assert!((same - 1.0).abs() < 1e-6);
    }
}
