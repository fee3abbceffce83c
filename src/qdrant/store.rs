//! [`VectorStore`] implementation on top of a Qdrant collection.

use super::client::QdrantService;
use super::filters::build_source_filter;
use super::payload::{build_payload, parse_payload};
use super::types::{PointInsert, QdrantError};
use crate::store::{
    ChunkRecord, ScoredChunk, SourceFilter, StoreError, StoredChunk, VectorStore,
};
use async_trait::async_trait;
use uuid::Uuid;

/// Chunk store backed by one Qdrant collection.
pub struct QdrantStore {
    service: QdrantService,
    collection: String,
    dimension: usize,
}

impl QdrantStore {
    /// Connect to Qdrant and make sure the collection and its payload indexes exist.
    pub async fn connect(
        url: &str,
        api_key: Option<String>,
        collection: &str,
        dimension: usize,
    ) -> Result<Self, QdrantError> {
        let service = QdrantService::new(url, api_key)?;
        Self::with_service(service, collection, dimension).await
    }

    pub(crate) async fn with_service(
        service: QdrantService,
        collection: &str,
        dimension: usize,
    ) -> Result<Self, QdrantError> {
        service
            .create_collection_if_not_exists(collection, dimension as u64)
            .await?;
        service.ensure_payload_indexes(collection).await?;
        tracing::debug!(collection, dimension, "Qdrant collection ready");
        Ok(Self {
            service,
            collection: collection.to_string(),
            dimension,
        })
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn add(&self, records: Vec<ChunkRecord>) -> Result<Vec<String>, StoreError> {
        if let Some(record) = records
            .iter()
            .find(|record| record.vector.len() != self.dimension)
        {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: record.vector.len(),
            });
        }

        let points: Vec<PointInsert> = records
            .into_iter()
            .map(|record| PointInsert {
                id: Uuid::new_v4().to_string(),
                payload: build_payload(&record.text, &record.metadata),
                vector: record.vector,
            })
            .collect();
        let ids = points.iter().map(|point| point.id.clone()).collect();

        self.service.upsert_points(&self.collection, points).await?;
        Ok(ids)
    }

    async fn search(
        &self,
        vector: &[f32],
        limit: usize,
        filter: Option<&SourceFilter>,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        let hits = self
            .service
            .search_points(
                &self.collection,
                vector.to_vec(),
                filter.map(build_source_filter),
                limit,
            )
            .await?;

        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                let (text, metadata) = parse_payload(hit.payload?)?;
                Some(ScoredChunk {
                    chunk: StoredChunk {
                        id: hit.id,
                        text,
                        metadata,
                    },
                    score: hit.score,
                })
            })
            .collect())
    }

    async fn entries(&self) -> Result<Vec<StoredChunk>, StoreError> {
        let points = self
            .service
            .scroll_payloads_with_ids(&self.collection, None)
            .await?;

        Ok(points
            .into_iter()
            .filter_map(|(id, payload)| match parse_payload(payload) {
                Some((text, metadata)) => Some(StoredChunk { id, text, metadata }),
                None => {
                    tracing::warn!(id = %id, collection = %self.collection, "Skipping point with foreign payload");
                    None
                }
            })
            .collect())
    }

    async fn delete(&self, ids: &[String]) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.service.delete_points(&self.collection, ids).await?;
        Ok(ids.len())
    }
}
