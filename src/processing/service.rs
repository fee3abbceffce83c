//! Document service coordinating ingestion, retrieval, answering, and the file registry.

use crate::{
    config::{ChunkUnit, Config, SourceMatch},
    embedding::{EmbeddingClient, EmbeddingClientError, get_embedding_client},
    generation::{AnswerGenerator, get_answer_generator},
    metrics::{DocumentMetrics, MetricsSnapshot},
    processing::{
        chunking::chunk_text,
        loaders::load_text,
        prompt::build_prompt,
        registry::{
            distinct_documents, matching_entries, owned_files, remove_files_best_effort,
            unreferenced_files,
        },
        types::{IngestOutcome, ProcessingError},
    },
    store::{
        ChunkMetadata, ChunkRecord, SourceFilter, VectorStore, compute_chunk_hash,
        current_timestamp_rfc3339, open_vector_store,
    },
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Settings the pipeline reads on every call, taken from [`Config`] at construction.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Directory receiving the persistent copy of every ingested file.
    pub upload_dir: PathBuf,
    /// Directory where HTTP uploads are staged before ingestion.
    pub media_dir: PathBuf,
    /// Maximum chunk length in `chunk_unit`s.
    pub chunk_size: usize,
    /// Units carried over from the previous chunk.
    pub chunk_overlap: usize,
    /// Unit used to measure chunk length.
    pub chunk_unit: ChunkUnit,
    /// Model name used to resolve a tokenizer when chunking by tokens.
    pub tokenizer_model: String,
    /// Number of chunks retrieved per question.
    pub top_k: usize,
    /// How a requested file name is matched against stored chunks.
    pub source_match: SourceMatch,
}

impl PipelineSettings {
    /// Extract pipeline settings from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            upload_dir: config.upload_dir.clone(),
            media_dir: config.media_dir.clone(),
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            chunk_unit: config.chunk_unit,
            tokenizer_model: config.embedding_model.clone(),
            top_k: config.retrieval_top_k,
            source_match: config.source_match,
        }
    }
}

/// Operations exposed to the HTTP and CLI surfaces.
#[async_trait]
pub trait DocumentApi: Send + Sync {
    /// Copy, parse, chunk, embed, and store the file at `path`.
    async fn ingest(&self, path: &Path) -> Result<IngestOutcome, ProcessingError>;

    /// Stage uploaded bytes under the media directory, then ingest them.
    async fn ingest_upload(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<IngestOutcome, ProcessingError>;

    /// Answer `question` from the stored chunks, optionally scoped to one file.
    async fn ask(&self, question: &str, target_file: Option<&str>)
    -> Result<String, ProcessingError>;

    /// Distinct names of every ingested file, sorted.
    async fn list_documents(&self) -> Result<Vec<String>, ProcessingError>;

    /// Remove every chunk of `filename` and its files; `false` when nothing matched.
    async fn delete_document(&self, filename: &str) -> Result<bool, ProcessingError>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Runs the ingest and question pipelines against a shared vector store.
///
/// Construct the service once near process start and share it through an `Arc`; every call
/// builds its own retrieval filter, so concurrent requests scoped to different files never see
/// each other's settings.
pub struct DocumentService {
    settings: PipelineSettings,
    embedding_client: Box<dyn EmbeddingClient + Send + Sync>,
    generator: Box<dyn AnswerGenerator + Send + Sync>,
    store: Arc<dyn VectorStore>,
    metrics: Arc<DocumentMetrics>,
}

impl DocumentService {
    /// Build the service from configuration, opening the vector store and provider clients.
    pub async fn new(config: &Config) -> Result<Self, ProcessingError> {
        tracing::info!(provider = ?config.embedding_provider, "Initializing embedding client");
        let embedding_client = get_embedding_client(config)?;
        let generator = get_answer_generator(config)?;
        tracing::debug!(backend = ?config.vector_store, collection = %config.collection_name, "Opening vector store");
        let store = open_vector_store(config).await?;
        tracing::info!("Document service ready");

        Ok(Self::with_components(
            PipelineSettings::from_config(config),
            embedding_client,
            generator,
            store,
        ))
    }

    /// Assemble a service from explicit components.
    pub fn with_components(
        settings: PipelineSettings,
        embedding_client: Box<dyn EmbeddingClient + Send + Sync>,
        generator: Box<dyn AnswerGenerator + Send + Sync>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            settings,
            embedding_client,
            generator,
            store,
            metrics: Arc::new(DocumentMetrics::new()),
        }
    }

    /// Settings in effect for this service.
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Ingest the file at `path`.
    ///
    /// The file is first copied into the upload directory under its own name, then parsed with
    /// the loader chosen by extension. Every chunk records the original path as `source`, the
    /// base name as `document`, and the upload copy as `stored_path`. A failure after chunks
    /// start landing is not rolled back.
    pub async fn ingest(&self, path: &Path) -> Result<IngestOutcome, ProcessingError> {
        let document = file_name_of(path).ok_or(ProcessingError::MissingInput("file name"))?;
        let source = path.to_string_lossy().into_owned();
        tracing::info!(source = %source, document = %document, "Ingesting document");

        let stored_path = self.copy_to_uploads(path, &document).await?;
        let text = load_text(path).await?;
        let chunks = chunk_text(
            &text,
            self.settings.chunk_size,
            self.settings.chunk_overlap,
            self.settings.chunk_unit,
            &self.settings.tokenizer_model,
        )?;
        tracing::debug!(
            document = %document,
            chunks = chunks.len(),
            chunk_size = self.settings.chunk_size,
            overlap = self.settings.chunk_overlap,
            unit = ?self.settings.chunk_unit,
            "Document chunked"
        );

        let embeddings = if chunks.is_empty() {
            Vec::new()
        } else {
            self.embedding_client
                .generate_embeddings(chunks.clone())
                .await?
        };

        let ingested_at = current_timestamp_rfc3339();
        let stored_path_text = stored_path.to_string_lossy().into_owned();
        let records: Vec<ChunkRecord> = chunks
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(chunk_index, (text, vector))| ChunkRecord {
                metadata: ChunkMetadata {
                    source: source.clone(),
                    document: document.clone(),
                    stored_path: stored_path_text.clone(),
                    chunk_index,
                    chunk_hash: compute_chunk_hash(&text),
                    ingested_at: ingested_at.clone(),
                },
                text,
                vector,
            })
            .collect();

        let ids = self.store.add(records).await?;
        let chunk_count = ids.len();
        self.metrics.record_ingest(chunk_count as u64);
        tracing::info!(document = %document, chunks = chunk_count, "Document indexed");

        Ok(IngestOutcome {
            document,
            stored_path,
            chunk_count,
        })
    }

    /// Write uploaded bytes to `<media_dir>/<base name>` and ingest the staged file.
    pub async fn ingest_upload(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<IngestOutcome, ProcessingError> {
        let name = file_name_of(Path::new(file_name))
            .ok_or(ProcessingError::MissingInput("file name"))?;
        let media_dir = &self.settings.media_dir;
        tokio::fs::create_dir_all(media_dir)
            .await
            .map_err(|source| ProcessingError::Upload {
                path: media_dir.clone(),
                source,
            })?;

        let staged = media_dir.join(&name);
        tokio::fs::write(&staged, &bytes)
            .await
            .map_err(|source| ProcessingError::Upload {
                path: staged.clone(),
                source,
            })?;
        tracing::debug!(path = %staged.display(), bytes = bytes.len(), "Upload staged");

        self.ingest(&staged).await
    }

    /// Answer a question from the most similar stored chunks.
    ///
    /// A blank `target_file` is treated as absent. When nothing is retrieved the prompt carries
    /// an empty context and the generator is still invoked once.
    pub async fn ask(
        &self,
        question: &str,
        target_file: Option<&str>,
    ) -> Result<String, ProcessingError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ProcessingError::MissingInput("question"));
        }

        let filter = target_file
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| SourceFilter::new(value, self.settings.source_match));

        let mut vectors = self
            .embedding_client
            .generate_embeddings(vec![question.to_string()])
            .await?;
        let vector = vectors.pop().ok_or_else(|| {
            EmbeddingClientError::InvalidResponse("no vector returned for question".into())
        })?;

        let hits = self
            .store
            .search(&vector, self.settings.top_k, filter.as_ref())
            .await?;
        tracing::debug!(
            hits = hits.len(),
            top_k = self.settings.top_k,
            target_file = ?filter.as_ref().map(SourceFilter::value),
            "Context retrieved"
        );

        let prompt = build_prompt(&hits, question);
        let answer = self.generator.generate(&prompt).await?;
        self.metrics.record_question();
        tracing::info!(context_chunks = hits.len(), "Question answered");
        Ok(answer)
    }

    /// Distinct base names of every ingested file, sorted.
    pub async fn list_documents(&self) -> Result<Vec<String>, ProcessingError> {
        let entries = self.store.entries().await?;
        Ok(distinct_documents(&entries))
    }

    /// Remove every chunk of `filename` and delete the files the service owns for it.
    ///
    /// File removal is best-effort: failures are logged and the call still reports success
    /// once the chunks are gone.
    pub async fn delete_document(&self, filename: &str) -> Result<bool, ProcessingError> {
        let filename = filename.trim();
        if filename.is_empty() {
            return Err(ProcessingError::MissingInput("filename"));
        }

        let filter = SourceFilter::new(filename, self.settings.source_match);
        let entries = self.store.entries().await?;
        let matching = matching_entries(&entries, &filter);
        if matching.is_empty() {
            tracing::info!(filename, "No chunks matched delete request");
            return Ok(false);
        }

        let ids: Vec<String> = matching.iter().map(|entry| entry.id.clone()).collect();
        let removed = self.store.delete(&ids).await?;
        let owned = owned_files(&matching, &self.settings.media_dir);
        match self.store.entries().await {
            Ok(remaining) => remove_files_best_effort(unreferenced_files(owned, &remaining)).await,
            Err(error) => {
                tracing::warn!(filename, error = %error, "Could not list remaining chunks; keeping document files");
            }
        }

        if removed > 0 {
            self.metrics.record_deletion();
        }
        tracing::info!(filename, chunks = removed, "Document deleted");
        Ok(removed > 0)
    }

    /// Return the current metrics snapshot.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    async fn copy_to_uploads(&self, path: &Path, document: &str) -> Result<PathBuf, ProcessingError> {
        let upload_dir = &self.settings.upload_dir;
        tokio::fs::create_dir_all(upload_dir)
            .await
            .map_err(|source| ProcessingError::Upload {
                path: upload_dir.clone(),
                source,
            })?;

        let target = upload_dir.join(document);
        if is_same_file(path, &target).await {
            tracing::debug!(path = %target.display(), "Source already in upload directory");
            return Ok(target);
        }

        tokio::fs::copy(path, &target)
            .await
            .map_err(|source| ProcessingError::Upload {
                path: target.clone(),
                source,
            })?;
        Ok(target)
    }
}

fn file_name_of(path: &Path) -> Option<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.trim().is_empty())
}

async fn is_same_file(a: &Path, b: &Path) -> bool {
    match (
        tokio::fs::canonicalize(a).await,
        tokio::fs::canonicalize(b).await,
    ) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[async_trait]
impl DocumentApi for DocumentService {
    async fn ingest(&self, path: &Path) -> Result<IngestOutcome, ProcessingError> {
        DocumentService::ingest(self, path).await
    }

    async fn ingest_upload(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<IngestOutcome, ProcessingError> {
        DocumentService::ingest_upload(self, file_name, bytes).await
    }

    async fn ask(
        &self,
        question: &str,
        target_file: Option<&str>,
    ) -> Result<String, ProcessingError> {
        DocumentService::ask(self, question, target_file).await
    }

    async fn list_documents(&self) -> Result<Vec<String>, ProcessingError> {
        DocumentService::list_documents(self).await
    }

    async fn delete_document(&self, filename: &str) -> Result<bool, ProcessingError> {
        DocumentService::delete_document(self, filename).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        DocumentService::metrics_snapshot(self)
    }
}
