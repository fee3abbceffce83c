//! Core data types and error definitions for the processing pipeline.

use crate::{
    embedding::EmbeddingClientError, generation::GenerationError,
    processing::loaders::LoaderError, store::StoreError,
};
use anyhow::Error as TokenizerError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while turning raw text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Ingestion configured an impossible budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Tokenizer resources were unavailable for the configured model.
    #[error("failed to initialize tokenizer for model '{model}': {source}")]
    Tokenizer {
        /// Model we attempted to load a tokenizer for.
        model: String,
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: TokenizerError,
    },
}

/// Errors emitted by the ingestion, query, and registry operations.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// A required input (file, file name, question) was absent or blank.
    #[error("Missing input: {0}")]
    MissingInput(&'static str),
    /// The document could not be read or parsed.
    #[error("Failed to load document: {0}")]
    Load(#[from] LoaderError),
    /// Chunking step failed to segment the document.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding provider failed to produce vectors.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Answer generator failed or was unreachable.
    #[error("Failed to generate answer: {0}")]
    Generation(#[from] GenerationError),
    /// Vector store rejected a read or write.
    #[error("Vector store failure: {0}")]
    Store(#[from] StoreError),
    /// Writing an uploaded or copied file failed.
    #[error("Failed to write {path}: {source}")]
    Upload {
        /// Destination being written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Summary of a completed ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    /// Document identifier (base file name).
    pub document: String,
    /// Persistent copy written to the upload directory.
    pub stored_path: PathBuf,
    /// Number of chunks written to the vector store.
    pub chunk_count: usize,
}
