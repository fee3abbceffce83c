#![deny(missing_docs)]

//! Core library for the document question-answering service.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Answer generation through the local language-model runtime.
pub mod generation;
/// Structured logging and tracing setup.
pub mod logging;
/// Activity counters.
pub mod metrics;
/// Document loading, chunking, and the question-answering service.
pub mod processing;
/// Qdrant vector store integration.
pub mod qdrant;
/// Vector store abstraction and the on-disk backend.
pub mod store;
