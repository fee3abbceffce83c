//! Qdrant vector store integration.

pub mod client;
pub mod filters;
mod payload;
mod store;
pub mod types;

pub use client::QdrantService;
pub use filters::build_source_filter;
pub use store::QdrantStore;
pub use types::{PointInsert, QdrantError, ScoredPoint};
