//! Document pipeline: loading, chunking, prompting, and the service tying them to the stores.

mod chunking;
pub mod loaders;
mod prompt;
mod registry;
mod service;
pub mod types;

pub use loaders::{DocumentFormat, LoaderError, load_text};
pub use service::{DocumentApi, DocumentService, PipelineSettings};
pub use types::{ChunkingError, IngestOutcome, ProcessingError};
