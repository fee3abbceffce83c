use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the document question-answering server.
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend that persists chunks and their embeddings.
    pub vector_store: VectorBackend,
    /// Directory holding the on-disk index when the local backend is selected.
    pub vector_store_path: PathBuf,
    /// Collection that receives every ingested chunk.
    pub collection_name: String,
    /// Base URL of the Qdrant instance, required for the `qdrant` backend.
    pub qdrant_url: Option<String>,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Directory receiving persistent copies of ingested files.
    pub upload_dir: PathBuf,
    /// Directory where HTTP uploads land before ingestion.
    pub media_dir: PathBuf,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Base URL of the local Ollama runtime (embeddings and answers).
    pub ollama_url: String,
    /// Base URL of an OpenAI-compatible embeddings API.
    pub openai_base_url: String,
    /// API key for the OpenAI-compatible embeddings API.
    pub openai_api_key: Option<String>,
    /// Model used to generate answers.
    pub generation_model: String,
    /// Upper bound on the size of a single chunk, in `chunk_unit`s.
    pub chunk_size: usize,
    /// Overlap carried from one chunk into the next, in `chunk_unit`s.
    pub chunk_overlap: usize,
    /// Unit used to measure chunk size and overlap.
    pub chunk_unit: ChunkUnit,
    /// Number of chunks retrieved for every question.
    pub retrieval_top_k: usize,
    /// How a file name is matched against stored chunk metadata.
    pub source_match: SourceMatch,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported vector store backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VectorBackend {
    /// JSON index persisted under `VECTOR_STORE_PATH`.
    Local,
    /// Remote Qdrant collection.
    Qdrant,
}

/// Supported embedding backends for the ingestion and query pipelines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbeddingProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Hosted OpenAI (or compatible) embeddings API.
    OpenAI,
    /// Deterministic byte-hash embeddings that need no external service.
    Hash,
}

/// Unit in which chunk budgets are expressed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkUnit {
    /// Unicode scalar values.
    Characters,
    /// Tokenizer tokens as counted by `tiktoken`.
    Tokens,
}

/// Matching rule applied when a file name scopes retrieval or deletion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceMatch {
    /// The stored document name must equal the requested name.
    Exact,
    /// The stored source path must contain the requested string.
    Contains,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vector_store: VectorBackend::Local,
            vector_store_path: PathBuf::from("db_storage"),
            collection_name: "my_docs".into(),
            qdrant_url: None,
            qdrant_api_key: None,
            upload_dir: PathBuf::from("uploads"),
            media_dir: PathBuf::from("media"),
            embedding_provider: EmbeddingProvider::Ollama,
            embedding_model: "all-minilm".into(),
            embedding_dimension: 384,
            ollama_url: "http://127.0.0.1:11434".into(),
            openai_base_url: "https://api.openai.com".into(),
            openai_api_key: None,
            generation_model: "llama3".into(),
            chunk_size: 1000,
            chunk_overlap: 100,
            chunk_unit: ChunkUnit::Characters,
            retrieval_top_k: 5,
            source_match: SourceMatch::Exact,
            server_port: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let vector_store = parse_env("VECTOR_STORE", defaults.vector_store)?;
        let qdrant_url = match vector_store {
            VectorBackend::Qdrant => Some(load_env("QDRANT_URL")?),
            VectorBackend::Local => load_env_optional("QDRANT_URL"),
        };

        let config = Self {
            vector_store,
            vector_store_path: load_env_optional("VECTOR_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.vector_store_path),
            collection_name: load_env_optional("COLLECTION_NAME")
                .unwrap_or(defaults.collection_name),
            qdrant_url,
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            upload_dir: load_env_optional("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            media_dir: load_env_optional("MEDIA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.media_dir),
            embedding_provider: parse_env("EMBEDDING_PROVIDER", defaults.embedding_provider)?,
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or(defaults.embedding_model),
            embedding_dimension: parse_env("EMBEDDING_DIMENSION", defaults.embedding_dimension)?,
            ollama_url: load_env_optional("OLLAMA_URL").unwrap_or(defaults.ollama_url),
            openai_base_url: load_env_optional("OPENAI_BASE_URL")
                .unwrap_or(defaults.openai_base_url),
            openai_api_key: load_env_optional("OPENAI_API_KEY"),
            generation_model: load_env_optional("GENERATION_MODEL")
                .unwrap_or(defaults.generation_model),
            chunk_size: parse_env("CHUNK_SIZE", defaults.chunk_size)?,
            chunk_overlap: parse_env("CHUNK_OVERLAP", defaults.chunk_overlap)?,
            chunk_unit: parse_env("CHUNK_UNIT", defaults.chunk_unit)?,
            retrieval_top_k: parse_env("RETRIEVAL_TOP_K", defaults.retrieval_top_k)?,
            source_match: parse_env("SOURCE_MATCH", defaults.source_match)?,
            server_port: load_env_optional("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations the pipeline cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidValue("CHUNK_SIZE".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::InvalidValue("CHUNK_OVERLAP".into()));
        }
        if self.retrieval_top_k == 0 {
            return Err(ConfigError::InvalidValue("RETRIEVAL_TOP_K".into()));
        }
        if self.embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".into()));
        }
        Ok(())
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    load_env_optional(key).ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match load_env_optional(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

impl FromStr for VectorBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "qdrant" => Ok(Self::Qdrant),
            _ => Err(()),
        }
    }
}

impl FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            "hash" => Ok(Self::Hash),
            _ => Err(()),
        }
    }
}

impl FromStr for ChunkUnit {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "characters" | "chars" => Ok(Self::Characters),
            "tokens" => Ok(Self::Tokens),
            _ => Err(()),
        }
    }
}

impl FromStr for SourceMatch {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "exact" => Ok(Self::Exact),
            "contains" => Ok(Self::Contains),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Load configuration from the environment and install it in the global cache.
///
/// Binaries call this once; library components receive the returned reference explicitly.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        vector_store = ?config.vector_store,
        collection = %config.collection_name,
        embedding_provider = ?config.embedding_provider,
        embedding_model = %config.embedding_model,
        generation_model = %config.generation_model,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    Ok(CONFIG.get_or_init(|| config))
}
