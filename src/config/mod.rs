// Configuration management module
// All credentials come from the environment; tunables have validated defaults
// that can be overridden per variable.


use std::env;
use thiserror::Error;
use url::Url;

/// Dimension of `text-embedding-3-small` vectors; the Pinecone index must
/// be created with the same dimension.
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 1536;

pub const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1/";
pub const DEFAULT_PINECONE_CONTROL_PLANE: &str = "https://api.pinecone.io/";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o";
pub const DEFAULT_INDEX_NAME: &str = "rag-agent-ai-qa";
pub const DEFAULT_NAMESPACE: &str = "ns3-rag-agent-ai-qa";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub openai: OpenAiConfig,
    pub pinecone: PineconeConfig,
    pub livekit: Option<LiveKitConfig>,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub api_base: Url,
    pub embedding_model: String,
    pub chat_model: String,
    pub embedding_dimension: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PineconeConfig {
    pub api_key: String,
    pub control_plane_url: Url,
    pub index_name: String,
    pub namespace: String,
    pub metric: String,
    pub cloud: String,
    pub region: String,
    pub upsert_batch_size: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiveKitConfig {
    pub api_key: String,
    pub api_secret: String,
    pub ws_url: String,
}

/// Fixed-size character windows with overlap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 200,
            chunk_overlap: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalConfig {
    /// Number of nearest vectors requested from the index.
    pub top_k: usize,
    /// Lower K used for the single broadened retry on empty results.
    pub fallback_top_k: usize,
    /// Maximum number of chunks assembled into the prompt context.
    pub context_chunks: usize,
}

impl Default for RetrievalConfig {
    #[inline]
    fn default() -> Self {
        Self {
            top_k: 20,
            fallback_top_k: 7,
            context_chunks: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    #[inline]
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variables: {0}")]
    MissingEnv(String),
    #[error("Invalid URL in {0}: {1}")]
    InvalidUrl(String, String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
    #[error("Invalid chunk size: {0} (must be between 1 and 4096)")]
    InvalidChunkSize(usize),
    #[error("Chunk overlap ({0}) must be smaller than chunk size ({1})")]
    OverlapTooLarge(usize, usize),
    #[error("Invalid top-K: {0} (must be between 1 and 1000)")]
    InvalidTopK(usize),
    #[error("Invalid upsert batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(usize),
    #[error("Invalid embedding dimension: {0} (must be between 64 and 4096)")]
    InvalidEmbeddingDimension(u32),
}

impl Config {
    /// Load configuration from the process environment. Fails fast, listing
    /// every missing required variable at once.
    #[inline]
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable lookup. This is what
    /// `from_env` delegates to; tests supply a map instead of mutating the
    /// process environment.
    #[inline]
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut missing = Vec::new();
        let openai_key = required(&lookup, "OPENAI_API_KEY", &mut missing);
        let pinecone_key = required(&lookup, "PINECONE_API_KEY", &mut missing);
        if !missing.is_empty() {
            return Err(ConfigError::MissingEnv(missing.join(", ")));
        }

        let openai = OpenAiConfig {
            api_key: openai_key.unwrap_or_default(),
            api_base: parse_url(&lookup, "OPENAI_API_BASE", DEFAULT_OPENAI_API_BASE)?,
            embedding_model: lookup("OPENAI_EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            chat_model: lookup("OPENAI_CHAT_MODEL")
                .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            embedding_dimension: parse_number(
                &lookup,
                "OPENAI_EMBEDDING_DIMENSION",
                DEFAULT_EMBEDDING_DIMENSION,
            )?,
        };

        let pinecone = PineconeConfig {
            api_key: pinecone_key.unwrap_or_default(),
            control_plane_url: parse_url(
                &lookup,
                "PINECONE_CONTROL_PLANE_URL",
                DEFAULT_PINECONE_CONTROL_PLANE,
            )?,
            index_name: lookup("PINECONE_INDEX").unwrap_or_else(|| DEFAULT_INDEX_NAME.to_string()),
            namespace: lookup("PINECONE_NAMESPACE")
                .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            metric: "cosine".to_string(),
            cloud: "aws".to_string(),
            region: "us-east-1".to_string(),
            upsert_batch_size: parse_number(&lookup, "PINECONE_UPSERT_BATCH_SIZE", 100)?,
        };

        let livekit = Self::livekit_from_lookup(&lookup)?;

        let chunking = ChunkingConfig {
            chunk_size: parse_number(&lookup, "RAG_CHUNK_SIZE", 200)?,
            chunk_overlap: parse_number(&lookup, "RAG_CHUNK_OVERLAP", 50)?,
        };

        let retrieval = RetrievalConfig {
            top_k: parse_number(&lookup, "RAG_TOP_K", 20)?,
            fallback_top_k: parse_number(&lookup, "RAG_FALLBACK_TOP_K", 7)?,
            context_chunks: parse_number(&lookup, "RAG_CONTEXT_CHUNKS", 5)?,
        };

        let server = ServerConfig {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_number(&lookup, "PORT", 8000)?,
        };

        let config = Self {
            openai,
            pinecone,
            livekit,
            chunking,
            retrieval,
            server,
        };
        config.validate()?;
        Ok(config)
    }

    /// LiveKit credentials are only required by the token service and the
    /// agent session. All-or-nothing: a partial set is a configuration error.
    fn livekit_from_lookup<F>(lookup: &F) -> Result<Option<LiveKitConfig>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("LIVEKIT_API_KEY");
        let api_secret = lookup("LIVEKIT_API_SECRET");
        let ws_url = lookup("LIVEKIT_URL");

        match (api_key, api_secret, ws_url) {
            (Some(api_key), Some(api_secret), Some(ws_url)) => Ok(Some(LiveKitConfig {
                api_key,
                api_secret,
                ws_url,
            })),
            (None, None, None) => Ok(None),
            (api_key, api_secret, ws_url) => {
                let mut missing = Vec::new();
                if api_key.is_none() {
                    missing.push("LIVEKIT_API_KEY");
                }
                if api_secret.is_none() {
                    missing.push("LIVEKIT_API_SECRET");
                }
                if ws_url.is_none() {
                    missing.push("LIVEKIT_URL");
                }
                Err(ConfigError::MissingEnv(missing.join(", ")))
            }
        }
    }

    /// Access the LiveKit configuration, failing with the full list of
    /// missing variables when none were set.
    #[inline]
    pub fn require_livekit(&self) -> Result<&LiveKitConfig, ConfigError> {
        self.livekit.as_ref().ok_or_else(|| {
            ConfigError::MissingEnv("LIVEKIT_API_KEY, LIVEKIT_API_SECRET, LIVEKIT_URL".to_string())
        })
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=4096).contains(&self.chunking.chunk_size) {
            return Err(ConfigError::InvalidChunkSize(self.chunking.chunk_size));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(ConfigError::OverlapTooLarge(
                self.chunking.chunk_overlap,
                self.chunking.chunk_size,
            ));
        }
        if !(1..=1000).contains(&self.retrieval.top_k) {
            return Err(ConfigError::InvalidTopK(self.retrieval.top_k));
        }
        if !(1..=1000).contains(&self.retrieval.fallback_top_k) {
            return Err(ConfigError::InvalidTopK(self.retrieval.fallback_top_k));
        }
        if !(1..=1000).contains(&self.pinecone.upsert_batch_size) {
            return Err(ConfigError::InvalidBatchSize(
                self.pinecone.upsert_batch_size,
            ));
        }
        if !(64..=4096).contains(&self.openai.embedding_dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(
                self.openai.embedding_dimension,
            ));
        }
        Ok(())
    }
}

fn required<F>(lookup: &F, key: &str, missing: &mut Vec<String>) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key).filter(|v| !v.trim().is_empty());
    if value.is_none() {
        missing.push(key.to_string());
    }
    value
}

fn parse_url<F>(lookup: &F, key: &str, default: &str) -> Result<Url, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut raw = lookup(key).unwrap_or_else(|| default.to_string());
    // A trailing slash keeps Url::join from replacing the final path segment.
    if !raw.ends_with('/') {
        raw.push('/');
    }
    Url::parse(&raw).map_err(|e| ConfigError::InvalidUrl(key.to_string(), e.to_string()))
}

fn parse_number<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string(), raw)),
        None => Ok(default),
    }
}
