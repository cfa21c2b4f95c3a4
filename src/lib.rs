use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Ingestion error: {0}")]
    Ingest(String),

    #[error("Token error: {0}")]
    Token(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod agent;
pub mod config;
pub mod ingest;
pub mod livekit;
pub mod net;
pub mod openai;
pub mod pinecone;
pub mod rag;
pub mod server;
