use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Knowledge store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Knowledge store error: {0}")]
    Store(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Ingest error: {0}")]
    Ingest(String),

    #[error("MCP error: {0}")]
    Mcp(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod chat;
pub mod commands;
pub mod config;
pub mod embeddings;
mod http;
pub mod knowledge;
pub mod mcp;
pub mod model;

#[cfg(test)]
pub(crate) mod testing;
