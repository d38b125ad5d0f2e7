use thiserror::Error;

pub type Result<T> = std::result::Result<T, PitwallError>;

#[derive(Error, Debug)]
pub enum PitwallError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Completion error: {0}")]
    Completion(String),

    #[error("Scrape error: {0}")]
    Scrape(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod chunking;
pub mod commands;
pub mod completions;
pub mod config;
pub mod embeddings;
pub mod ingest;
pub mod rag;
pub mod scrape;
pub mod server;
pub mod store;
