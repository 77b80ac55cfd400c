use thiserror::Error;

pub type Result<T> = std::result::Result<T, RecallError>;

#[derive(Error, Debug)]
pub enum RecallError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod engine;
pub mod search;
pub mod stats;
pub mod store;
pub mod timeframe;

pub use database::sqlite::models::{EmbeddingOrigin, SourceCategory};
pub use engine::{IngestItem, IngestOutcome, RecallEngine, SearchRequest};
pub use search::SearchHit;
pub use stats::Stats;
pub use timeframe::{DateFilter, DateRange, Timeframe};
