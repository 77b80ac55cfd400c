#[cfg(test)]
mod tests;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use std::str::FromStr;

/// Kind of record an embedding was derived from
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Type,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum SourceCategory {
    Requirement,
    Defect,
    TestCase,
    Document,
    DocumentSection,
}

impl SourceCategory {
    pub const ALL: [SourceCategory; 5] = [
        SourceCategory::Requirement,
        SourceCategory::Defect,
        SourceCategory::TestCase,
        SourceCategory::Document,
        SourceCategory::DocumentSection,
    ];

    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            SourceCategory::Requirement => "requirement",
            SourceCategory::Defect => "defect",
            SourceCategory::TestCase => "test_case",
            SourceCategory::Document => "document",
            SourceCategory::DocumentSection => "document_section",
        }
    }
}

impl std::fmt::Display for SourceCategory {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceCategory {
    type Err = anyhow::Error;

    /// Accepts the canonical tag, or the same tag with `-` separators
    #[inline]
    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        SourceCategory::ALL
            .into_iter()
            .find(|category| category.as_str() == normalized)
            .ok_or_else(|| anyhow!("Unknown source category: {}", s))
    }
}

/// Whether a vector came from the embedding provider or the local fallback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum EmbeddingOrigin {
    Provider,
    Fallback,
}

impl std::fmt::Display for EmbeddingOrigin {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            EmbeddingOrigin::Provider => write!(f, "provider"),
            EmbeddingOrigin::Fallback => write!(f, "fallback"),
        }
    }
}

/// Row as stored in the `embeddings` table
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct EmbeddingRow {
    pub source_id: String,
    pub source_category: SourceCategory,
    pub vector: Vec<u8>,
    pub dimension: i64,
    pub snippet: String,
    pub embedding_origin: EmbeddingOrigin,
    pub reference_timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Decoded embedding record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredEmbedding {
    pub source_id: String,
    pub source_category: SourceCategory,
    pub vector: Vec<f32>,
    pub snippet: String,
    pub origin: EmbeddingOrigin,
    pub reference_timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<EmbeddingRow> for StoredEmbedding {
    type Error = anyhow::Error;

    #[inline]
    fn try_from(row: EmbeddingRow) -> Result<Self> {
        let vector = decode_vector(&row.vector)?;
        if vector.len() as i64 != row.dimension {
            return Err(anyhow!(
                "Stored vector for {}/{} has {} values but dimension column says {}",
                row.source_category,
                row.source_id,
                vector.len(),
                row.dimension
            ));
        }

        Ok(Self {
            source_id: row.source_id,
            source_category: row.source_category,
            vector,
            snippet: row.snippet,
            origin: row.embedding_origin,
            reference_timestamp: row.reference_timestamp,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewEmbedding {
    pub source_id: String,
    pub source_category: SourceCategory,
    pub vector: Vec<f32>,
    pub snippet: String,
    pub origin: EmbeddingOrigin,
    pub reference_timestamp: DateTime<Utc>,
}

/// Key and timestamp of a stored embedding, without its vector
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct CandidateKey {
    pub source_id: String,
    pub source_category: SourceCategory,
    pub reference_timestamp: DateTime<Utc>,
}

/// Per-category row count
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct CategoryCount {
    pub source_category: SourceCategory,
    pub count: i64,
}

/// Serialize a vector as little-endian f32 bytes
#[inline]
pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|value| value.to_le_bytes()).collect()
}

#[inline]
pub fn decode_vector(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(anyhow!(
            "Corrupted vector blob: {} bytes is not a multiple of 4",
            bytes.len()
        ));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}
