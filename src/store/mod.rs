//! Keyed embedding storage with a fixed dimensionality.


use std::collections::BTreeMap;
use tracing::debug;

use crate::database::sqlite::{
    CandidateKey, Database, EmbeddingOrigin, EmbeddingQueries, NewEmbedding, SourceCategory,
    StoredEmbedding,
};
use crate::{RecallError, Result};

fn database_error(error: anyhow::Error) -> RecallError {
    RecallError::Database(format!("{:#}", error))
}

#[derive(Debug, Clone)]
pub struct EmbeddingStore {
    database: Database,
    dimension: usize,
}

impl EmbeddingStore {
    #[inline]
    pub fn new(database: Database, dimension: usize) -> Self {
        Self {
            database,
            dimension,
        }
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Insert or replace the record for its `(source_id, source_category)` key
    #[inline]
    pub async fn upsert(&self, embedding: &NewEmbedding) -> Result<()> {
        if embedding.source_id.trim().is_empty() {
            return Err(RecallError::InvalidRecord(
                "source id must not be empty".to_string(),
            ));
        }

        if embedding.vector.len() != self.dimension {
            return Err(RecallError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.vector.len(),
            });
        }

        EmbeddingQueries::upsert(self.database.pool(), embedding)
            .await
            .map_err(database_error)?;

        debug!(
            "Upserted {} embedding {}",
            embedding.source_category, embedding.source_id
        );
        Ok(())
    }

    /// Remove the record if present; returns whether one was removed
    #[inline]
    pub async fn delete(&self, source_id: &str, source_category: SourceCategory) -> Result<bool> {
        EmbeddingQueries::delete(self.database.pool(), source_id, source_category)
            .await
            .map_err(database_error)
    }

    #[inline]
    pub async fn get(
        &self,
        source_id: &str,
        source_category: SourceCategory,
    ) -> Result<Option<StoredEmbedding>> {
        EmbeddingQueries::get(self.database.pool(), source_id, source_category)
            .await
            .map_err(database_error)
    }

    /// Row counts for every category, including empty ones
    #[inline]
    pub async fn counts_by_category(&self) -> Result<BTreeMap<SourceCategory, u64>> {
        let mut counts: BTreeMap<SourceCategory, u64> = SourceCategory::ALL
            .into_iter()
            .map(|category| (category, 0))
            .collect();

        let rows = EmbeddingQueries::counts_by_category(self.database.pool())
            .await
            .map_err(database_error)?;
        for row in rows {
            counts.insert(row.source_category, row.count.max(0) as u64);
        }

        Ok(counts)
    }

    #[inline]
    pub async fn count_fallback(&self) -> Result<u64> {
        EmbeddingQueries::count_by_origin(self.database.pool(), EmbeddingOrigin::Fallback)
            .await
            .map(|count| count.max(0) as u64)
            .map_err(database_error)
    }

    /// Keys without vectors, for cheap pre-filtering
    #[inline]
    pub async fn candidate_keys(
        &self,
        categories: Option<&[SourceCategory]>,
    ) -> Result<Vec<CandidateKey>> {
        EmbeddingQueries::list_keys(self.database.pool(), categories)
            .await
            .map_err(database_error)
    }

    /// Every stored record in the given categories
    #[inline]
    pub async fn candidates(
        &self,
        categories: Option<&[SourceCategory]>,
    ) -> Result<Vec<StoredEmbedding>> {
        EmbeddingQueries::list_embeddings(self.database.pool(), categories)
            .await
            .map_err(database_error)
    }

    /// Records for specific ids within one category
    #[inline]
    pub async fn load(
        &self,
        source_category: SourceCategory,
        source_ids: &[String],
    ) -> Result<Vec<StoredEmbedding>> {
        if source_ids.is_empty() {
            return Ok(Vec::new());
        }

        EmbeddingQueries::get_many(self.database.pool(), source_category, source_ids)
            .await
            .map_err(database_error)
    }
}
