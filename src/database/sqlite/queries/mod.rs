#[cfg(test)]
mod tests;

use super::models::*;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

/// Upper bound on bound parameters per `IN (...)` list
const MAX_IN_LIST: usize = 500;

const SELECT_EMBEDDING_COLUMNS: &str = "SELECT source_id,
       source_category,
       vector,
       dimension,
       snippet,
       embedding_origin,
       reference_timestamp,
       created_at,
       updated_at
FROM embeddings";

pub struct EmbeddingQueries;

impl EmbeddingQueries {
    /// Insert or replace the embedding for `(source_id, source_category)` in one statement
    #[inline]
    pub async fn upsert(pool: &SqlitePool, embedding: &NewEmbedding) -> Result<()> {
        let now = Utc::now();
        let dimension = embedding.vector.len() as i64;

        sqlx::query(
            r#"
            INSERT INTO embeddings (
                source_id, source_category, vector, dimension, snippet,
                embedding_origin, reference_timestamp, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (source_id, source_category) DO UPDATE SET
                vector = excluded.vector,
                dimension = excluded.dimension,
                snippet = excluded.snippet,
                embedding_origin = excluded.embedding_origin,
                reference_timestamp = excluded.reference_timestamp,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&embedding.source_id)
        .bind(embedding.source_category)
        .bind(encode_vector(&embedding.vector))
        .bind(dimension)
        .bind(&embedding.snippet)
        .bind(embedding.origin)
        .bind(embedding.reference_timestamp)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .with_context(|| {
            format!(
                "Failed to upsert embedding {}/{}",
                embedding.source_category, embedding.source_id
            )
        })?;

        Ok(())
    }

    /// Returns whether a row was removed
    #[inline]
    pub async fn delete(
        pool: &SqlitePool,
        source_id: &str,
        source_category: SourceCategory,
    ) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM embeddings WHERE source_id = ? AND source_category = ?")
                .bind(source_id)
                .bind(source_category)
                .execute(pool)
                .await
                .with_context(|| {
                    format!("Failed to delete embedding {}/{}", source_category, source_id)
                })?;

        Ok(result.rows_affected() > 0)
    }

    #[inline]
    pub async fn get(
        pool: &SqlitePool,
        source_id: &str,
        source_category: SourceCategory,
    ) -> Result<Option<StoredEmbedding>> {
        let sql = format!("{SELECT_EMBEDDING_COLUMNS} WHERE source_id = ? AND source_category = ?");
        let row = sqlx::query_as::<_, EmbeddingRow>(&sql)
            .bind(source_id)
            .bind(source_category)
            .fetch_optional(pool)
            .await
            .context("Failed to get embedding")?;

        row.map(StoredEmbedding::try_from).transpose()
    }

    #[inline]
    pub async fn counts_by_category(pool: &SqlitePool) -> Result<Vec<CategoryCount>> {
        let counts = sqlx::query_as::<_, CategoryCount>(
            "SELECT source_category, COUNT(*) AS count FROM embeddings GROUP BY source_category",
        )
        .fetch_all(pool)
        .await
        .context("Failed to count embeddings by category")?;

        Ok(counts)
    }

    #[inline]
    pub async fn count_by_origin(pool: &SqlitePool, origin: EmbeddingOrigin) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM embeddings WHERE embedding_origin = ?")
                .bind(origin)
                .fetch_one(pool)
                .await
                .context("Failed to count embeddings by origin")?;

        Ok(count)
    }

    /// Keys and reference timestamps, optionally limited to some categories
    #[inline]
    pub async fn list_keys(
        pool: &SqlitePool,
        categories: Option<&[SourceCategory]>,
    ) -> Result<Vec<CandidateKey>> {
        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT source_id, source_category, reference_timestamp FROM embeddings",
        );
        push_category_filter(&mut builder, categories);

        let keys = builder
            .build_query_as::<CandidateKey>()
            .fetch_all(pool)
            .await
            .context("Failed to list embedding keys")?;

        debug!("Listed {} embedding keys", keys.len());
        Ok(keys)
    }

    /// Full rows, optionally limited to some categories
    #[inline]
    pub async fn list_embeddings(
        pool: &SqlitePool,
        categories: Option<&[SourceCategory]>,
    ) -> Result<Vec<StoredEmbedding>> {
        let mut builder = QueryBuilder::<Sqlite>::new(SELECT_EMBEDDING_COLUMNS);
        push_category_filter(&mut builder, categories);

        let rows = builder
            .build_query_as::<EmbeddingRow>()
            .fetch_all(pool)
            .await
            .context("Failed to list embeddings")?;

        rows.into_iter().map(StoredEmbedding::try_from).collect()
    }

    /// Full rows for the given ids within one category
    #[inline]
    pub async fn get_many(
        pool: &SqlitePool,
        source_category: SourceCategory,
        source_ids: &[String],
    ) -> Result<Vec<StoredEmbedding>> {
        let mut embeddings = Vec::with_capacity(source_ids.len());

        for chunk in source_ids.chunks(MAX_IN_LIST) {
            let mut builder = QueryBuilder::<Sqlite>::new(SELECT_EMBEDDING_COLUMNS);
            builder.push(" WHERE source_category = ");
            builder.push_bind(source_category);
            push_id_filter(&mut builder, chunk);

            let rows = builder
                .build_query_as::<EmbeddingRow>()
                .fetch_all(pool)
                .await
                .with_context(|| format!("Failed to load {} embeddings", source_category))?;

            for row in rows {
                embeddings.push(StoredEmbedding::try_from(row)?);
            }
        }

        Ok(embeddings)
    }
}

fn push_category_filter(
    builder: &mut QueryBuilder<'_, Sqlite>,
    categories: Option<&[SourceCategory]>,
) {
    let Some(categories) = categories else {
        return;
    };

    builder.push(" WHERE source_category IN (");
    let mut separated = builder.separated(", ");
    for category in categories {
        separated.push_bind(*category);
    }
    separated.push_unseparated(")");
}

fn push_id_filter(builder: &mut QueryBuilder<'_, Sqlite>, source_ids: &[String]) {
    builder.push(" AND source_id IN (");
    let mut separated = builder.separated(", ");
    for source_id in source_ids {
        separated.push_bind(source_id.clone());
    }
    separated.push_unseparated(")");
}
