use super::*;
use crate::database::sqlite::Database;
use chrono::Duration;
use tempfile::TempDir;

async fn create_test_pool() -> Result<(TempDir, Database)> {
    let temp_dir = TempDir::new()?;
    let database = Database::initialize_from_config_dir(temp_dir.path()).await?;
    Ok((temp_dir, database))
}

fn new_embedding(source_id: &str, category: SourceCategory, vector: Vec<f32>) -> NewEmbedding {
    NewEmbedding {
        source_id: source_id.to_string(),
        source_category: category,
        vector,
        snippet: format!("snippet for {}", source_id),
        origin: EmbeddingOrigin::Provider,
        reference_timestamp: Utc::now(),
    }
}

#[tokio::test]
async fn upsert_inserts_then_replaces() -> Result<()> {
    let (_temp_dir, database) = create_test_pool().await?;
    let pool = database.pool();

    let first = new_embedding("DEF-1", SourceCategory::Defect, vec![1.0, 0.0, 0.0]);
    EmbeddingQueries::upsert(pool, &first).await?;

    let stored = EmbeddingQueries::get(pool, "DEF-1", SourceCategory::Defect)
        .await?
        .expect("embedding should exist after upsert");
    assert_eq!(stored.vector, vec![1.0, 0.0, 0.0]);
    let created_at = stored.created_at;

    let second = NewEmbedding {
        vector: vec![0.0, 1.0, 0.0],
        snippet: "rewritten".to_string(),
        origin: EmbeddingOrigin::Fallback,
        ..first
    };
    EmbeddingQueries::upsert(pool, &second).await?;

    let replaced = EmbeddingQueries::get(pool, "DEF-1", SourceCategory::Defect)
        .await?
        .expect("embedding should still exist");
    assert_eq!(replaced.vector, vec![0.0, 1.0, 0.0]);
    assert_eq!(replaced.snippet, "rewritten");
    assert_eq!(replaced.origin, EmbeddingOrigin::Fallback);
    assert_eq!(replaced.created_at, created_at);

    let counts = EmbeddingQueries::counts_by_category(pool).await?;
    assert_eq!(
        counts,
        vec![CategoryCount {
            source_category: SourceCategory::Defect,
            count: 1
        }]
    );

    Ok(())
}

#[tokio::test]
async fn same_id_in_two_categories_is_two_rows() -> Result<()> {
    let (_temp_dir, database) = create_test_pool().await?;
    let pool = database.pool();

    EmbeddingQueries::upsert(pool, &new_embedding("42", SourceCategory::Defect, vec![1.0])).await?;
    EmbeddingQueries::upsert(
        pool,
        &new_embedding("42", SourceCategory::Requirement, vec![2.0]),
    )
    .await?;

    let keys = EmbeddingQueries::list_keys(pool, None).await?;
    assert_eq!(keys.len(), 2);

    let only_defects =
        EmbeddingQueries::list_embeddings(pool, Some(&[SourceCategory::Defect])).await?;
    assert_eq!(only_defects.len(), 1);
    assert_eq!(only_defects[0].vector, vec![1.0]);

    Ok(())
}

#[tokio::test]
async fn delete_reports_whether_row_existed() -> Result<()> {
    let (_temp_dir, database) = create_test_pool().await?;
    let pool = database.pool();

    EmbeddingQueries::upsert(pool, &new_embedding("TC-9", SourceCategory::TestCase, vec![1.0]))
        .await?;

    assert!(EmbeddingQueries::delete(pool, "TC-9", SourceCategory::TestCase).await?);
    assert!(!EmbeddingQueries::delete(pool, "TC-9", SourceCategory::TestCase).await?);
    assert!(
        EmbeddingQueries::get(pool, "TC-9", SourceCategory::TestCase)
            .await?
            .is_none()
    );

    Ok(())
}

#[tokio::test]
async fn batched_lookups_cover_large_id_lists() -> Result<()> {
    let (_temp_dir, database) = create_test_pool().await?;
    let pool = database.pool();
    let base = Utc::now();

    let mut ids = Vec::new();
    for index in 0..(MAX_IN_LIST + 20) {
        let source_id = format!("DOC-{index}");
        let embedding = NewEmbedding {
            reference_timestamp: base - Duration::days(index as i64),
            ..new_embedding(&source_id, SourceCategory::Document, vec![index as f32])
        };
        EmbeddingQueries::upsert(pool, &embedding).await?;
        ids.push(source_id);
    }
    ids.push("DOC-missing".to_string());

    let loaded = EmbeddingQueries::get_many(pool, SourceCategory::Document, &ids).await?;
    assert_eq!(loaded.len(), MAX_IN_LIST + 20);

    let wrong_category =
        EmbeddingQueries::get_many(pool, SourceCategory::Defect, &ids).await?;
    assert!(wrong_category.is_empty());

    Ok(())
}

#[tokio::test]
async fn origin_counts() -> Result<()> {
    let (_temp_dir, database) = create_test_pool().await?;
    let pool = database.pool();

    EmbeddingQueries::upsert(pool, &new_embedding("a", SourceCategory::Document, vec![1.0]))
        .await?;
    let fallback = NewEmbedding {
        origin: EmbeddingOrigin::Fallback,
        ..new_embedding("b", SourceCategory::Document, vec![1.0])
    };
    EmbeddingQueries::upsert(pool, &fallback).await?;

    assert_eq!(
        EmbeddingQueries::count_by_origin(pool, EmbeddingOrigin::Fallback).await?,
        1
    );
    assert_eq!(
        EmbeddingQueries::count_by_origin(pool, EmbeddingOrigin::Provider).await?,
        1
    );

    Ok(())
}
