use super::*;
use crate::database::sqlite::{Database, EmbeddingOrigin, NewEmbedding};
use anyhow::Result;
use chrono::Duration;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

const DIM: usize = 3;

fn hit(source_id: &str, similarity: f32, timestamp: DateTime<Utc>) -> SearchHit {
    SearchHit {
        source_id: source_id.to_string(),
        source_category: SourceCategory::Defect,
        similarity,
        snippet: String::new(),
        timestamp,
    }
}

async fn create_test_engine() -> Result<(TempDir, EmbeddingStore)> {
    let temp_dir = TempDir::new()?;
    let database = Database::initialize_from_config_dir(temp_dir.path()).await?;
    Ok((temp_dir, EmbeddingStore::new(database, DIM)))
}

async fn insert(
    store: &EmbeddingStore,
    source_id: &str,
    category: SourceCategory,
    vector: [f32; DIM],
    reference_timestamp: DateTime<Utc>,
) -> Result<()> {
    store
        .upsert(&NewEmbedding {
            source_id: source_id.to_string(),
            source_category: category,
            vector: vector.to_vec(),
            snippet: format!("about {source_id}"),
            origin: EmbeddingOrigin::Provider,
            reference_timestamp,
        })
        .await?;
    Ok(())
}

/// Owner lookup backed by a fixed map; counts calls per category
#[derive(Default)]
struct FixedOwners {
    created: HashMap<(SourceCategory, String), DateTime<Utc>>,
    calls: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl OwnerTimestamps for FixedOwners {
    async fn created_at(
        &self,
        source_category: SourceCategory,
        source_ids: &[String],
    ) -> anyhow::Result<HashMap<String, DateTime<Utc>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(anyhow::anyhow!("owner table unavailable"));
        }

        Ok(source_ids
            .iter()
            .filter_map(|id| {
                self.created
                    .get(&(source_category, id.clone()))
                    .map(|timestamp| (id.clone(), *timestamp))
            })
            .collect())
    }
}

#[test]
fn cosine_of_vector_with_itself_is_one() {
    for vector in [
        vec![1.0_f32, 2.0, 3.0],
        vec![-0.3, 0.0, 7.5, 1e-3],
        vec![1e-20, 1e-20],
        vec![123_456.0, -654_321.0],
    ] {
        let similarity = cosine_similarity(&vector, &vector);
        assert!((similarity - 1.0).abs() < 1e-5, "{vector:?} -> {similarity}");
    }
}

#[test]
fn cosine_is_symmetric() {
    let pairs = [
        (vec![1.0_f32, 0.0, 2.0], vec![0.5, 0.5, -1.0]),
        (vec![0.1, 0.2, 0.3], vec![3.0, 2.0, 1.0]),
        (vec![-1.0, -1.0, 4.0], vec![2.0, 0.0, 0.25]),
    ];

    for (a, b) in pairs {
        assert_eq!(cosine_similarity(&a, &b), cosine_similarity(&b, &a));
    }
}

#[test]
fn cosine_with_zero_vector_is_zero() {
    let zero = vec![0.0_f32; 4];
    assert_eq!(cosine_similarity(&zero, &[1.0, 2.0, 3.0, 4.0]), 0.0);
    assert_eq!(cosine_similarity(&[1.0, 2.0, 3.0, 4.0], &zero), 0.0);
    assert_eq!(cosine_similarity(&zero, &zero), 0.0);
}

#[test]
fn cosine_of_degenerate_inputs_is_zero() {
    assert_eq!(cosine_similarity(&[], &[]), 0.0);
    assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
    assert_eq!(cosine_similarity(&[f32::INFINITY, 1.0], &[1.0, 1.0]), 0.0);
}

#[test]
fn cosine_orthogonal_and_opposite() {
    assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-7);
    assert!((cosine_similarity(&[1.0, 2.0], &[-1.0, -2.0]) + 1.0).abs() < 1e-6);
}

#[test]
fn threshold_is_inclusive_hard_cutoff() {
    let now = Utc::now();
    let candidates = vec![
        Candidate {
            source_id: "exact".to_string(),
            source_category: SourceCategory::Defect,
            vector: vec![1.0, 0.0],
            snippet: String::new(),
            timestamp: now,
        },
        Candidate {
            source_id: "orthogonal".to_string(),
            source_category: SourceCategory::Defect,
            vector: vec![0.0, 1.0],
            snippet: String::new(),
            timestamp: now,
        },
    ];

    let hits = score_candidates(&[1.0, 0.0], candidates.clone(), 1.0);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].source_id, "exact");

    let all = score_candidates(&[1.0, 0.0], candidates, 0.0);
    assert_eq!(all.len(), 2);
}

#[test]
fn ranking_orders_by_similarity_then_recency() {
    let now = Utc::now();
    let mut hits = vec![
        hit("old-tie", 0.8, now - Duration::days(10)),
        hit("best", 0.95, now - Duration::days(100)),
        hit("new-tie", 0.8, now),
        hit("low", 0.75, now),
    ];

    rank_hits(&mut hits, 10);
    let order: Vec<&str> = hits.iter().map(|h| h.source_id.as_str()).collect();
    assert_eq!(order, vec!["best", "new-tie", "old-tie", "low"]);
}

#[test]
fn ranking_is_deterministic_for_full_ties() {
    let now = Utc::now();
    let mut first = vec![hit("b", 0.5, now), hit("a", 0.5, now), hit("c", 0.5, now)];
    let mut second = vec![hit("c", 0.5, now), hit("b", 0.5, now), hit("a", 0.5, now)];

    rank_hits(&mut first, 3);
    rank_hits(&mut second, 3);
    assert_eq!(first, second);
    assert_eq!(first[0].source_id, "a");
}

#[test]
fn ranking_truncates_to_limit() {
    let now = Utc::now();
    let mut hits: Vec<SearchHit> = (0..20)
        .map(|i| hit(&format!("h{i}"), 0.9, now - Duration::minutes(i)))
        .collect();

    rank_hits(&mut hits, 5);
    assert_eq!(hits.len(), 5);
    assert_eq!(hits[0].source_id, "h0");
}

#[tokio::test]
async fn category_filter_restricts_candidates() -> Result<()> {
    let (_temp_dir, store) = create_test_engine().await?;
    let now = Utc::now();
    insert(&store, "D-1", SourceCategory::Defect, [1.0, 0.0, 0.0], now).await?;
    insert(&store, "R-1", SourceCategory::Requirement, [1.0, 0.0, 0.0], now).await?;

    let engine = SearchEngine::new(store);
    let options = SearchOptions {
        categories: Some(vec![SourceCategory::Requirement]),
        min_similarity: 0.0,
        ..SearchOptions::default()
    };

    let hits = engine.search(&[1.0, 0.0, 0.0], &options).await?;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].source_id, "R-1");
    assert_eq!(hits[0].snippet, "about R-1");
    Ok(())
}

#[tokio::test]
async fn date_range_uses_reference_timestamps_without_owner_lookup() -> Result<()> {
    let (_temp_dir, store) = create_test_engine().await?;
    let now = Utc::now();
    insert(&store, "fresh", SourceCategory::Defect, [1.0, 0.0, 0.0], now - Duration::days(2)).await?;
    insert(&store, "stale", SourceCategory::Defect, [1.0, 0.0, 0.0], now - Duration::days(30)).await?;

    let engine = SearchEngine::new(store);
    let options = SearchOptions {
        min_similarity: 0.0,
        date_range: Some(crate::timeframe::Timeframe::LastWeek.resolve(now)),
        ..SearchOptions::default()
    };

    let hits = engine.search(&[1.0, 0.0, 0.0], &options).await?;
    let ids: Vec<&str> = hits.iter().map(|h| h.source_id.as_str()).collect();
    assert_eq!(ids, vec!["fresh"]);
    Ok(())
}

#[tokio::test]
async fn owner_timestamps_override_reference_and_are_batched() -> Result<()> {
    let (_temp_dir, store) = create_test_engine().await?;
    let now = Utc::now();
    for id in ["D-1", "D-2", "D-3"] {
        insert(&store, id, SourceCategory::Defect, [1.0, 0.0, 0.0], now).await?;
    }
    insert(&store, "T-1", SourceCategory::TestCase, [1.0, 0.0, 0.0], now).await?;

    let mut created = HashMap::new();
    // Ingested today, but the owning defect was created a month ago
    created.insert(
        (SourceCategory::Defect, "D-2".to_string()),
        now - Duration::days(30),
    );
    let owners = Arc::new(FixedOwners {
        created,
        ..FixedOwners::default()
    });

    let engine = SearchEngine::new(store).with_owner_timestamps(owners.clone());
    let options = SearchOptions {
        min_similarity: 0.0,
        date_range: Some(DateRange::new(Some(now - Duration::days(7)), None)),
        ..SearchOptions::default()
    };

    let hits = engine.search(&[1.0, 0.0, 0.0], &options).await?;
    let mut ids: Vec<&str> = hits.iter().map(|h| h.source_id.as_str()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec!["D-1", "D-3", "T-1"]);
    // One lookup per category, not per record
    assert_eq!(owners.calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn owner_timestamps_break_ties_without_date_filter() -> Result<()> {
    let (_temp_dir, store) = create_test_engine().await?;
    let now = Utc::now();
    insert(&store, "A", SourceCategory::Defect, [1.0, 0.0, 0.0], now).await?;
    insert(&store, "B", SourceCategory::Defect, [1.0, 0.0, 0.0], now).await?;

    let mut created = HashMap::new();
    created.insert((SourceCategory::Defect, "A".to_string()), now - Duration::days(9));
    created.insert((SourceCategory::Defect, "B".to_string()), now - Duration::days(1));
    let owners = Arc::new(FixedOwners {
        created,
        ..FixedOwners::default()
    });

    let engine = SearchEngine::new(store).with_owner_timestamps(owners);
    let options = SearchOptions {
        min_similarity: 0.0,
        ..SearchOptions::default()
    };

    let hits = engine.search(&[1.0, 0.0, 0.0], &options).await?;
    assert_eq!(hits[0].source_id, "B");
    assert_eq!(hits[1].source_id, "A");
    assert_eq!(hits[1].timestamp, now - Duration::days(9));
    Ok(())
}

#[tokio::test]
async fn failed_owner_lookup_fails_the_search() -> Result<()> {
    let (_temp_dir, store) = create_test_engine().await?;
    insert(&store, "A", SourceCategory::Defect, [1.0, 0.0, 0.0], Utc::now()).await?;

    let owners = Arc::new(FixedOwners {
        fail: true,
        ..FixedOwners::default()
    });
    let engine = SearchEngine::new(store).with_owner_timestamps(owners);
    let options = SearchOptions {
        min_similarity: 0.0,
        date_range: Some(DateRange::new(Some(Utc::now() - Duration::days(1)), None)),
        ..SearchOptions::default()
    };

    let result = engine.search(&[1.0, 0.0, 0.0], &options).await;
    assert!(matches!(result, Err(RecallError::Database(_))));
    Ok(())
}

#[tokio::test]
async fn emptiness_check() -> Result<()> {
    let (_temp_dir, store) = create_test_engine().await?;
    let engine = SearchEngine::new(store.clone());
    assert!(engine.is_empty().await?);

    insert(&store, "A", SourceCategory::Document, [0.0, 1.0, 0.0], Utc::now()).await?;
    assert!(!engine.is_empty().await?);
    Ok(())
}
