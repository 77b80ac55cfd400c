//! Similarity search over stored embeddings.
//!
//! Every search is a full scan of the (filtered) candidate set. Category and date
//! filters run before any vector is scored, and date filtering loads only the
//! keys first so out-of-range vectors are never read. This holds up to the low
//! thousands of records per category; past that a proper vector index is needed.

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::database::sqlite::{CandidateKey, SourceCategory, StoredEmbedding};
use crate::store::EmbeddingStore;
use crate::timeframe::DateRange;
use crate::{RecallError, Result};

pub const DEFAULT_LIMIT: usize = 10;
pub const DEFAULT_MIN_SIMILARITY: f32 = 0.7;

/// Creation timestamps of the collaborator-owned entities behind embeddings.
///
/// Implementations answer for a whole category at once. Ids missing from the
/// returned map fall back to the timestamp stored alongside the embedding.
#[async_trait]
pub trait OwnerTimestamps: Send + Sync {
    async fn created_at(
        &self,
        source_category: SourceCategory,
        source_ids: &[String],
    ) -> anyhow::Result<HashMap<String, DateTime<Utc>>>;
}

/// Cosine of the angle between two vectors.
///
/// Zero-magnitude, empty, or mismatched-length inputs score 0.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
    if similarity.is_finite() {
        similarity.clamp(-1.0, 1.0) as f32
    } else {
        0.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    /// `None` searches every category
    pub categories: Option<Vec<SourceCategory>>,
    pub limit: usize,
    pub min_similarity: f32,
    pub date_range: Option<DateRange>,
}

impl Default for SearchOptions {
    #[inline]
    fn default() -> Self {
        Self {
            categories: None,
            limit: DEFAULT_LIMIT,
            min_similarity: DEFAULT_MIN_SIMILARITY,
            date_range: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub source_id: String,
    pub source_category: SourceCategory,
    pub similarity: f32,
    pub snippet: String,
    /// Owner creation time, or the stored reference time when unknown
    pub timestamp: DateTime<Utc>,
}

/// A vector eligible for scoring
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub source_id: String,
    pub source_category: SourceCategory,
    pub vector: Vec<f32>,
    pub snippet: String,
    pub timestamp: DateTime<Utc>,
}

impl From<StoredEmbedding> for Candidate {
    #[inline]
    fn from(embedding: StoredEmbedding) -> Self {
        Self {
            source_id: embedding.source_id,
            source_category: embedding.source_category,
            vector: embedding.vector,
            snippet: embedding.snippet,
            timestamp: embedding.reference_timestamp,
        }
    }
}

/// Score candidates and drop those strictly below `min_similarity`
#[inline]
pub fn score_candidates<I>(query: &[f32], candidates: I, min_similarity: f32) -> Vec<SearchHit>
where
    I: IntoIterator<Item = Candidate>,
{
    candidates
        .into_iter()
        .filter_map(|candidate| {
            let similarity = cosine_similarity(query, &candidate.vector);
            (similarity >= min_similarity).then(|| SearchHit {
                source_id: candidate.source_id,
                source_category: candidate.source_category,
                similarity,
                snippet: candidate.snippet,
                timestamp: candidate.timestamp,
            })
        })
        .collect()
}

/// Order by similarity, then newer owner first, then id; keep the top `limit`
#[inline]
pub fn rank_hits(hits: &mut Vec<SearchHit>, limit: usize) {
    hits.sort_by(|a, b| {
        b.similarity
            .total_cmp(&a.similarity)
            .then_with(|| b.timestamp.cmp(&a.timestamp))
            .then_with(|| a.source_id.cmp(&b.source_id))
            .then_with(|| a.source_category.cmp(&b.source_category))
    });
    hits.truncate(limit);
}

#[derive(Clone)]
pub struct SearchEngine {
    store: EmbeddingStore,
    owners: Option<Arc<dyn OwnerTimestamps>>,
}

impl fmt::Debug for SearchEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchEngine")
            .field("store", &self.store)
            .field("owner_lookup", &self.owners.is_some())
            .finish()
    }
}

impl SearchEngine {
    #[inline]
    pub fn new(store: EmbeddingStore) -> Self {
        Self {
            store,
            owners: None,
        }
    }

    #[inline]
    pub fn with_owner_timestamps(mut self, owners: Arc<dyn OwnerTimestamps>) -> Self {
        self.owners = Some(owners);
        self
    }

    /// True when nothing is stored at all
    #[inline]
    pub async fn is_empty(&self) -> Result<bool> {
        let counts = self.store.counts_by_category().await?;
        Ok(counts.values().all(|&count| count == 0))
    }

    /// Score and rank stored vectors against `query`.
    ///
    /// `options` must already be validated; `RecallEngine::search` rejects a zero limit.
    #[inline]
    pub async fn search(&self, query: &[f32], options: &SearchOptions) -> Result<Vec<SearchHit>> {
        let categories = options.categories.as_deref();
        let mut hits = match options.date_range {
            Some(range) => {
                let candidates = self.candidates_in_range(categories, range).await?;
                score_candidates(query, candidates, options.min_similarity)
            }
            None => {
                let candidates = self.store.candidates(categories).await?;
                debug!("Scoring {} candidates", candidates.len());
                let mut hits = score_candidates(
                    query,
                    candidates.into_iter().map(Candidate::from),
                    options.min_similarity,
                );
                self.apply_owner_timestamps(&mut hits).await?;
                hits
            }
        };

        rank_hits(&mut hits, options.limit);
        debug!("Search returned {} hits", hits.len());
        Ok(hits)
    }

    /// Load only the vectors whose owner timestamp falls inside `range`
    async fn candidates_in_range(
        &self,
        categories: Option<&[SourceCategory]>,
        range: DateRange,
    ) -> Result<Vec<Candidate>> {
        let keys = self.store.candidate_keys(categories).await?;
        let total_keys = keys.len();

        let mut by_category: BTreeMap<SourceCategory, Vec<CandidateKey>> = BTreeMap::new();
        for key in keys {
            by_category.entry(key.source_category).or_default().push(key);
        }

        let mut candidates = Vec::new();
        for (category, keys) in by_category {
            let ids: Vec<String> = keys.iter().map(|key| key.source_id.clone()).collect();
            let owner_times = self.owner_timestamps(category, &ids).await?;

            let in_range: HashMap<String, DateTime<Utc>> = keys
                .into_iter()
                .filter_map(|key| {
                    let timestamp = owner_times
                        .get(&key.source_id)
                        .copied()
                        .unwrap_or(key.reference_timestamp);
                    range
                        .contains(timestamp)
                        .then_some((key.source_id, timestamp))
                })
                .collect();

            let surviving_ids: Vec<String> = in_range.keys().cloned().collect();
            for embedding in self.store.load(category, &surviving_ids).await? {
                let mut candidate = Candidate::from(embedding);
                if let Some(timestamp) = in_range.get(&candidate.source_id) {
                    candidate.timestamp = *timestamp;
                }
                candidates.push(candidate);
            }
        }

        debug!(
            "Date filter kept {} of {} candidates",
            candidates.len(),
            total_keys
        );
        Ok(candidates)
    }

    async fn apply_owner_timestamps(&self, hits: &mut [SearchHit]) -> Result<()> {
        if self.owners.is_none() || hits.is_empty() {
            return Ok(());
        }

        let mut ids_by_category: BTreeMap<SourceCategory, Vec<String>> = BTreeMap::new();
        for hit in hits.iter() {
            ids_by_category
                .entry(hit.source_category)
                .or_default()
                .push(hit.source_id.clone());
        }

        for (category, ids) in ids_by_category {
            let owner_times = self.owner_timestamps(category, &ids).await?;
            for hit in hits
                .iter_mut()
                .filter(|hit| hit.source_category == category)
            {
                if let Some(timestamp) = owner_times.get(&hit.source_id) {
                    hit.timestamp = *timestamp;
                }
            }
        }

        Ok(())
    }

    async fn owner_timestamps(
        &self,
        category: SourceCategory,
        ids: &[String],
    ) -> Result<HashMap<String, DateTime<Utc>>> {
        let Some(owners) = &self.owners else {
            return Ok(HashMap::new());
        };

        owners.created_at(category, ids).await.map_err(|e| {
            RecallError::Database(format!(
                "Owner timestamp lookup failed for {}: {:#}",
                category, e
            ))
        })
    }
}
