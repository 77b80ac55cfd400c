
use serde::Serialize;
use std::collections::BTreeMap;

use crate::Result;
use crate::database::sqlite::SourceCategory;
use crate::store::EmbeddingStore;

/// Snapshot of what the store holds
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total: u64,
    /// Every category is listed, empty ones as 0
    pub by_category: BTreeMap<SourceCategory, u64>,
    /// Rows embedded with the local fallback instead of the provider
    pub fallback_vectors: u64,
    pub dimension: usize,
}

impl Stats {
    #[inline]
    pub fn from_counts(
        counts: BTreeMap<SourceCategory, u64>,
        fallback_vectors: u64,
        dimension: usize,
    ) -> Self {
        let mut by_category: BTreeMap<SourceCategory, u64> = SourceCategory::ALL
            .into_iter()
            .map(|category| (category, 0))
            .collect();
        by_category.extend(counts);

        Self {
            total: by_category.values().sum(),
            by_category,
            fallback_vectors,
            dimension,
        }
    }

    #[inline]
    pub async fn gather(store: &EmbeddingStore) -> Result<Self> {
        let counts = store.counts_by_category().await?;
        let fallback_vectors = store.count_fallback().await?;
        Ok(Self::from_counts(counts, fallback_vectors, store.dimension()))
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    #[inline]
    pub fn count(&self, category: SourceCategory) -> u64 {
        self.by_category.get(&category).copied().unwrap_or(0)
    }
}
