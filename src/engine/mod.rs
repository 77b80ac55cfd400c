//! Entry point for collaborators: ingest text, search it, report on the store.

pub mod request;


use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{Config, SearchConfig};
use crate::database::sqlite::{Database, EmbeddingOrigin, NewEmbedding, SourceCategory};
use crate::embeddings::{Embedder, EmbeddingProvider};
use crate::search::{OwnerTimestamps, SearchEngine, SearchHit, SearchOptions};
use crate::stats::Stats;
use crate::store::EmbeddingStore;
use crate::timeframe::Timeframe;
use crate::{RecallError, Result};

pub use request::{IngestItem, IngestOutcome, MAX_LIMIT, SearchRequest};

#[derive(Debug, Clone)]
pub struct RecallEngine {
    store: EmbeddingStore,
    embedder: Embedder,
    search: SearchEngine,
    defaults: SearchConfig,
}

impl RecallEngine {
    /// Wire an engine from parts; the embedder and store must agree on dimension
    #[inline]
    pub fn new(store: EmbeddingStore, embedder: Embedder, defaults: SearchConfig) -> Result<Self> {
        if embedder.dimension() != store.dimension() {
            return Err(RecallError::DimensionMismatch {
                expected: store.dimension(),
                actual: embedder.dimension(),
            });
        }

        Ok(Self {
            search: SearchEngine::new(store.clone()),
            store,
            embedder,
            defaults,
        })
    }

    /// Open the store under the configured base directory
    #[inline]
    pub async fn open(config: &Config, provider: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        config
            .validate()
            .map_err(|e| RecallError::Config(e.to_string()))?;

        let database = Database::initialize_from_config_dir(config.get_base_dir())
            .await
            .map_err(|e| RecallError::Database(format!("{:#}", e)))?;

        let dimension = config.embedding_dimension();
        info!(
            "Opened recall store in {} (dimension {}, provider {})",
            config.get_base_dir().display(),
            dimension,
            provider.name()
        );

        Self::new(
            EmbeddingStore::new(database, dimension),
            Embedder::new(provider, dimension),
            config.search.clone(),
        )
    }

    /// Resolve owner creation times through a collaborator instead of stored timestamps
    #[inline]
    pub fn with_owner_timestamps(mut self, owners: Arc<dyn OwnerTimestamps>) -> Self {
        self.search = self.search.with_owner_timestamps(owners);
        self
    }

    #[inline]
    pub fn store(&self) -> &EmbeddingStore {
        &self.store
    }

    #[inline]
    pub fn embedder(&self) -> &Embedder {
        &self.embedder
    }

    /// Embed and store `content`, stamped with the current time
    #[inline]
    pub async fn ingest(
        &self,
        content: &str,
        source_id: &str,
        source_category: SourceCategory,
    ) -> Result<EmbeddingOrigin> {
        self.ingest_with_timestamp(content, source_id, source_category, Utc::now())
            .await
    }

    /// Embed and store `content` under its key, replacing any previous vector.
    ///
    /// `reference_timestamp` should be the owning entity's creation time; it is
    /// what date filters fall back to when no owner lookup is configured.
    #[inline]
    pub async fn ingest_with_timestamp(
        &self,
        content: &str,
        source_id: &str,
        source_category: SourceCategory,
        reference_timestamp: DateTime<Utc>,
    ) -> Result<EmbeddingOrigin> {
        if source_id.trim().is_empty() {
            return Err(RecallError::InvalidRecord(
                "source id must not be empty".to_string(),
            ));
        }
        if content.trim().is_empty() {
            return Err(RecallError::InvalidRecord(format!(
                "content for {}/{} is empty",
                source_category, source_id
            )));
        }

        let embedding = self.embedder.embed(content).await?;
        self.store
            .upsert(&NewEmbedding {
                source_id: source_id.to_string(),
                source_category,
                vector: embedding.vector,
                snippet: make_snippet(content, self.defaults.snippet_length),
                origin: embedding.origin,
                reference_timestamp,
            })
            .await?;

        debug!(
            "Ingested {}/{} ({})",
            source_category, source_id, embedding.origin
        );
        Ok(embedding.origin)
    }

    /// Ingest many records with bounded concurrency.
    ///
    /// Outcomes come back in input order and one failure never stops the rest.
    #[inline]
    pub async fn ingest_batch(&self, items: Vec<IngestItem>) -> Vec<IngestOutcome> {
        let concurrency = self.defaults.ingest_concurrency.max(1);
        let total = items.len();

        let outcomes: Vec<IngestOutcome> = stream::iter(items)
            .map(|item| self.ingest_item(item))
            .buffered(concurrency)
            .collect()
            .await;

        let failed = outcomes.iter().filter(|outcome| !outcome.is_ok()).count();
        if failed > 0 {
            warn!("Batch ingestion: {} of {} records failed", failed, total);
        } else {
            info!("Batch ingestion: {} records stored", total);
        }

        outcomes
    }

    async fn ingest_item(&self, item: IngestItem) -> IngestOutcome {
        let reference_timestamp = item.reference_timestamp.unwrap_or_else(Utc::now);
        let result = self
            .ingest_with_timestamp(
                &item.content,
                &item.source_id,
                item.source_category,
                reference_timestamp,
            )
            .await;

        IngestOutcome {
            source_id: item.source_id,
            source_category: item.source_category,
            result,
        }
    }

    #[inline]
    pub async fn delete(&self, source_id: &str, source_category: SourceCategory) -> Result<bool> {
        let removed = self.store.delete(source_id, source_category).await?;
        debug!(
            "Delete {}/{}: {}",
            source_category,
            source_id,
            if removed { "removed" } else { "not found" }
        );
        Ok(removed)
    }

    #[inline]
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>> {
        let options = self.resolve_options(request, Utc::now())?;

        if self.search.is_empty().await? {
            debug!("Store is empty; skipping query embedding");
            return Ok(Vec::new());
        }

        let embedding = self.embedder.embed(&request.query).await?;
        if embedding.is_degraded() {
            debug!("Query embedded with fallback vector");
        }

        self.search.search(&embedding.vector, &options).await
    }

    #[inline]
    pub async fn search_by_timeframe(
        &self,
        query: &str,
        timeframe: Timeframe,
        categories: Option<Vec<SourceCategory>>,
        limit: Option<usize>,
        min_similarity: Option<f32>,
    ) -> Result<Vec<SearchHit>> {
        let request = SearchRequest {
            query: query.to_string(),
            categories,
            limit,
            min_similarity,
            date_filter: None,
        }
        .with_timeframe(timeframe);

        self.search(&request).await
    }

    #[inline]
    pub async fn stats(&self) -> Result<Stats> {
        Stats::gather(&self.store).await
    }

    /// Whether the embedding provider answers; diagnostics only
    #[inline]
    pub async fn health_probe(&self) -> bool {
        let available = self.embedder.is_available().await;
        if !available {
            warn!(
                "Embedding provider {} is unavailable",
                self.embedder.provider_name()
            );
        }
        available
    }

    fn resolve_options(&self, request: &SearchRequest, now: DateTime<Utc>) -> Result<SearchOptions> {
        request.validate()?;

        let limit = request.limit.unwrap_or(self.defaults.default_limit);
        let min_similarity = request
            .min_similarity
            .unwrap_or(self.defaults.default_min_similarity);
        request::validate_limit(limit)?;
        request::validate_min_similarity(min_similarity)?;

        let date_range = match &request.date_filter {
            Some(filter) => filter.resolve(now)?,
            None => None,
        };

        Ok(SearchOptions {
            categories: request.categories.clone(),
            limit,
            min_similarity,
            date_range,
        })
    }
}

/// First `max_chars` characters of `content` with whitespace runs collapsed
#[inline]
pub fn make_snippet(content: &str, max_chars: usize) -> String {
    content
        .split_whitespace()
        .join(" ")
        .chars()
        .take(max_chars)
        .collect()
}
