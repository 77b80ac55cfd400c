// Embeddings module
// Provider abstraction, the Ollama backend, and the deterministic fallback

pub mod fallback;
pub mod ollama;


use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::{RecallError, Result};

pub use crate::database::sqlite::models::EmbeddingOrigin;
pub use fallback::fallback_embedding;
pub use ollama::OllamaClient;

/// A backend that turns text into a vector
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;

    /// Cheap reachability probe for diagnostics
    async fn is_available(&self) -> bool;
}

/// Provider that is never reachable, so every embedding takes the fallback path
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineProvider;

#[async_trait]
impl EmbeddingProvider for OfflineProvider {
    fn name(&self) -> &str {
        "offline"
    }

    async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
        Err(anyhow::anyhow!("embedding provider is disabled"))
    }

    async fn is_available(&self) -> bool {
        false
    }
}

/// Vector plus where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub origin: EmbeddingOrigin,
}

impl Embedding {
    #[inline]
    pub fn is_degraded(&self) -> bool {
        self.origin == EmbeddingOrigin::Fallback
    }
}

/// Adapter over a provider that always yields a vector of the configured dimension
#[derive(Clone)]
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    dimension: usize,
}

impl fmt::Debug for Embedder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Embedder")
            .field("provider", &self.provider.name())
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl Embedder {
    #[inline]
    pub fn new(provider: Arc<dyn EmbeddingProvider>, dimension: usize) -> Self {
        Self {
            provider,
            dimension,
        }
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Embed `text`, substituting the fallback vector when the provider fails.
    ///
    /// Only blank input is an error; provider failures never reach the caller.
    #[inline]
    pub async fn embed(&self, text: &str) -> Result<Embedding> {
        if text.trim().is_empty() {
            return Err(RecallError::InvalidQuery(
                "text to embed must not be empty".to_string(),
            ));
        }

        match self.provider.embed(text).await {
            Ok(vector) if vector.len() == self.dimension => {
                debug!(
                    "Embedded {} chars via {}",
                    text.chars().count(),
                    self.provider.name()
                );
                Ok(Embedding {
                    vector,
                    origin: EmbeddingOrigin::Provider,
                })
            }
            Ok(vector) => {
                warn!(
                    "Provider {} returned {} dimensions, expected {}; using fallback embedding",
                    self.provider.name(),
                    vector.len(),
                    self.dimension
                );
                Ok(self.fallback(text))
            }
            Err(e) => {
                warn!(
                    "Provider {} failed ({:#}); using fallback embedding",
                    self.provider.name(),
                    e
                );
                Ok(self.fallback(text))
            }
        }
    }

    #[inline]
    pub async fn is_available(&self) -> bool {
        self.provider.is_available().await
    }

    fn fallback(&self, text: &str) -> Embedding {
        Embedding {
            vector: fallback_embedding(text, self.dimension),
            origin: EmbeddingOrigin::Fallback,
        }
    }
}
