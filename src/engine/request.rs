use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::database::sqlite::{EmbeddingOrigin, SourceCategory};
use crate::timeframe::{DateFilter, DateRange, Timeframe};
use crate::{RecallError, Result};

/// Largest result count a single search may ask for
pub const MAX_LIMIT: usize = 1000;

/// A search as callers phrase it; unset fields take the configured defaults
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: String,
    /// `None` searches every category; an empty list is rejected
    pub categories: Option<Vec<SourceCategory>>,
    pub limit: Option<usize>,
    pub min_similarity: Option<f32>,
    pub date_filter: Option<DateFilter>,
}

impl SearchRequest {
    #[inline]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            categories: None,
            limit: None,
            min_similarity: None,
            date_filter: None,
        }
    }

    #[inline]
    pub fn with_categories(mut self, categories: Vec<SourceCategory>) -> Self {
        self.categories = Some(categories);
        self
    }

    #[inline]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[inline]
    pub fn with_min_similarity(mut self, min_similarity: f32) -> Self {
        self.min_similarity = Some(min_similarity);
        self
    }

    #[inline]
    pub fn with_timeframe(mut self, timeframe: Timeframe) -> Self {
        self.date_filter = Some(DateFilter::Timeframe(timeframe));
        self
    }

    #[inline]
    pub fn with_range(mut self, range: DateRange) -> Self {
        self.date_filter = Some(DateFilter::Range(range));
        self
    }

    /// Reject malformed requests before anything is embedded
    #[inline]
    pub fn validate(&self) -> Result<()> {
        if self.query.trim().is_empty() {
            return Err(RecallError::InvalidQuery(
                "query must not be empty".to_string(),
            ));
        }

        if self
            .categories
            .as_ref()
            .is_some_and(|categories| categories.is_empty())
        {
            return Err(RecallError::InvalidQuery(
                "category filter must name at least one category".to_string(),
            ));
        }

        if let Some(limit) = self.limit {
            validate_limit(limit)?;
        }
        if let Some(min_similarity) = self.min_similarity {
            validate_min_similarity(min_similarity)?;
        }
        if let Some(DateFilter::Range(range)) = &self.date_filter {
            range.validate()?;
        }

        Ok(())
    }
}

#[inline]
pub fn validate_limit(limit: usize) -> Result<()> {
    if limit == 0 || limit > MAX_LIMIT {
        return Err(RecallError::InvalidQuery(format!(
            "limit must be between 1 and {MAX_LIMIT}, got {limit}"
        )));
    }
    Ok(())
}

#[inline]
pub fn validate_min_similarity(min_similarity: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&min_similarity) {
        return Err(RecallError::InvalidQuery(format!(
            "minimum similarity must be between 0 and 1, got {min_similarity}"
        )));
    }
    Ok(())
}

/// One line of a batch ingestion file
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestItem {
    pub source_id: String,
    pub source_category: SourceCategory,
    pub content: String,
    /// Owner creation time; ingestion time when absent
    #[serde(default)]
    pub reference_timestamp: Option<DateTime<Utc>>,
}

impl IngestItem {
    #[inline]
    pub fn new(
        source_id: impl Into<String>,
        source_category: SourceCategory,
        content: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            source_category,
            content: content.into(),
            reference_timestamp: None,
        }
    }
}

/// Result of ingesting one batch item
#[derive(Debug)]
pub struct IngestOutcome {
    pub source_id: String,
    pub source_category: SourceCategory,
    pub result: Result<EmbeddingOrigin>,
}

impl IngestOutcome {
    #[inline]
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}
