use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::database::sqlite::{EmbeddingOrigin, SourceCategory};
use crate::embeddings::{EmbeddingProvider, OfflineProvider, OllamaClient};
use crate::engine::{IngestItem, IngestOutcome, RecallEngine, SearchRequest};
use crate::search::SearchHit;

/// Records handed to the engine per progress-bar step
const BATCH_CHUNK_SIZE: usize = 64;

/// Optional overrides applied by `config`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigUpdate {
    pub protocol: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub model: Option<String>,
    pub embedding_dimension: Option<u32>,
}

impl ConfigUpdate {
    #[inline]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    #[inline]
    pub fn apply(self, config: &mut Config) -> Result<()> {
        if let Some(protocol) = self.protocol {
            config.ollama.set_protocol(protocol)?;
        }
        if let Some(host) = self.host {
            config.ollama.set_host(host)?;
        }
        if let Some(port) = self.port {
            config.ollama.set_port(port)?;
        }
        if let Some(model) = self.model {
            config.ollama.set_model(model)?;
        }
        if let Some(dimension) = self.embedding_dimension {
            config.ollama.set_embedding_dimension(dimension)?;
        }
        Ok(())
    }
}

/// Build the provider for this run; `offline` skips Ollama entirely
#[inline]
pub fn build_provider(config: &Config, offline: bool) -> Result<Arc<dyn EmbeddingProvider>> {
    if offline {
        info!("Running offline; all embeddings use the local fallback");
        return Ok(Arc::new(OfflineProvider));
    }

    let client =
        OllamaClient::new(&config.ollama).context("Failed to initialize Ollama client")?;
    Ok(Arc::new(client))
}

#[inline]
pub async fn open_engine(config: &Config, offline: bool) -> Result<RecallEngine> {
    let provider = build_provider(config, offline)?;
    let engine = RecallEngine::open(config, provider)
        .await
        .context("Failed to open recall store")?;
    Ok(engine)
}

/// Apply overrides, save, and check that Ollama answers with the model
#[inline]
pub async fn configure(mut config: Config, update: ConfigUpdate) -> Result<()> {
    let changed = !update.is_empty();
    update.apply(&mut config)?;
    config.save().context("Failed to save configuration")?;

    if changed {
        eprintln!("{}", style("✓ Configuration saved").green());
    } else {
        eprintln!("{}", style("✓ Configuration written with current values").green());
    }
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).cyan()
    );

    eprintln!("{}", style("Testing Ollama connection...").yellow());
    let client = OllamaClient::new(&config.ollama)?.with_retry_attempts(1);
    let check = tokio::task::spawn_blocking(move || client.health_check())
        .await
        .context("Health check task panicked")?;

    match check {
        Ok(()) => eprintln!("{}", style("✓ Ollama connection successful").green()),
        Err(e) => {
            eprintln!(
                "{}",
                style("⚠ Could not reach Ollama; embeddings will use the local fallback").yellow()
            );
            eprintln!("  {:#}", e);
        }
    }

    Ok(())
}

#[inline]
pub fn show_config(config: &Config) {
    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Ollama Settings:").bold().yellow());
    match config.ollama_url() {
        Ok(url) => eprintln!("  URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  URL: {} ({})", style("Invalid").red(), e),
    }
    eprintln!("  Model: {}", style(&config.ollama.model).cyan());
    eprintln!(
        "  Embedding Dimension: {}",
        style(config.ollama.embedding_dimension).cyan()
    );
    eprintln!("  Timeout: {}s", style(config.ollama.timeout_seconds).cyan());
    eprintln!("  Retry Attempts: {}", style(config.ollama.retry_attempts).cyan());

    eprintln!();
    eprintln!("{}", style("Search Settings:").bold().yellow());
    eprintln!("  Default Limit: {}", style(config.search.default_limit).cyan());
    eprintln!(
        "  Default Min Similarity: {}",
        style(config.search.default_min_similarity).cyan()
    );
    eprintln!(
        "  Ingest Concurrency: {}",
        style(config.search.ingest_concurrency).cyan()
    );
    eprintln!("  Snippet Length: {}", style(config.search.snippet_length).cyan());

    eprintln!();
    eprintln!("Config file: {}", style(config.config_file_path().display()).dim());
}

#[inline]
pub async fn ingest(
    engine: &RecallEngine,
    content: &str,
    source_id: &str,
    source_category: SourceCategory,
) -> Result<()> {
    let origin = engine.ingest(content, source_id, source_category).await?;
    println!("Stored {}/{}", source_category, source_id);
    if origin == EmbeddingOrigin::Fallback {
        println!(
            "{}",
            style("  (embedded with the local fallback; provider unavailable)").yellow()
        );
    }
    Ok(())
}

/// A JSONL line that could not be turned into an `IngestItem`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedLine {
    /// 1-based line number in the input file
    pub line: usize,
    pub error: String,
}

/// Parsed JSONL input: the usable records plus every line that was rejected
#[derive(Debug, Default)]
pub struct ParsedBatch {
    pub items: Vec<IngestItem>,
    pub rejected: Vec<RejectedLine>,
}

/// Result of `ingest-batch`: engine outcomes in file order, plus unparseable lines
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<IngestOutcome>,
    pub rejected: Vec<RejectedLine>,
}

impl BatchReport {
    #[inline]
    pub fn stored(&self) -> usize {
        self.outcomes.iter().filter(|outcome| outcome.is_ok()).count()
    }

    #[inline]
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.stored() + self.rejected.len()
    }
}

/// Parse one `IngestItem` per non-blank line; bad lines are collected, not fatal
#[inline]
pub fn parse_jsonl(contents: &str) -> ParsedBatch {
    let mut batch = ParsedBatch::default();

    for (index, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<IngestItem>(line) {
            Ok(item) => batch.items.push(item),
            Err(e) => {
                warn!("Skipping invalid record on line {}: {}", index + 1, e);
                batch.rejected.push(RejectedLine {
                    line: index + 1,
                    error: e.to_string(),
                });
            }
        }
    }

    batch
}

/// Ingest a JSONL file; valid lines are stored even when others are rejected
#[inline]
pub async fn ingest_batch_file(engine: &RecallEngine, path: &Path) -> Result<BatchReport> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let ParsedBatch { items, rejected } = parse_jsonl(&contents);
    info!(
        "Ingesting {} records from {} ({} lines rejected)",
        items.len(),
        path.display(),
        rejected.len()
    );

    let bar = progress_bar(items.len() as u64);
    let mut outcomes = Vec::with_capacity(items.len());
    for chunk in items.chunks(BATCH_CHUNK_SIZE) {
        let chunk_outcomes = engine.ingest_batch(chunk.to_vec()).await;
        bar.inc(chunk_outcomes.len() as u64);
        outcomes.extend(chunk_outcomes);
    }
    bar.finish_and_clear();

    let report = BatchReport { outcomes, rejected };
    print_batch_summary(&report);
    Ok(report)
}

fn progress_bar(length: u64) -> ProgressBar {
    if !console::user_attended_stderr() {
        return ProgressBar::hidden();
    }

    let bar = ProgressBar::new(length);
    match ProgressStyle::with_template("{spinner} [{pos}/{len}] Ingesting {wide_bar}") {
        Ok(bar_style) => bar.with_style(bar_style),
        Err(e) => {
            warn!("Invalid progress template: {}", e);
            bar
        }
    }
}

fn print_batch_summary(report: &BatchReport) {
    let fallback = report
        .outcomes
        .iter()
        .filter(|outcome| matches!(outcome.result, Ok(EmbeddingOrigin::Fallback)))
        .count();

    println!(
        "Stored {} of {} records ({} via fallback)",
        style(report.stored()).green(),
        report.outcomes.len() + report.rejected.len(),
        fallback
    );

    for rejected in &report.rejected {
        println!(
            "  {} line {}: {}",
            style("✗").red(),
            rejected.line,
            rejected.error
        );
    }

    for outcome in &report.outcomes {
        if let Err(e) = &outcome.result {
            println!(
                "  {} {}/{}: {}",
                style("✗").red(),
                outcome.source_category,
                outcome.source_id,
                e
            );
        }
    }
}

#[inline]
pub async fn delete(
    engine: &RecallEngine,
    source_id: &str,
    source_category: SourceCategory,
) -> Result<()> {
    if engine.delete(source_id, source_category).await? {
        println!("Deleted {}/{}", source_category, source_id);
    } else {
        println!("No embedding stored for {}/{}", source_category, source_id);
    }
    Ok(())
}

#[inline]
pub async fn search(engine: &RecallEngine, request: &SearchRequest, json: bool) -> Result<()> {
    let hits = engine.search(request).await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&hits).context("Failed to serialize results")?
        );
        return Ok(());
    }

    if hits.is_empty() {
        println!("No matches for \"{}\"", request.query);
        return Ok(());
    }

    for (rank, hit) in hits.iter().enumerate() {
        println!("{}", format_hit(rank + 1, hit));
    }
    Ok(())
}

#[inline]
pub fn format_hit(rank: usize, hit: &SearchHit) -> String {
    let header = format!(
        "{:>2}. {:.3}  {}/{}  {}",
        rank,
        hit.similarity,
        hit.source_category,
        hit.source_id,
        hit.timestamp.format("%Y-%m-%d")
    );

    if hit.snippet.is_empty() {
        header
    } else {
        format!("{}\n    {}", header, hit.snippet)
    }
}

#[inline]
pub async fn show_stats(engine: &RecallEngine, json: bool) -> Result<()> {
    let stats = engine.stats().await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&stats).context("Failed to serialize stats")?
        );
        return Ok(());
    }

    println!("{}", style("Stored embeddings").bold().cyan());
    println!("  Total: {}", style(stats.total).bold());
    let per_category = stats
        .by_category
        .iter()
        .map(|(category, count)| format!("{}={}", category, count))
        .join(", ");
    println!("  By category: {}", per_category);
    println!("  Fallback vectors: {}", stats.fallback_vectors);
    println!("  Dimension: {}", stats.dimension);
    Ok(())
}

#[inline]
pub async fn health(engine: &RecallEngine) -> Result<bool> {
    let available = engine.health_probe().await;
    let provider = engine.embedder().provider_name().to_string();

    if available {
        println!("{} {} is available", style("✓").green(), provider);
    } else {
        println!(
            "{} {} is unavailable; searches and ingestion use the local fallback",
            style("⚠").yellow(),
            provider
        );
    }

    let stats = engine.stats().await?;
    println!("Store holds {} embeddings", stats.total);
    Ok(available)
}

/// Accepts RFC 3339 timestamps or plain `YYYY-MM-DD` dates (midnight UTC)
#[inline]
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Ok(timestamp.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("invalid date '{}': expected YYYY-MM-DD or RFC 3339", value))
}
