use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use qa_recall::commands::{
    ConfigUpdate, configure, delete, health, ingest, ingest_batch_file, open_engine,
    parse_timestamp, search, show_config, show_stats,
};
use qa_recall::config::{Config, resolve_base_dir};
use qa_recall::{DateRange, RecallError, Result, SearchRequest, SourceCategory, Timeframe};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "qa-recall")]
#[command(about = "Semantic recall over requirements, defects, test cases and documents")]
#[command(version)]
struct Cli {
    /// Base directory for the config file and store (defaults to $RECALL_DIR or ~/.qa-recall)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Skip the embedding provider and use the local fallback for every vector
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the configuration file, optionally overriding Ollama settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
        #[arg(long)]
        protocol: Option<String>,
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        embedding_dimension: Option<u32>,
    },
    /// Embed and store one record
    Ingest {
        /// Category of the owning record, e.g. "defect" or "test_case"
        category: SourceCategory,
        source_id: String,
        content: String,
    },
    /// Embed and store every record of a JSONL file
    IngestBatch { file: PathBuf },
    /// Remove a stored embedding
    Delete {
        category: SourceCategory,
        source_id: String,
    },
    /// Rank stored records by similarity to a query
    Search {
        query: String,
        /// Restrict to these categories (repeat or comma-separate)
        #[arg(long = "category", value_delimiter = ',')]
        categories: Vec<SourceCategory>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        min_similarity: Option<f32>,
        /// last_week, last_month, last_quarter, last_year or all
        #[arg(long, conflicts_with_all = ["from", "to"])]
        timeframe: Option<Timeframe>,
        /// Inclusive lower bound (YYYY-MM-DD or RFC 3339)
        #[arg(long, value_parser = parse_timestamp)]
        from: Option<DateTime<Utc>>,
        /// Exclusive upper bound (YYYY-MM-DD or RFC 3339)
        #[arg(long, value_parser = parse_timestamp)]
        to: Option<DateTime<Utc>>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show stored embedding counts
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Check whether the embedding provider is reachable
    Health,
}

fn build_search_request(
    query: String,
    categories: Vec<SourceCategory>,
    limit: Option<usize>,
    min_similarity: Option<f32>,
    timeframe: Option<Timeframe>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> SearchRequest {
    let mut request = SearchRequest::new(query);
    if !categories.is_empty() {
        request = request.with_categories(categories);
    }
    if let Some(limit) = limit {
        request = request.with_limit(limit);
    }
    if let Some(min_similarity) = min_similarity {
        request = request.with_min_similarity(min_similarity);
    }
    if let Some(timeframe) = timeframe {
        request = request.with_timeframe(timeframe);
    } else if from.is_some() || to.is_some() {
        request = request.with_range(DateRange::new(from, to));
    }
    request
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let base_dir =
        resolve_base_dir(cli.dir).map_err(|e| RecallError::Config(e.to_string()))?;
    let config = Config::load(&base_dir)?;

    match cli.command {
        Commands::Config {
            show,
            protocol,
            host,
            port,
            model,
            embedding_dimension,
        } => {
            if show {
                show_config(&config);
            } else {
                let update = ConfigUpdate {
                    protocol,
                    host,
                    port,
                    model,
                    embedding_dimension,
                };
                configure(config, update).await?;
            }
        }
        Commands::Ingest {
            category,
            source_id,
            content,
        } => {
            let engine = open_engine(&config, cli.offline).await?;
            ingest(&engine, &content, &source_id, category).await?;
        }
        Commands::IngestBatch { file } => {
            let engine = open_engine(&config, cli.offline).await?;
            ingest_batch_file(&engine, &file).await?;
        }
        Commands::Delete {
            category,
            source_id,
        } => {
            let engine = open_engine(&config, cli.offline).await?;
            delete(&engine, &source_id, category).await?;
        }
        Commands::Search {
            query,
            categories,
            limit,
            min_similarity,
            timeframe,
            from,
            to,
            json,
        } => {
            let request =
                build_search_request(query, categories, limit, min_similarity, timeframe, from, to);
            let engine = open_engine(&config, cli.offline).await?;
            search(&engine, &request, json).await?;
        }
        Commands::Stats { json } => {
            let engine = open_engine(&config, cli.offline).await?;
            show_stats(&engine, json).await?;
        }
        Commands::Health => {
            let engine = open_engine(&config, cli.offline).await?;
            if !health(&engine).await? {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn search_command_with_filters() {
        let cli = Cli::try_parse_from([
            "qa-recall",
            "search",
            "cannot sign in",
            "--category",
            "defect,test_case",
            "--limit",
            "2",
            "--min-similarity",
            "0.3",
            "--timeframe",
            "last-week",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Search {
                query,
                categories,
                limit,
                min_similarity,
                timeframe,
                ..
            } = parsed.command
            {
                assert_eq!(query, "cannot sign in");
                assert_eq!(
                    categories,
                    vec![SourceCategory::Defect, SourceCategory::TestCase]
                );
                assert_eq!(limit, Some(2));
                assert_eq!(min_similarity, Some(0.3));
                assert_eq!(timeframe, Some(Timeframe::LastWeek));
            } else {
                panic!("expected search command");
            }
        }
    }

    #[test]
    fn timeframe_conflicts_with_explicit_range() {
        let cli = Cli::try_parse_from([
            "qa-recall",
            "search",
            "login",
            "--timeframe",
            "last_month",
            "--from",
            "2025-01-01",
        ]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
        }
    }

    #[test]
    fn explicit_range_builds_range_filter() {
        let from = parse_timestamp("2025-01-01").ok();
        let request = build_search_request(
            "login".to_string(),
            Vec::new(),
            None,
            None,
            None,
            from,
            None,
        );

        assert_eq!(request.categories, None);
        assert_eq!(
            request.date_filter,
            Some(qa_recall::DateFilter::Range(DateRange::new(from, None)))
        );
    }

    #[test]
    fn unknown_category_is_rejected() {
        let cli = Cli::try_parse_from(["qa-recall", "delete", "bug", "D-1"]);
        assert!(cli.is_err());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["qa-recall", "stats", "--offline", "--dir", "/tmp/recall"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(parsed.offline);
            assert_eq!(parsed.dir, Some(PathBuf::from("/tmp/recall")));
            assert!(matches!(parsed.command, Commands::Stats { json: false }));
        }
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["qa-recall", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Config { show, .. } = parsed.command {
                assert!(show);
            }
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["qa-recall", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }
}
