//! Sentiment ETL pipeline
//!
//! Batch job: fetch, normalize, enrich, store. Also reads back stored results.

use clap::{Parser, Subcommand};
use sentiment_pipeline::{
    config::Config,
    pipeline::PipelineRunner,
    storage::{DocumentStore, MemoryStore, SqliteStore},
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "sentiment-pipeline")]
#[command(about = "Score forum posts, microblog posts and news headlines for sentiment and topic")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Separate credentials file, layered over the config
    #[arg(long)]
    credentials: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one batch
    Run {
        /// Write to an in-memory store instead of the database
        #[arg(long)]
        dry_run: bool,
    },
    /// Average sentiment and document count per source
    Stats,
    /// Show the most recently collected documents
    Recent {
        /// Number of documents to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config, cli.credentials.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            std::process::exit(2);
        }
    };

    match cli.command {
        Commands::Run { dry_run } => {
            let code = run_pipeline(config, dry_run).await?;
            std::process::exit(code);
        }
        Commands::Stats => show_stats(config).await,
        Commands::Recent { limit } => show_recent(config, limit).await,
    }
}

async fn run_pipeline(config: Config, dry_run: bool) -> anyhow::Result<i32> {
    let store: Arc<dyn DocumentStore> = if dry_run {
        tracing::warn!("Running in DRY RUN mode - results are kept in memory only");
        Arc::new(MemoryStore::new())
    } else {
        match SqliteStore::connect(config.database_path(), &config.database.table).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                tracing::error!("Storage unreachable: {}", e);
                return Ok(2);
            }
        }
    };

    let runner = PipelineRunner::from_config(&config, store)?;
    let summary = runner.run().await;

    println!("\n{}", summary);
    Ok(summary.exit_code())
}

async fn open_store(config: &Config) -> anyhow::Result<SqliteStore> {
    Ok(SqliteStore::connect(config.database_path(), &config.database.table).await?)
}

async fn show_stats(config: Config) -> anyhow::Result<()> {
    let store = open_store(&config).await?;
    let stats = store.stats_by_source().await?;

    println!("\nSentiment by source ({} documents):\n", store.count().await?);
    println!(
        "{:<10} {:>9} {:>9} {:>9} {:>8} {:>9}",
        "Source", "Documents", "Avg", "Positive", "Neutral", "Negative"
    );
    println!("{}", "-".repeat(60));

    for s in stats {
        println!(
            "{:<10} {:>9} {:>9.3} {:>9} {:>8} {:>9}",
            s.source_type.as_str(),
            s.documents,
            s.avg_compound,
            s.positive,
            s.neutral,
            s.negative
        );
    }

    Ok(())
}

async fn show_recent(config: Config, limit: usize) -> anyhow::Result<()> {
    let store = open_store(&config).await?;
    let docs = store.recent(limit).await?;

    println!("\nLatest {} documents:\n", docs.len());
    println!("{:<10} {:>8} {:<9} {:>5}  {}", "Source", "Compound", "Label", "Topic", "Text");
    println!("{}", "-".repeat(80));

    for doc in docs {
        let text: String = doc.document.text.replace('\n', " ");
        let text = if text.chars().count() > 44 {
            format!("{}...", text.chars().take(41).collect::<String>())
        } else {
            text
        };

        println!(
            "{:<10} {:>8.3} {:<9} {:>5}  {}",
            doc.source_type().as_str(),
            doc.sentiment.compound,
            doc.sentiment.label.as_str(),
            doc.topic.topic_id,
            text
        );
    }

    Ok(())
}
