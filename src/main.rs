mod bootstrap;
mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, ensure};
use clap::{Parser, Subcommand};
use sift_index::{IndexWatcher, Indexer, IndexerConfig, WatcherConfig, WriteLock};
use sift_store::{SearchFilter, SearchResult, VectorStore};

use crate::bootstrap::{create_store, resolve_config_path};
use crate::config::Config;

#[derive(Debug, Parser)]
#[command(name = "sift", version, about = "Semantic index kept in sync with a directory")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Index every matching file under DIR once, then exit.
    Index { dir: Option<PathBuf> },
    /// Index DIR, then keep the index in sync until Ctrl-C.
    Watch { dir: Option<PathBuf> },
    /// Search the index.
    Search {
        query: String,
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,
        #[arg(long)]
        tag: Option<String>,
        #[arg(long)]
        session: Option<String>,
        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = resolve_config_path(cli.config.as_deref());
    let mut config = Config::from_file(&config_path)?;
    let level = std::env::var("SIFT_LOG_LEVEL").unwrap_or_else(|_| config.log.level.clone());
    init_subscriber(&level);
    config.apply_env_overrides();
    config.validate()?;
    tracing::debug!(path = %config_path.display(), "config loaded");

    let store: Arc<dyn VectorStore> = Arc::new(create_store(&config).await?);
    store
        .init()
        .await
        .context("failed to initialize embedding backends")?;

    match cli.command {
        Command::Index { dir } => {
            let dir = dir.unwrap_or_else(|| config.index.root.clone());
            index(&config, store, &dir).await
        }
        Command::Watch { dir } => {
            let dir = dir.unwrap_or_else(|| config.index.root.clone());
            watch(&config, store, &dir).await
        }
        Command::Search {
            query,
            limit,
            tag,
            session,
            json,
        } => {
            let filter = SearchFilter { tag, session };
            let filter = (!filter.is_empty()).then_some(filter);
            let hits = store.search(&query, limit, filter.as_ref()).await?;
            print_hits(&hits, json)
        }
    }
}

fn init_subscriber(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn start_pipeline(
    config: &Config,
    store: Arc<dyn VectorStore>,
    dir: &Path,
) -> anyhow::Result<(Indexer, IndexWatcher)> {
    ensure!(dir.is_dir(), "{} is not a directory", dir.display());
    let indexer = Indexer::start(
        store,
        WriteLock::new(),
        IndexerConfig {
            root: dir.to_path_buf(),
            mode: config.index.mode,
            tags: config.index.tags.clone(),
            session_id: config.index.session_id.clone(),
            lock_timeout: config.index.lock_timeout(),
        },
    );
    let watcher = IndexWatcher::new(
        indexer.clone(),
        WatcherConfig {
            debounce: config.index.debounce(),
            extensions: config.index.extensions.clone(),
        },
    );
    Ok((indexer, watcher))
}

async fn index(config: &Config, store: Arc<dyn VectorStore>, dir: &Path) -> anyhow::Result<()> {
    let (indexer, watcher) = start_pipeline(config, store, dir)?;
    let scan = watcher.scan(dir).await?;
    indexer.idle().await?;

    let report = indexer.report();
    println!(
        "{} files indexed ({} chunks), {} skipped, {} failed",
        report.files_indexed, report.chunks_created, report.files_skipped, report.errors
    );
    for e in &scan.errors {
        eprintln!("scan error: {e}");
    }
    Ok(())
}

async fn watch(config: &Config, store: Arc<dyn VectorStore>, dir: &Path) -> anyhow::Result<()> {
    let (indexer, watcher) = start_pipeline(config, store, dir)?;
    watcher.scan(dir).await?;
    watcher.start(&[dir])?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    tracing::info!("received shutdown signal");

    watcher.close();
    indexer.idle().await?;
    let report = indexer.report();
    tracing::info!(
        indexed = report.files_indexed,
        removed = report.files_removed,
        failed = report.errors,
        "watcher stopped"
    );
    Ok(())
}

fn print_hits(hits: &[SearchResult], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(hits)?);
        return Ok(());
    }
    if hits.is_empty() {
        println!("no results");
        return Ok(());
    }
    for (i, hit) in hits.iter().enumerate() {
        println!("{}", format_hit(i + 1, hit));
    }
    Ok(())
}

fn format_hit(rank: usize, hit: &SearchResult) -> String {
    let lines = match (hit.metadata.get("startLine"), hit.metadata.get("endLine")) {
        (Some(start), Some(end)) => format!(":{start}-{end}"),
        _ => String::new(),
    };
    let name = hit
        .metadata
        .get("name")
        .and_then(|n| n.as_str())
        .unwrap_or("anonymous");
    let preview = hit.text.lines().next().unwrap_or_default().trim();
    format!(
        "{rank:>2}. {}{lines} {name} ({:.4})\n    {preview}",
        hit.source, hit.score
    )
}
