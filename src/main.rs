//! # llmc
//!
//! CLI entry point for the local-first code catalog, retrieval, and
//! enrichment engine. See [`llmc_engine`] for the library's module map.

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use llmc_engine::catalog::Catalog;
use llmc_engine::config::{self, Config};
use llmc_engine::enrichment;
use llmc_engine::error::render_boundary_error;
use llmc_engine::indexer;
use llmc_engine::migrate;
use llmc_engine::progress::ProgressMode;
use llmc_engine::schema_extractor;
use llmc_engine::server;
use llmc_engine::{daemon, db};

#[derive(Parser)]
#[command(
    name = "llmc",
    about = "A local-first code catalog, retrieval, and enrichment engine",
    version
)]
struct Cli {
    /// Path to configuration file
    #[arg(long, global = true, default_value = "./llmc.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the catalog database schema
    Init,

    /// Full index of the configured working tree
    Index {
        /// Show progress as JSON lines instead of human-readable text
        #[arg(long)]
        json_progress: bool,
    },

    /// Incremental index driven by a git commit range
    Sync {
        /// Commit the catalog was last synced at
        from_commit: String,

        /// Commit to sync to (defaults to the working tree)
        to_commit: Option<String>,
    },

    /// Entity/relation graph operations
    Graph {
        #[command(subcommand)]
        action: GraphAction,
    },

    /// Search indexed spans
    Search {
        /// Search query
        query: String,

        /// Embedding profile to use for the semantic channel
        #[arg(long, default_value = "default")]
        profile: String,

        /// Maximum number of results
        #[arg(long, default_value_t = 12)]
        limit: usize,

        /// Remaining token budget for this turn, bounding retrieval depth
        #[arg(long, default_value_t = 8000)]
        context_remaining: usize,
    },

    /// Run the enrichment pipeline over pending spans
    Enrich {
        /// Enrichment chain name
        chain: String,

        /// Maximum number of spans to enrich in this run
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },

    /// Inspect repository/index status
    Repo {
        #[command(subcommand)]
        action: RepoAction,
    },

    /// Run the long-lived watcher/poller service
    Service,

    /// Print shell completions to stdout
    Completions {
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum GraphAction {
    /// Rebuild entities and relations for every span in the catalog
    Build,
}

#[derive(Subcommand)]
enum RepoAction {
    /// Print catalog file/span counts and the last recorded index status
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = run(cli).await;

    if let Err(err) = &result {
        eprintln!("{}", render_boundary_error(err));
    }
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Commands::Completions { shell } = &cli.command {
        generate(*shell, &mut Cli::command(), "llmc", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Catalog database initialized successfully.");
        }
        Commands::Index { json_progress } => {
            let catalog = open_catalog(&cfg).await?;
            let mode = if json_progress { ProgressMode::Json } else { ProgressMode::default_for_tty() };
            let reporter = mode.reporter();
            reporter.report(llmc_engine::progress::IndexProgressEvent::Walking {
                root: cfg.indexer.root.display().to_string(),
            });
            let stats = indexer::index_full(&cfg, &catalog).await?;
            println!(
                "indexed {} files, {} spans inserted, {} unchanged, {} deleted, {} files removed",
                stats.files_indexed, stats.spans_inserted, stats.spans_unchanged, stats.spans_deleted, stats.files_removed
            );
        }
        Commands::Sync { from_commit, to_commit } => {
            let catalog = open_catalog(&cfg).await?;
            let stats = indexer::index_incremental(&cfg, &catalog, &from_commit, to_commit.as_deref()).await?;
            println!(
                "synced from {} to {}: {} files touched, {} spans inserted, {} deleted",
                from_commit,
                to_commit.as_deref().unwrap_or("HEAD"),
                stats.files_indexed,
                stats.spans_inserted,
                stats.spans_deleted
            );
        }
        Commands::Graph { action } => match action {
            GraphAction::Build => {
                let catalog = open_catalog(&cfg).await?;
                let spans_processed = schema_extractor::build_graph(&catalog).await?;
                println!("rebuilt graph for {} spans", spans_processed);
            }
        },
        Commands::Search {
            query,
            profile,
            limit,
            context_remaining,
        } => {
            let catalog = open_catalog(&cfg).await?;
            let plan =
                llmc_engine::planner::search(&cfg, &catalog, &profile, &query, limit, context_remaining).await?;
            if plan.spans.is_empty() {
                println!("(no catalog results; confidence {:.2})", plan.confidence);
            }
            for (rank, result) in plan.spans.iter().enumerate() {
                println!(
                    "{:>3}  {:.4}  {}  {}  [{} {}]",
                    rank + 1,
                    result.score,
                    result.file_path,
                    result.name.as_deref().unwrap_or("<anonymous>"),
                    result.freshness,
                    result.source_tag
                );
                println!("      {}", result.snippet);
            }
        }
        Commands::Enrich { chain, limit } => {
            let catalog = open_catalog(&cfg).await?;
            let now = current_unix_time();
            let enrichments = enrichment::process_batch(&cfg, &catalog, &chain, now, limit).await?;
            println!("enriched {} spans via chain '{}'", enrichments.len(), chain);
        }
        Commands::Repo { action } => match action {
            RepoAction::Status => {
                let catalog = open_catalog(&cfg).await?;
                let files = catalog.known_file_paths().await?;
                let spans = catalog.all_spans().await?;
                let last_indexed = catalog.get_status("last_full_index_at").await?;
                println!("files: {}", files.len());
                println!("spans: {}", spans.len());
                println!(
                    "last full index: {}",
                    last_indexed.as_deref().unwrap_or("never")
                );
            }
        },
        Commands::Service => {
            let catalog = open_catalog(&cfg).await?;
            let cancel = CancellationToken::new();
            let server_cancel = cancel.clone();
            let server_cfg = cfg.clone();
            let server_catalog = catalog.clone();
            let server_task = tokio::spawn(async move {
                if let Err(err) = server::run_server(&server_cfg, server_catalog).await {
                    tracing::warn!(error = %err, "http server stopped");
                }
                server_cancel.cancel();
            });

            let ctrl_c = tokio::signal::ctrl_c();
            tokio::pin!(ctrl_c);
            tokio::select! {
                _ = &mut ctrl_c => cancel.cancel(),
                _ = daemon::run(cfg, catalog, cancel.clone()) => {}
            }
            server_task.abort();
        }
        Commands::Completions { .. } => unreachable!("handled before config load"),
    }

    Ok(())
}

async fn open_catalog(cfg: &Config) -> anyhow::Result<Catalog> {
    let pool = db::connect(cfg).await?;
    migrate::run_migrations_on(&pool).await?;
    Ok(Catalog::new(pool))
}

fn current_unix_time() -> i64 {
    chrono::Utc::now().timestamp()
}
