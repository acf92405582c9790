//! CLI entry point for docatlas.
//!
//! Ingests text documents into a local vector store, answers semantic queries
//! and clusters the stored embeddings. Cluster results are written to JSON so
//! `cluster-search` and `stats` can work on them later without recomputing.

use anyhow::{Context, Result, bail};
use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use docatlas::clustering::{Capabilities, ClusterMatch};
use docatlas::display::{
    create_cluster_table, create_hits_table, create_ingest_table, create_matches_table,
    create_stats_table,
};
use docatlas::documents::{DocumentIndexer, DocumentProcessor, Principal, Visibility};
use docatlas::vector::{FastEmbedGenerator, MemoryVectorStore};
use docatlas::{
    Algorithm, ClusterEngine, ClusterLabel, ClusterRequest, ClusterResult, ClusterStats,
    Granularity, ReductionMethod, Retriever, Settings, logging, search_within_cluster,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// File name of the vector store snapshot inside `data_dir`.
const STORE_FILE: &str = "store.json";

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Document search and clustering
#[derive(Parser)]
#[command(
    name = "docatlas",
    version = env!("CARGO_PKG_VERSION"),
    about = "Document search and clustering",
    long_about = "Split documents into chunks, embed them, search them and cluster them in 2D.",
    next_line_help = true,
    styles = clap_cargo_style()
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// User id the command acts as
    #[arg(long, global = true, default_value_t = 1, env = "DA_USER")]
    user: u32,

    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
enum Commands {
    /// Initialize project
    #[command(about = "Set up .docatlas directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show current configuration settings
    #[command(about = "Display active settings from .docatlas/settings.toml")]
    Config,

    /// Split a text file into chunks without storing anything
    #[command(about = "Preview how a file is chunked")]
    Split {
        file: PathBuf,

        /// Maximum chunk length in characters (overrides config)
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Characters shared between consecutive chunks (overrides config)
        #[arg(long)]
        chunk_overlap: Option<usize>,
    },

    /// Index files or directories
    #[command(
        about = "Split, embed and store documents",
        after_help = "Examples:\n  docatlas ingest notes/\n  docatlas ingest report.md --public\n  docatlas ingest a.txt b.md --owner 2"
    )]
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Owner of the new documents (defaults to --user)
        #[arg(long)]
        owner: Option<u32>,

        /// Make the documents visible to every user
        #[arg(long)]
        public: bool,

        /// Description attached to every ingested document
        #[arg(short, long)]
        description: Option<String>,
    },

    /// Semantic search over accessible chunks
    #[command(about = "Find the chunks most similar to a query")]
    Search {
        query: String,

        /// Number of results (overrides config)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Extractive answer from retrieved chunks
    #[command(about = "Answer a question from the stored documents")]
    Ask { query: String },

    /// Cluster accessible documents or chunks
    #[command(
        about = "Cluster embeddings and project them to 2D",
        after_help = "Examples:\n  docatlas cluster --n-clusters 4 --output clusters.json\n  docatlas cluster --algorithm hdbscan --min-cluster-size 3 --reduction umap\n  docatlas cluster --level chunk"
    )]
    Cluster {
        /// kmeans or hdbscan (overrides config)
        #[arg(long)]
        algorithm: Option<Algorithm>,

        /// Number of clusters for kmeans
        #[arg(long)]
        n_clusters: Option<usize>,

        /// Smallest cluster for hdbscan
        #[arg(long)]
        min_cluster_size: Option<usize>,

        /// umap or tsne (overrides config)
        #[arg(long)]
        reduction: Option<ReductionMethod>,

        /// document or chunk (overrides config)
        #[arg(long)]
        level: Option<Granularity>,

        /// Write the full result as JSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Filter a saved cluster result
    #[command(name = "cluster-search", about = "List the members of one cluster")]
    ClusterSearch {
        /// Result file written by 'docatlas cluster --output'
        #[arg(long)]
        result: PathBuf,

        #[arg(long, allow_negative_numbers = true)]
        cluster_id: i32,

        /// List documents instead of points
        #[arg(long)]
        query: Option<String>,

        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Statistics of a saved cluster result
    #[command(about = "Summarize a saved cluster result")]
    Stats {
        #[arg(long)]
        result: PathBuf,
    },

    /// List the algorithms this build supports
    #[command(about = "Show available algorithms, reductions and levels")]
    Capabilities,
}

#[derive(Debug, Serialize)]
struct SplitOutput<'a> {
    file: &'a Path,
    chunk_size: usize,
    chunk_overlap: usize,
    chunks: Vec<docatlas::Chunk>,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    if !matches!(cli.command, Commands::Init { .. } | Commands::Capabilities) {
        if let Err(warning) = Settings::check_init() {
            eprintln!("Warning: {warning}");
            eprintln!("Using default configuration for now.");
        }
    }

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)
            .with_context(|| format!("Configuration error loading from {}", path.display()))?,
        None => Settings::load().unwrap_or_else(|e| {
            eprintln!("Configuration error: {e}");
            Settings::default()
        }),
    };
    logging::init_with_config(&settings.logging);

    let principal = Principal::new(cli.user);

    match cli.command {
        Commands::Init { force } => {
            Settings::init_config_file(force).map_err(|e| anyhow::anyhow!("{e}"))?;
            println!("Edit this file to customize your settings.");
        }

        Commands::Config => {
            println!("Current Configuration:");
            println!("{}", "=".repeat(50));
            println!("{}", toml::to_string_pretty(&settings)?);
        }

        Commands::Split {
            file,
            chunk_size,
            chunk_overlap,
        } => {
            let mut chunking = settings.chunking.clone();
            if let Some(size) = chunk_size {
                chunking.chunk_size = size;
            }
            if let Some(overlap) = chunk_overlap {
                chunking.chunk_overlap = overlap;
            }
            if let Err(warning) = chunking.validate() {
                tracing::warn!(target: "splitter", "{warning}");
            }

            let processor = DocumentProcessor::new(&chunking);
            let bytes = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let text = processor.extract_text(&bytes, &file_type(&file))?;
            let chunks = processor.chunk_text(&text);

            if cli.json {
                let output = SplitOutput {
                    file: &file,
                    chunk_size: processor.splitter().chunk_size(),
                    chunk_overlap: processor.splitter().chunk_overlap(),
                    chunks,
                };
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                for chunk in &chunks {
                    println!("--- chunk {} ({} chars) ---", chunk.index, chunk.char_len());
                    println!("{}", chunk.content);
                }
                eprintln!("{} chunks", chunks.len());
            }
        }

        Commands::Ingest {
            paths,
            owner,
            public,
            description,
        } => {
            if let Err(warning) = settings.chunking.validate() {
                tracing::warn!(target: "splitter", "{warning}");
            }
            let store = open_store(&settings)?;
            let indexer = DocumentIndexer::new(
                store.clone(),
                DocumentProcessor::new(&settings.chunking),
                settings.embedding.batch_size,
            );
            let visibility = if public {
                Visibility::Public
            } else {
                Visibility::Private
            };

            let stats = indexer.index_paths(
                &paths,
                owner.unwrap_or(cli.user),
                visibility,
                description.as_deref(),
            );
            store.save(store_path(&settings))?;

            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "files_indexed": stats.files_indexed,
                        "files_skipped": stats.files_skipped,
                        "files_failed": stats.files_failed,
                        "chunks_indexed": stats.chunks_indexed,
                        "elapsed_ms": stats.elapsed.as_millis() as u64,
                    })
                );
            } else {
                println!("{}", create_ingest_table(&stats));
                for (path, error) in &stats.errors {
                    eprintln!("  {}: {error}", path.display());
                }
            }
            if stats.files_indexed == 0 && stats.files_failed > 0 {
                bail!("no files could be indexed");
            }
        }

        Commands::Search { query, top_k } => {
            let store = open_store(&settings)?;
            let retriever = Retriever::new(store.clone(), store, settings.search.clone());
            let hits = retriever.semantic_search(
                &principal,
                &query,
                top_k.unwrap_or(settings.search.top_k),
                None,
            )?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
            } else if hits.is_empty() {
                println!("No results for '{query}'");
            } else {
                println!("{}", create_hits_table(&hits));
            }
        }

        Commands::Ask { query } => {
            let store = open_store(&settings)?;
            let retriever = Retriever::new(store.clone(), store, settings.search.clone());
            let answer = retriever.rag(&principal, &query)?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&answer)?);
            } else {
                println!("{}", answer.answer);
            }
        }

        Commands::Cluster {
            algorithm,
            n_clusters,
            min_cluster_size,
            reduction,
            level,
            output,
        } => {
            let mut request = ClusterRequest::from_config(&settings.clustering)?;
            if let Some(algorithm) = algorithm {
                request = request.with_algorithm(algorithm);
            }
            if let Some(k) = n_clusters {
                request = request.with_n_clusters(k);
            }
            if let Some(size) = min_cluster_size {
                request = request.with_min_cluster_size(size);
            }
            if let Some(method) = reduction {
                request = request.with_reduction(method);
            }
            if let Some(level) = level {
                request = request.with_level(level);
            }

            let store = open_store(&settings)?;
            let engine = ClusterEngine::new(
                store.clone(),
                store,
                settings.clustering.clone(),
                settings.fetch.clone(),
            );

            let start = Instant::now();
            let result = engine.generate_for(&principal, &request)?;
            let elapsed = start.elapsed();

            if let Some(path) = &output {
                write_result(path, &result)?;
                eprintln!("Wrote cluster result to {}", path.display());
            }

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else if result.is_empty() {
                println!("Not enough data to cluster (need at least 2 items).");
            } else {
                println!(
                    "{} clusters over {} {}s ({} + {}) in {:.2}s",
                    result.n_clusters,
                    result.points.len(),
                    result.level,
                    result.algorithm,
                    result.reduction_method,
                    elapsed.as_secs_f64()
                );
                println!("{}", create_cluster_table(&result.summaries));
            }
        }

        Commands::ClusterSearch {
            result,
            cluster_id,
            query,
            limit,
        } => {
            let result = read_result(&result)?;
            let matches: Vec<ClusterMatch> = search_within_cluster(
                &result,
                ClusterLabel::new(cluster_id),
                query.as_deref(),
                limit,
            );

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&matches)?);
            } else if matches.is_empty() {
                println!("No members in cluster {cluster_id}");
            } else {
                println!("{}", create_matches_table(&matches));
            }
        }

        Commands::Stats { result } => {
            let result = read_result(&result)?;
            let stats = ClusterStats::from(&result);

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("{}", create_stats_table(&stats));
            }
        }

        Commands::Capabilities => {
            let capabilities = Capabilities::current();
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&capabilities)?);
            } else {
                println!("Algorithms:        {}", capabilities.algorithms.join(", "));
                println!("Reduction methods: {}", capabilities.reduction_methods.join(", "));
                println!("Levels:            {}", capabilities.levels.join(", "));
            }
        }
    }

    Ok(())
}

fn store_path(settings: &Settings) -> PathBuf {
    settings.resolved_data_dir().join(STORE_FILE)
}

/// Load the store snapshot with the configured embedding model.
fn open_store(settings: &Settings) -> Result<Arc<MemoryVectorStore>> {
    let data_dir = settings.resolved_data_dir();
    let cache_dir = data_dir.join("models");
    std::fs::create_dir_all(&cache_dir)
        .with_context(|| format!("Failed to create {}", cache_dir.display()))?;

    let embedder = FastEmbedGenerator::new(&settings.embedding.model, &cache_dir)?;
    let store = MemoryVectorStore::open(store_path(settings), Arc::new(embedder))?;
    tracing::debug!(
        target: "gateway",
        "store ready: {} documents, {} vectors",
        store.document_count(),
        store.vector_count()
    );
    Ok(Arc::new(store))
}

fn file_type(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_string()
}

fn write_result(path: &Path, result: &ClusterResult) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(result)?)
        .with_context(|| format!("Failed to write {}", path.display()))
}

fn read_result(path: &Path) -> Result<ClusterResult> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}; run 'docatlas cluster --output' first", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("{} is not a cluster result", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_cluster_flags() {
        let cli = Cli::parse_from([
            "docatlas",
            "cluster",
            "--algorithm",
            "hdbscan",
            "--min-cluster-size",
            "3",
            "--reduction",
            "umap",
            "--level",
            "chunk",
        ]);
        let Commands::Cluster {
            algorithm,
            min_cluster_size,
            reduction,
            level,
            ..
        } = cli.command
        else {
            panic!("expected cluster command");
        };
        assert_eq!(algorithm, Some(Algorithm::Hdbscan));
        assert_eq!(min_cluster_size, Some(3));
        assert_eq!(reduction, Some(ReductionMethod::Umap));
        assert_eq!(level, Some(Granularity::Chunk));
    }

    #[test]
    fn test_cli_accepts_noise_cluster_id() {
        let cli = Cli::parse_from([
            "docatlas",
            "cluster-search",
            "--result",
            "r.json",
            "--cluster-id",
            "-1",
        ]);
        assert!(matches!(cli.command, Commands::ClusterSearch { cluster_id: -1, limit: 10, .. }));
    }

    #[test]
    fn test_cli_parses_ingest_description() {
        let cli = Cli::parse_from([
            "docatlas",
            "ingest",
            "docs",
            "--public",
            "--description",
            "board minutes",
        ]);
        let Commands::Ingest {
            paths,
            public,
            description,
            ..
        } = cli.command
        else {
            panic!("expected ingest command");
        };
        assert_eq!(paths, vec![PathBuf::from("docs")]);
        assert!(public);
        assert_eq!(description.as_deref(), Some("board minutes"));
    }

    #[test]
    fn test_cli_rejects_unknown_algorithm() {
        assert!(Cli::try_parse_from(["docatlas", "cluster", "--algorithm", "spectral"]).is_err());
    }

    #[test]
    fn test_file_type_from_extension() {
        assert_eq!(file_type(Path::new("notes/a.MD")), "MD");
        assert_eq!(file_type(Path::new("README")), "");
    }
}
