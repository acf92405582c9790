//! Configuration module for docatlas.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `DA_` and use double underscores
//! to separate nested levels:
//! - `DA_CHUNKING__CHUNK_SIZE=500` sets `chunking.chunk_size`
//! - `DA_CLUSTERING__SEED=7` sets `clustering.seed`
//! - `DA_FETCH__CONCURRENCY=4` sets `fetch.concurrency`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Name of the per-workspace configuration directory.
pub const CONFIG_DIR: &str = ".docatlas";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Directory holding the vector store snapshot
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Workspace root directory (where .docatlas is located)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    /// Global debug mode
    #[serde(default = "default_false")]
    pub debug: bool,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub clustering: ClusteringConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub search: SearchConfig,
}

/// Log levels per module. `RUST_LOG` overrides everything here.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default level for all targets: error, warn, info, debug or trace
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-target overrides, e.g. `clustering = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters shared between consecutive chunks
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Separators in priority order; the empty string splits into characters
    #[serde(default = "default_separators")]
    pub separators: Vec<String>,
}

impl ChunkingConfig {
    /// Report settings the splitter would have to silently correct.
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_size == 0 {
            return Err("chunking.chunk_size must be greater than 0".to_string());
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(format!(
                "chunking.chunk_overlap ({}) must be less than chunk_size ({}); overlap will be ignored",
                self.chunk_overlap, self.chunk_size
            ));
        }
        if self.separators.is_empty() {
            return Err("chunking.separators must contain at least one entry".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    /// Model to use for embeddings
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Number of chunks embedded per model call
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ClusteringConfig {
    /// Seed shared by clustering and projection
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Default algorithm: "kmeans" or "hdbscan"
    #[serde(default = "default_algorithm")]
    pub algorithm: String,

    /// Default cluster count for k-means
    #[serde(default = "default_n_clusters")]
    pub n_clusters: usize,

    /// Default minimum cluster size for hdbscan
    #[serde(default = "default_min_cluster_size")]
    pub min_cluster_size: usize,

    /// Default projection: "umap" or "tsne"
    #[serde(default = "default_reduction_method")]
    pub reduction_method: String,

    /// Default granularity: "document" or "chunk"
    #[serde(default = "default_level")]
    pub level: String,

    /// Number of k-means restarts, the lowest inertia wins
    #[serde(default = "default_n_init")]
    pub n_init: usize,

    /// Iteration cap for a single k-means run
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Representative documents listed per cluster
    #[serde(default = "default_max_representatives")]
    pub max_representatives: usize,

    /// Keywords listed per cluster
    #[serde(default = "default_top_keywords")]
    pub top_keywords: usize,

    /// Characters of chunk text kept on chunk-level points
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FetchConfig {
    /// Worker threads fetching vectors from the gateway
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Extra attempts after a failed lookup
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Backoff step in milliseconds, multiplied by the attempt number
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SearchConfig {
    /// Results returned by semantic search
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Neighbours retrieved for an answer
    #[serde(default = "default_rag_top_k")]
    pub rag_top_k: usize,

    /// Characters of each context quoted in an answer
    #[serde(default = "default_rag_context_chars")]
    pub rag_context_chars: usize,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_data_dir() -> PathBuf {
    PathBuf::from(".docatlas/data")
}
fn default_false() -> bool {
    false
}
fn default_log_level() -> String {
    "warn".to_string()
}
fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}
pub(crate) fn default_separators() -> Vec<String> {
    ["\n\n", "\n", ". ", " ", ""]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_embedding_model() -> String {
    "AllMiniLML6V2".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_seed() -> u64 {
    42
}
fn default_algorithm() -> String {
    "kmeans".to_string()
}
fn default_n_clusters() -> usize {
    5
}
fn default_min_cluster_size() -> usize {
    5
}
fn default_reduction_method() -> String {
    "tsne".to_string()
}
fn default_level() -> String {
    "document".to_string()
}
fn default_n_init() -> usize {
    10
}
fn default_max_iterations() -> usize {
    300
}
fn default_max_representatives() -> usize {
    3
}
fn default_top_keywords() -> usize {
    5
}
fn default_preview_chars() -> usize {
    200
}
fn default_concurrency() -> usize {
    num_cpus::get()
}
fn default_retry_attempts() -> u32 {
    2
}
fn default_retry_backoff_ms() -> u64 {
    25
}
fn default_top_k() -> usize {
    5
}
fn default_rag_top_k() -> usize {
    3
}
fn default_rag_context_chars() -> usize {
    200
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            data_dir: default_data_dir(),
            workspace_root: None,
            debug: false,
            logging: LoggingConfig::default(),
            chunking: ChunkingConfig::default(),
            embedding: EmbeddingConfig::default(),
            clustering: ClusteringConfig::default(),
            fetch: FetchConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            separators: default_separators(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            algorithm: default_algorithm(),
            n_clusters: default_n_clusters(),
            min_cluster_size: default_min_cluster_size(),
            reduction_method: default_reduction_method(),
            level: default_level(),
            n_init: default_n_init(),
            max_iterations: default_max_iterations(),
            max_representatives: default_max_representatives(),
            top_keywords: default_top_keywords(),
            preview_chars: default_preview_chars(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            rag_top_k: default_rag_top_k(),
            rag_context_chars: default_rag_context_chars(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        // Try to find the workspace root by looking for .docatlas directory
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("settings.toml"));

        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config_path))
            // Double underscore separates nested levels, single underscore
            // stays part of the field name
            .merge(Env::prefixed("DA_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                if settings.workspace_root.is_none() {
                    settings.workspace_root = Self::workspace_root();
                }
                settings
            })
    }

    /// Find the workspace config by looking for a .docatlas directory
    /// from the current directory up to the filesystem root.
    fn find_workspace_config() -> Option<PathBuf> {
        Self::workspace_root().map(|root| root.join(CONFIG_DIR).join("settings.toml"))
    }

    /// Check if configuration is properly initialized
    pub fn check_init() -> Result<(), String> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("settings.toml"));

        if !config_path.exists() {
            return Err("No configuration file found".to_string());
        }

        match std::fs::read_to_string(&config_path) {
            Ok(content) => {
                if let Err(e) = toml::from_str::<Settings>(&content) {
                    return Err(format!(
                        "Configuration file is corrupted: {e}\nRun 'docatlas init --force' to regenerate."
                    ));
                }
            }
            Err(e) => {
                return Err(format!("Cannot read configuration file: {e}"));
            }
        }

        Ok(())
    }

    /// Get the workspace root directory (where .docatlas is located)
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .find(|ancestor| ancestor.join(CONFIG_DIR).is_dir())
            .map(|ancestor| ancestor.to_path_buf())
    }

    /// Resolve `data_dir` against the workspace root when it is relative.
    pub fn resolved_data_dir(&self) -> PathBuf {
        match &self.workspace_root {
            Some(root) if self.data_dir.is_relative() => root.join(&self.data_dir),
            _ => self.data_dir.clone(),
        }
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<std::path::Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("DA_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Save current configuration to file
    pub fn save(
        &self,
        path: impl AsRef<std::path::Path>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file with helpful comments
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = PathBuf::from(CONFIG_DIR).join("settings.toml");

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let template = format!(
            r#"# docatlas configuration file

# Version of the configuration schema
version = 1

# Directory holding the vector store snapshot (relative to workspace root)
data_dir = ".docatlas/data"

# Global debug mode
debug = false

[logging]
# error, warn, info, debug or trace. RUST_LOG overrides this.
default = "warn"

[logging.modules]
# clustering = "debug"
# fetch = "trace"

[chunking]
# Maximum chunk length in characters
chunk_size = 1000

# Characters shared between consecutive chunks (must be below chunk_size)
chunk_overlap = 200

# Separators tried in order; "" splits into single characters
separators = ["\n\n", "\n", ". ", " ", ""]

[embedding]
# Model to use for embeddings
model = "AllMiniLML6V2"
batch_size = 64

[clustering]
# Seed shared by k-means, UMAP and t-SNE so runs are reproducible
seed = 42

# Defaults for 'docatlas cluster' when flags are omitted
algorithm = "kmeans"          # kmeans | hdbscan
n_clusters = 5
min_cluster_size = 5
reduction_method = "tsne"     # umap | tsne
level = "document"            # document | chunk

n_init = 10
max_iterations = 300
max_representatives = 3
top_keywords = 5
preview_chars = 200

[fetch]
# Worker threads fetching vectors (defaults to CPU count)
# concurrency = {}
retry_attempts = 2
retry_backoff_ms = 25

[search]
top_k = 5
rag_top_k = 3
rag_context_chars = 200
"#,
            num_cpus::get()
        );

        std::fs::write(&config_path, template)?;

        if force {
            println!("Overwrote configuration at: {}", config_path.display());
        } else {
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
        }

        Ok(config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.data_dir, PathBuf::from(".docatlas/data"));
        assert_eq!(settings.chunking.chunk_size, 1000);
        assert_eq!(settings.chunking.chunk_overlap, 200);
        assert_eq!(settings.chunking.separators.last().map(String::as_str), Some(""));
        assert_eq!(settings.clustering.seed, 42);
        assert!(settings.fetch.concurrency > 0);
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let toml_content = r#"
version = 2

[chunking]
chunk_size = 400
separators = ["\n", " "]

[clustering]
algorithm = "hdbscan"
min_cluster_size = 3

[logging.modules]
clustering = "debug"
"#;

        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.version, 2);
        assert_eq!(settings.chunking.chunk_size, 400);
        assert_eq!(settings.chunking.separators, vec!["\n", " "]);
        // Unspecified fields keep their defaults
        assert_eq!(settings.chunking.chunk_overlap, 200);
        assert_eq!(settings.clustering.algorithm, "hdbscan");
        assert_eq!(settings.clustering.min_cluster_size, 3);
        assert_eq!(settings.clustering.n_init, 10);
        assert_eq!(settings.logging.modules["clustering"], "debug");
    }

    #[test]
    fn test_save_settings() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("settings.toml");

        let mut settings = Settings::default();
        settings.fetch.concurrency = 2;
        settings.clustering.seed = 7;

        settings.save(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded.fetch.concurrency, 2);
        assert_eq!(loaded.clustering.seed, 7);
    }

    #[test]
    fn test_chunking_validation() {
        assert!(ChunkingConfig::default().validate().is_ok());

        let zero = ChunkingConfig {
            chunk_size: 0,
            ..ChunkingConfig::default()
        };
        assert!(zero.validate().is_err());

        let overlap = ChunkingConfig {
            chunk_size: 100,
            chunk_overlap: 100,
            ..ChunkingConfig::default()
        };
        let err = overlap.validate().unwrap_err();
        assert!(err.contains("overlap will be ignored"));
    }

    #[test]
    fn test_template_parses() {
        let temp_dir = TempDir::new().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        let path = Settings::init_config_file(false).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        let parsed: Result<Settings, _> = toml::from_str(&content);
        // A second init without force refuses to overwrite
        let again = Settings::init_config_file(false);

        std::env::set_current_dir(original_dir).unwrap();

        let parsed = parsed.unwrap();
        assert_eq!(parsed.chunking.separators, default_separators());
        assert_eq!(parsed.clustering.reduction_method, "tsne");
        assert!(again.is_err());
    }
}
