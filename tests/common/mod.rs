#![allow(dead_code)]

use docatlas::config::ChunkingConfig;
use docatlas::documents::{DocumentIndexer, DocumentProcessor, Visibility};
use docatlas::vector::{EmbeddingGenerator, MemoryVectorStore, VectorDimension, VectorError};
use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Bag-of-words embedder: every word adds weight to a hashed bucket.
///
/// Texts that share vocabulary end up close in cosine distance, which is
/// enough to exercise search and clustering without downloading a model.
pub struct HashingEmbedder {
    dimension: VectorDimension,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: VectorDimension::new(dimension).expect("valid dimension"),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let dim = self.dimension.get();
        let mut vector = vec![0.0f32; dim];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            vector[(hasher.finish() % dim as u64) as usize] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm == 0.0 {
            vector[0] = 1.0;
        } else {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

impl EmbeddingGenerator for HashingEmbedder {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }
}

/// A scratch directory of documents plus an in-memory store to ingest them into.
pub struct TestProject {
    pub dir: TempDir,
    pub store: Arc<MemoryVectorStore>,
}

impl TestProject {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
            store: Arc::new(MemoryVectorStore::new(Arc::new(HashingEmbedder::new(64)))),
        }
    }

    pub fn add_file(&self, path: &str, content: &str) -> PathBuf {
        let file_path = self.dir.path().join(path);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        fs::write(&file_path, content).expect("Failed to write file");
        file_path
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn indexer(&self, chunking: &ChunkingConfig) -> DocumentIndexer {
        DocumentIndexer::new(self.store.clone(), DocumentProcessor::new(chunking), 8)
    }

    /// Ingest the whole project directory as `owner_id`.
    pub fn ingest_all(&self, owner_id: u32, visibility: Visibility) -> usize {
        let stats = self
            .indexer(&ChunkingConfig::default())
            .index_paths(&[self.path().to_path_buf()], owner_id, visibility, None);
        assert_eq!(stats.files_failed, 0, "ingest errors: {:?}", stats.errors);
        stats.files_indexed
    }
}

/// Two topics with disjoint vocabulary, three documents each.
pub const FINANCE_DOCS: [(&str, &str); 3] = [
    ("finance/invoice.md", "invoice payment overdue balance ledger account quarterly"),
    ("finance/budget.md", "budget payment balance ledger account forecast quarterly"),
    ("finance/audit.txt", "audit invoice balance ledger account payment quarterly"),
];

pub const COOKING_DOCS: [(&str, &str); 3] = [
    ("cooking/bread.md", "bread flour yeast oven knead dough baking"),
    ("cooking/pizza.md", "pizza dough flour oven tomato yeast baking"),
    ("cooking/cake.txt", "cake flour sugar oven butter eggs baking"),
];

pub fn add_topic_docs(project: &TestProject) {
    for (path, content) in FINANCE_DOCS.iter().chain(COOKING_DOCS.iter()) {
        project.add_file(path, content);
    }
}
