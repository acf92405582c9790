//! Ingestion: files to chunks to stored vectors.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use walkdir::WalkDir;

use crate::documents::{DocumentId, DocumentProcessor, Visibility};
use crate::error::{DocumentError, DocumentResult, GatewayError};
use crate::vector::{MemoryVectorStore, NewDocument};

/// Outcome of indexing one document.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedDocument {
    pub document_id: DocumentId,
    pub chunks: usize,
    /// Chunks removed from a previous version of the same document
    pub superseded: usize,
}

/// Statistics collected while ingesting files.
#[derive(Debug, Default)]
pub struct IngestStats {
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub files_failed: usize,
    pub chunks_indexed: usize,
    pub elapsed: Duration,
    /// First errors encountered
    pub errors: Vec<(PathBuf, String)>,
    start_time: Option<Instant>,
}

impl IngestStats {
    const MAX_ERRORS: usize = 100;

    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn stop_timing(&mut self) {
        if let Some(start) = self.start_time.take() {
            self.elapsed = start.elapsed();
        }
    }

    pub fn add_error(&mut self, path: PathBuf, error: String) {
        if self.errors.len() < Self::MAX_ERRORS {
            self.errors.push((path, error));
        }
        self.files_failed += 1;
    }
}

/// Splits, embeds and stores documents in a [`MemoryVectorStore`].
///
/// A document is identified by owner and filename. Indexing it again replaces
/// the previous chunks.
pub struct DocumentIndexer {
    store: Arc<MemoryVectorStore>,
    processor: DocumentProcessor,
    batch_size: usize,
}

impl DocumentIndexer {
    #[must_use]
    pub fn new(store: Arc<MemoryVectorStore>, processor: DocumentProcessor, batch_size: usize) -> Self {
        Self {
            store,
            processor,
            batch_size: batch_size.max(1),
        }
    }

    /// Index text under the given document metadata.
    ///
    /// Every chunk is embedded before the store is touched, so a failed
    /// embedding leaves a previous version of the document intact.
    pub fn index_document(&self, document: NewDocument, text: &str) -> DocumentResult<IndexedDocument> {
        let chunks = self.processor.chunk_text(text);
        let embedder = self.store.embedder();
        let dimension = embedder.dimension();

        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<&str> = batch.iter().map(|c| c.content.as_str()).collect();
            let embedded = embedder
                .generate_embeddings(&texts)
                .map_err(GatewayError::from)?;
            if embedded.len() != batch.len() {
                return Err(GatewayError::Embedding(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    embedded.len()
                ))
                .into());
            }
            for vector in &embedded {
                dimension.validate_vector(vector).map_err(GatewayError::from)?;
            }
            vectors.extend(embedded);
        }

        let (document_id, superseded) =
            match self.store.find_document(document.owner_id, &document.filename) {
                Some(id) => {
                    self.store
                        .update_document(id, document.description.clone(), document.visibility);
                    (id, self.store.clear_chunks(id))
                }
                None => (self.store.insert_document(document.clone())?, 0),
            };

        for (chunk, vector) in chunks.iter().zip(vectors) {
            self.store
                .upsert_chunk(document_id, chunk.index, &chunk.content, vector)?;
        }

        tracing::info!(
            target: "indexer",
            "indexed '{}' as document {document_id}: {} chunks ({superseded} superseded)",
            document.filename,
            chunks.len()
        );

        Ok(IndexedDocument {
            document_id,
            chunks: chunks.len(),
            superseded,
        })
    }

    /// Read and index a single file. The filename becomes the document name.
    pub fn index_file(
        &self,
        path: &Path,
        owner_id: u32,
        visibility: Visibility,
        description: Option<&str>,
    ) -> DocumentResult<IndexedDocument> {
        let file_type = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();
        let bytes = std::fs::read(path).map_err(|source| DocumentError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let text = self.processor.extract_text(&bytes, file_type)?;

        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        self.index_document(
            NewDocument {
                filename,
                description: description.map(str::to_string),
                owner_id,
                visibility,
            },
            &text,
        )
    }

    /// Index files and directories. Directories are walked recursively and
    /// only supported file types are picked up; hidden entries are skipped.
    /// Every file gets the same `description`.
    pub fn index_paths(
        &self,
        paths: &[PathBuf],
        owner_id: u32,
        visibility: Visibility,
        description: Option<&str>,
    ) -> IngestStats {
        let mut stats = IngestStats::new();

        let mut files = Vec::new();
        for root in paths {
            files.extend(discover_files(root, &mut stats));
        }

        for file in files {
            let supported = file
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(DocumentProcessor::supports);
            if !supported {
                tracing::debug!(target: "indexer", "skipping unsupported file {}", file.display());
                stats.files_skipped += 1;
                continue;
            }

            match self.index_file(&file, owner_id, visibility, description) {
                Ok(indexed) => {
                    stats.files_indexed += 1;
                    stats.chunks_indexed += indexed.chunks;
                }
                Err(e) => {
                    tracing::warn!(target: "indexer", "failed to index {}: {e}", file.display());
                    stats.add_error(file, e.to_string());
                }
            }
        }

        stats.stop_timing();
        stats
    }
}

/// Collect the files under `root`. Entries the walk cannot read are logged and
/// recorded as failures.
fn discover_files(root: &Path, stats: &mut IngestStats) -> Vec<PathBuf> {
    if root.is_file() {
        return vec![root.to_path_buf()];
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0 || !entry.file_name().to_string_lossy().starts_with('.')
        });

    for entry in walker {
        match entry {
            Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
            Ok(_) => {}
            Err(e) => {
                let path = e.path().unwrap_or(root).to_path_buf();
                tracing::warn!(target: "indexer", "cannot read {}: {e}", path.display());
                stats.add_error(path, e.to_string());
            }
        }
    }
    files
}
