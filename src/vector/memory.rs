//! In-process vector store implementing both gateway traits.
//!
//! Vectors and document records live behind one `RwLock`, so readers (search,
//! clustering fetches) proceed concurrently while ingestion holds the write
//! lock briefly per chunk. The whole store can be snapshotted to JSON.

use parking_lot::RwLock;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::documents::{
    ChunkId, ChunkRecord, DocumentId, DocumentRecord, Principal, Visibility,
};
use crate::error::{GatewayError, GatewayResult};
use crate::vector::{
    ChunkPayload, DocumentSource, EmbeddingGenerator, Neighbor, Score, SearchFilter,
    VectorDimension, VectorError, VectorGateway, VectorId, cosine_similarity,
};

/// Snapshot format version.
const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredVector {
    id: VectorId,
    vector: Vec<f32>,
    payload: ChunkPayload,
}

#[derive(Debug, Default)]
struct StoreState {
    documents: BTreeMap<DocumentId, DocumentRecord>,
    vectors: BTreeMap<VectorId, StoredVector>,
    dimension: Option<VectorDimension>,
    next_document: u32,
    next_chunk: u32,
    next_vector: u32,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    dimension: Option<VectorDimension>,
    next_document: u32,
    next_chunk: u32,
    next_vector: u32,
    documents: Vec<DocumentRecord>,
    vectors: Vec<StoredVector>,
}

/// Metadata for a document about to be ingested.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDocument {
    pub filename: String,
    pub description: Option<String>,
    pub owner_id: u32,
    pub visibility: Visibility,
}

/// Thread-safe in-memory vector store.
pub struct MemoryVectorStore {
    embedder: Arc<dyn EmbeddingGenerator>,
    state: RwLock<StoreState>,
}

impl std::fmt::Debug for MemoryVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("MemoryVectorStore")
            .field("documents", &state.documents.len())
            .field("vectors", &state.vectors.len())
            .field("dimension", &state.dimension)
            .finish()
    }
}

impl MemoryVectorStore {
    /// Create an empty store that embeds text with `embedder`.
    #[must_use]
    pub fn new(embedder: Arc<dyn EmbeddingGenerator>) -> Self {
        Self {
            embedder,
            state: RwLock::new(StoreState::default()),
        }
    }

    /// Load a snapshot from `path`, or start empty if it does not exist.
    pub fn open(path: impl AsRef<Path>, embedder: Arc<dyn EmbeddingGenerator>) -> GatewayResult<Self> {
        let path = path.as_ref();
        let store = Self::new(embedder);
        if !path.exists() {
            tracing::debug!(target: "gateway", "no snapshot at {}, starting empty", path.display());
            return Ok(store);
        }

        let content = std::fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&content)
            .map_err(|e| GatewayError::Serialization(format!("{}: {e}", path.display())))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(GatewayError::Serialization(format!(
                "unsupported snapshot version {} (expected {SNAPSHOT_VERSION})",
                snapshot.version
            )));
        }

        {
            let mut state = store.state.write();
            state.dimension = snapshot.dimension;
            state.next_document = snapshot.next_document;
            state.next_chunk = snapshot.next_chunk;
            state.next_vector = snapshot.next_vector;
            state.documents = snapshot
                .documents
                .into_iter()
                .map(|doc| (doc.document_id, doc))
                .collect();
            state.vectors = snapshot.vectors.into_iter().map(|v| (v.id, v)).collect();
            tracing::info!(
                target: "gateway",
                "loaded {} documents and {} vectors from {}",
                state.documents.len(),
                state.vectors.len(),
                path.display()
            );
        }

        Ok(store)
    }

    /// Write the store to `path` as JSON, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> GatewayResult<()> {
        let path = path.as_ref();
        let snapshot = {
            let state = self.state.read();
            Snapshot {
                version: SNAPSHOT_VERSION,
                dimension: state.dimension,
                next_document: state.next_document,
                next_chunk: state.next_chunk,
                next_vector: state.next_vector,
                documents: state.documents.values().cloned().collect(),
                vectors: state.vectors.values().cloned().collect(),
            }
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(&snapshot)
            .map_err(|e| GatewayError::Serialization(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// The embedder shared with the indexer.
    #[must_use]
    pub fn embedder(&self) -> Arc<dyn EmbeddingGenerator> {
        Arc::clone(&self.embedder)
    }

    /// Register a document without chunks and return its id.
    pub fn insert_document(&self, document: NewDocument) -> GatewayResult<DocumentId> {
        let mut state = self.state.write();
        state.next_document += 1;
        let document_id = DocumentId::new(state.next_document)
            .ok_or_else(|| GatewayError::Unavailable("document id space exhausted".into()))?;

        state.documents.insert(
            document_id,
            DocumentRecord {
                document_id,
                filename: document.filename,
                description: document.description,
                owner_id: document.owner_id,
                visibility: document.visibility,
                chunks: Vec::new(),
            },
        );
        Ok(document_id)
    }

    /// Find an owner's document by filename.
    #[must_use]
    pub fn find_document(&self, owner_id: u32, filename: &str) -> Option<DocumentId> {
        self.state
            .read()
            .documents
            .values()
            .find(|doc| doc.owner_id == owner_id && doc.filename == filename)
            .map(|doc| doc.document_id)
    }

    #[must_use]
    pub fn document(&self, document_id: DocumentId) -> Option<DocumentRecord> {
        self.state.read().documents.get(&document_id).cloned()
    }

    /// Replace a document's description and visibility. Returns false when the
    /// document does not exist.
    pub fn update_document(
        &self,
        document_id: DocumentId,
        description: Option<String>,
        visibility: Visibility,
    ) -> bool {
        let mut state = self.state.write();
        let Some(doc) = state.documents.get_mut(&document_id) else {
            return false;
        };
        doc.description = description;
        doc.visibility = visibility;
        true
    }

    /// Store a chunk vector and append the chunk to its document.
    pub fn upsert_chunk(
        &self,
        document_id: DocumentId,
        index: usize,
        content: &str,
        vector: Vec<f32>,
    ) -> GatewayResult<ChunkRecord> {
        let mut state = self.state.write();

        let filename = state
            .documents
            .get(&document_id)
            .map(|doc| doc.filename.clone())
            .ok_or(GatewayError::DocumentNotFound(document_id))?;

        let known = state.dimension;
        match known {
            Some(dimension) => dimension.validate_vector(&vector)?,
            None => state.dimension = Some(VectorDimension::new(vector.len())?),
        }

        state.next_chunk += 1;
        state.next_vector += 1;
        let (chunk_id, vector_id) = ChunkId::new(state.next_chunk)
            .zip(VectorId::new(state.next_vector))
            .ok_or_else(|| GatewayError::Unavailable("chunk id space exhausted".into()))?;

        let record = ChunkRecord {
            chunk_id,
            vector_id,
            index,
            content: content.to_string(),
        };

        state.vectors.insert(
            vector_id,
            StoredVector {
                id: vector_id,
                vector,
                payload: ChunkPayload {
                    document_id,
                    filename,
                    chunk_index: index,
                    document: content.to_string(),
                },
            },
        );
        if let Some(doc) = state.documents.get_mut(&document_id) {
            doc.chunks.push(record.clone());
        }

        Ok(record)
    }

    /// Drop every chunk and vector of a document, keeping the document itself.
    pub fn clear_chunks(&self, document_id: DocumentId) -> usize {
        let mut state = self.state.write();
        let Some(chunks) = state
            .documents
            .get_mut(&document_id)
            .map(|doc| std::mem::take(&mut doc.chunks))
        else {
            return 0;
        };

        for chunk in &chunks {
            state.vectors.remove(&chunk.vector_id);
        }
        chunks.len()
    }

    #[must_use]
    pub fn document_count(&self) -> usize {
        self.state.read().documents.len()
    }

    #[must_use]
    pub fn vector_count(&self) -> usize {
        self.state.read().vectors.len()
    }
}

impl VectorGateway for MemoryVectorStore {
    fn embed(&self, text: &str) -> GatewayResult<Vec<f32>> {
        self.embedder
            .generate_embeddings(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| {
                GatewayError::Vector(VectorError::EmbeddingFailed(
                    "embedder returned no vector".to_string(),
                ))
            })
    }

    fn get_vector(&self, id: VectorId) -> GatewayResult<Option<Vec<f32>>> {
        Ok(self.state.read().vectors.get(&id).map(|v| v.vector.clone()))
    }

    fn nearest_neighbors(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&SearchFilter>,
    ) -> GatewayResult<Vec<Neighbor>> {
        let state = self.state.read();
        if let Some(dimension) = state.dimension {
            dimension.validate_vector(query)?;
        }

        let mut candidates: Vec<(VectorId, Score)> = state
            .vectors
            .par_iter()
            .filter(|(_, stored)| filter.is_none_or(|f| f.matches(&stored.payload)))
            .map(|(id, stored)| (*id, Score::saturating(cosine_similarity(query, &stored.vector))))
            .collect();

        // Highest score first, lower id wins ties
        candidates.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        candidates.truncate(k);

        Ok(candidates
            .into_iter()
            .filter_map(|(id, score)| {
                state.vectors.get(&id).map(|stored| Neighbor {
                    id,
                    score,
                    payload: stored.payload.clone(),
                })
            })
            .collect())
    }
}

impl DocumentSource for MemoryVectorStore {
    fn list_accessible_documents(&self, principal: &Principal) -> GatewayResult<Vec<DocumentRecord>> {
        Ok(self
            .state
            .read()
            .documents
            .values()
            .filter(|doc| doc.is_accessible_by(principal))
            .cloned()
            .collect())
    }
}
