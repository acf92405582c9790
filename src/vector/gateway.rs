//! Capabilities the clustering and retrieval code depends on.
//!
//! Both traits are injected at construction time. [`VectorGateway`] owns
//! embeddings and nearest-neighbour search. [`DocumentSource`] enumerates the
//! documents a principal may see; access control happens entirely there.

use serde::{Deserialize, Serialize};

use crate::documents::{DocumentId, DocumentRecord, Principal};
use crate::error::GatewayResult;
use crate::vector::{Score, VectorId};

/// Payload stored next to each chunk vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub document_id: DocumentId,
    pub filename: String,
    pub chunk_index: usize,
    /// The chunk text itself
    pub document: String,
}

/// One nearest-neighbour hit.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub id: VectorId,
    pub score: Score,
    pub payload: ChunkPayload,
}

/// Restricts a nearest-neighbour search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilter {
    /// Only consider chunks of these documents
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_ids: Option<Vec<DocumentId>>,

    /// Only consider chunks whose filename contains this text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename_contains: Option<String>,
}

impl SearchFilter {
    #[must_use]
    pub fn documents(ids: impl IntoIterator<Item = DocumentId>) -> Self {
        Self {
            document_ids: Some(ids.into_iter().collect()),
            filename_contains: None,
        }
    }

    /// Whether a payload passes every condition of the filter.
    #[must_use]
    pub fn matches(&self, payload: &ChunkPayload) -> bool {
        let document_ok = self
            .document_ids
            .as_ref()
            .is_none_or(|ids| ids.contains(&payload.document_id));
        let filename_ok = self
            .filename_contains
            .as_ref()
            .is_none_or(|needle| payload.filename.contains(needle.as_str()));
        document_ok && filename_ok
    }
}

/// Embedding, lookup and similarity search over stored chunk vectors.
pub trait VectorGateway: Send + Sync {
    /// Embed a single text with the same model used at indexing time.
    fn embed(&self, text: &str) -> GatewayResult<Vec<f32>>;

    /// Look up a stored vector. `Ok(None)` means the id is unknown.
    fn get_vector(&self, id: VectorId) -> GatewayResult<Option<Vec<f32>>>;

    /// The `k` most similar stored vectors, best first.
    fn nearest_neighbors(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&SearchFilter>,
    ) -> GatewayResult<Vec<Neighbor>>;
}

/// Lists documents, with their chunks, visible to a principal.
pub trait DocumentSource: Send + Sync {
    fn list_accessible_documents(&self, principal: &Principal) -> GatewayResult<Vec<DocumentRecord>>;
}
