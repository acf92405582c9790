//! Vector storage, lookup and similarity search.
//!
//! Everything above this module talks to vectors through the
//! [`VectorGateway`] and [`DocumentSource`] traits. [`MemoryVectorStore`] is
//! the bundled implementation, persisted as a JSON snapshot in the data
//! directory. [`VectorFetcher`] performs bounded-concurrency batch lookups.

mod embedding;
mod fetch;
mod gateway;
mod memory;
mod similarity;
mod types;

#[cfg(test)]
pub use embedding::MockEmbeddingGenerator;
pub use embedding::{EmbeddingGenerator, FastEmbedGenerator, parse_embedding_model};
pub use fetch::{FetchOutcome, VectorFetcher};
pub use gateway::{ChunkPayload, DocumentSource, Neighbor, SearchFilter, VectorGateway};
pub use memory::{MemoryVectorStore, NewDocument};
pub(crate) use similarity::EPSILON;
pub use similarity::{
    cosine_distance, cosine_similarity, euclidean, mean_vector, normalize_vector,
    normalize_vector_copy, squared_euclidean,
};
pub use types::{Score, VECTOR_DIMENSION_384, VectorDimension, VectorError, VectorId};
