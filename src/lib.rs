/// The main library module for docatlas
pub mod clustering;
pub mod config;
pub mod display;
pub mod documents;
pub mod error;
pub mod logging;
pub mod retrieval;
pub mod vector;

// Explicit exports for better API clarity
pub use clustering::{
    Algorithm, Capabilities, ClusterEngine, ClusterLabel, ClusterMatch, ClusterPoint,
    ClusterRequest, ClusterResult, ClusterStats, ClusterSummary, Granularity, ReductionMethod,
    search_within_cluster,
};
pub use config::Settings;
pub use documents::{
    Chunk, DocumentId, DocumentIndexer, DocumentProcessor, Principal, RecursiveCharacterSplitter,
    Visibility, split_text,
};
pub use error::{
    ClusterError, ClusterOpResult, DocumentError, DocumentResult, GatewayError, GatewayResult,
};
pub use retrieval::{RagAnswer, Retriever, SearchHit};
pub use vector::{
    DocumentSource, EmbeddingGenerator, MemoryVectorStore, VectorFetcher, VectorGateway, VectorId,
};
