//! Documents, chunking and ingestion.

mod indexer;
mod processor;
mod splitter;
mod types;

pub use indexer::{DocumentIndexer, IndexedDocument, IngestStats};
pub use processor::{DocumentProcessor, TEXT_FILE_TYPES, decode_text};
pub use splitter::{RecursiveCharacterSplitter, split_text};
pub use types::{
    Chunk, ChunkId, ChunkRecord, DocumentId, DocumentRecord, Principal, Visibility,
};
