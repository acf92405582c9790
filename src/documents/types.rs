//! Identifiers and records describing ingested documents and their chunks.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;

use crate::vector::VectorId;

/// Type-safe wrapper for document IDs.
///
/// IDs are never zero so a default-initialised value is never mistaken for
/// a real document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(NonZeroU32);

impl DocumentId {
    /// Returns `None` if the provided ID is zero.
    #[must_use]
    pub fn new(id: u32) -> Option<Self> {
        NonZeroU32::new(id).map(Self)
    }

    #[must_use]
    pub fn get(&self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type-safe wrapper for chunk IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(NonZeroU32);

impl ChunkId {
    #[must_use]
    pub fn new(id: u32) -> Option<Self> {
        NonZeroU32::new(id).map(Self)
    }

    #[must_use]
    pub fn get(&self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One bounded slice of a document's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// 0-based position within the document
    pub index: usize,
    pub content: String,
}

impl Chunk {
    /// Length in characters, the unit the splitter measures in.
    #[must_use]
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// Who may see a document besides its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    Public,
}

/// The caller on whose behalf documents are listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: u32,
}

impl Principal {
    #[must_use]
    pub const fn new(user_id: u32) -> Self {
        Self { user_id }
    }
}

/// A stored chunk and the vector that embeds it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub chunk_id: ChunkId,
    pub vector_id: VectorId,
    pub index: usize,
    /// Full chunk text. Consumers trim it to a preview as needed.
    pub content: String,
}

/// A document as seen by a document source, with its chunks in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub document_id: DocumentId,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub owner_id: u32,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub chunks: Vec<ChunkRecord>,
}

impl DocumentRecord {
    /// Owners see their documents, everyone sees public ones.
    #[must_use]
    pub fn is_accessible_by(&self, principal: &Principal) -> bool {
        self.owner_id == principal.user_id || self.visibility == Visibility::Public
    }
}
