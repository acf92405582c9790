//! Error types for document processing, vector access and clustering.
//!
//! Each error carries an actionable message, a stable status code for JSON
//! responses and a list of recovery suggestions.

use crate::documents::DocumentId;
use crate::vector::VectorError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the clustering pipeline.
///
/// Only request-level failures live here. Missing vectors and summary
/// problems are logged and skipped instead of being surfaced.
#[derive(Error, Debug)]
pub enum ClusterError {
    /// Unknown algorithm, reduction method or level name, or an unusable parameter.
    #[error("Invalid clustering request: {reason}\nSuggestion: Run 'docatlas capabilities' to list accepted names")]
    InvalidRequest { reason: String },

    /// The algorithm exists but was not compiled into this build.
    #[error("{capability} is not available: {reason}\nSuggestion: Choose another algorithm or rebuild with the required feature")]
    UnavailableCapability { capability: String, reason: String },

    #[error(
        "Vector dimension mismatch: expected {expected}, got {actual}\nSuggestion: Ensure all vectors use the same embedding model"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Vector gateway failed: {0}")]
    Gateway(#[from] GatewayError),
}

impl ClusterError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Get a stable status code for this error type.
    pub fn status_code(&self) -> String {
        match self {
            Self::InvalidRequest { .. } => "INVALID_REQUEST",
            Self::UnavailableCapability { .. } => "UNAVAILABLE_CAPABILITY",
            Self::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
            Self::Gateway(e) => return e.status_code(),
        }
        .to_string()
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::InvalidRequest { .. } => vec![
                "Algorithms: kmeans, hdbscan. Reductions: umap, tsne. Levels: document, chunk",
                "Cluster counts and minimum cluster sizes must be at least 1",
            ],
            Self::UnavailableCapability { .. } => vec![
                "Use 'kmeans' which is always available",
                "Rebuild with default features to enable density clustering",
            ],
            Self::DimensionMismatch { .. } => vec![
                "Re-ingest documents after changing the embedding model",
            ],
            Self::Gateway(e) => e.recovery_suggestions(),
        }
    }
}

/// Errors raised by a vector gateway or document source.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Document {0} not found\nSuggestion: Verify the document was ingested")]
    DocumentNotFound(DocumentId),

    #[error("Vector gateway unavailable: {0}")]
    Unavailable(String),

    #[error(
        "Embedding generation failed: {0}\nSuggestion: Verify the embedding model is properly initialized"
    )]
    Embedding(String),

    #[error("Storage error: {0}\nSuggestion: Check disk space and file permissions")]
    Storage(#[from] std::io::Error),

    #[error(
        "Serialization error: {0}\nSuggestion: Check that the store snapshot is valid and not corrupted"
    )]
    Serialization(String),

    #[error(transparent)]
    Vector(#[from] VectorError),
}

impl GatewayError {
    pub fn status_code(&self) -> String {
        match self {
            Self::DocumentNotFound(_) => "DOCUMENT_NOT_FOUND",
            Self::Unavailable(_) => "GATEWAY_UNAVAILABLE",
            Self::Embedding(_) => "EMBEDDING_FAILED",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Vector(_) => "VECTOR_ERROR",
        }
        .to_string()
    }

    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::Unavailable(_) => vec![
                "Retry the request, transient gateway failures are retried with backoff",
                "Increase fetch.retry_attempts in .docatlas/settings.toml",
            ],
            Self::Storage(_) | Self::Serialization(_) => vec![
                "Delete the store snapshot and run 'docatlas ingest' again",
                "Check disk space and permissions in the data directory",
            ],
            Self::Embedding(_) => vec![
                "Check that the embedding model name in settings.toml is supported",
            ],
            _ => vec![],
        }
    }
}

/// Errors raised while turning files into chunks.
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(
        "Unsupported file type '{file_type}'. Supported types: md, markdown, txt"
    )]
    UnsupportedFileType { file_type: String },

    #[error("Failed to index document: {0}")]
    Gateway(#[from] GatewayError),
}

impl DocumentError {
    pub fn status_code(&self) -> String {
        match self {
            Self::FileRead { .. } => "FILE_READ_ERROR",
            Self::UnsupportedFileType { .. } => "UNSUPPORTED_FILE_TYPE",
            Self::Gateway(e) => return e.status_code(),
        }
        .to_string()
    }

    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::FileRead { .. } => vec![
                "Check that the file exists and you have read permissions",
                "Ensure the file is not locked by another process",
            ],
            Self::UnsupportedFileType { .. } => vec![
                "Extract text from PDF or DOCX files before ingesting them",
            ],
            Self::Gateway(e) => e.recovery_suggestions(),
        }
    }
}

/// Result type alias for clustering operations
pub type ClusterOpResult<T> = Result<T, ClusterError>;

/// Result type alias for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Result type alias for document operations
pub type DocumentResult<T> = Result<T, DocumentError>;
