//! Turns raw file bytes into plain text and chunks.

use std::borrow::Cow;

use crate::config::ChunkingConfig;
use crate::documents::{Chunk, RecursiveCharacterSplitter};
use crate::error::{DocumentError, DocumentResult};

/// File types read as plain text.
pub const TEXT_FILE_TYPES: &[&str] = &["md", "markdown", "txt"];

/// Decode bytes as UTF-8, falling back to Latin-1.
///
/// Latin-1 maps every byte to a code point, so decoding never fails.
pub fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => {
            tracing::debug!(target: "documents", "input is not UTF-8, decoding as Latin-1");
            Cow::Owned(bytes.iter().map(|&b| char::from(b)).collect())
        }
    }
}

/// Extracts text from supported files and chunks it.
#[derive(Debug, Clone, Default)]
pub struct DocumentProcessor {
    splitter: RecursiveCharacterSplitter,
}

impl DocumentProcessor {
    #[must_use]
    pub fn new(config: &ChunkingConfig) -> Self {
        Self {
            splitter: RecursiveCharacterSplitter::from_config(config),
        }
    }

    /// Whether `file_type` (an extension, without the dot) can be extracted.
    #[must_use]
    pub fn supports(file_type: &str) -> bool {
        TEXT_FILE_TYPES
            .iter()
            .any(|t| t.eq_ignore_ascii_case(file_type))
    }

    /// Plain text of a file. Binary formats such as pdf and docx are rejected.
    pub fn extract_text(&self, bytes: &[u8], file_type: &str) -> DocumentResult<String> {
        if !Self::supports(file_type) {
            return Err(DocumentError::UnsupportedFileType {
                file_type: file_type.to_string(),
            });
        }
        Ok(decode_text(bytes).into_owned())
    }

    /// Split text into chunks with 0-based indices.
    #[must_use]
    pub fn chunk_text(&self, text: &str) -> Vec<Chunk> {
        self.splitter
            .split_text(text)
            .into_iter()
            .enumerate()
            .map(|(index, content)| Chunk { index, content })
            .collect()
    }

    #[must_use]
    pub fn splitter(&self) -> &RecursiveCharacterSplitter {
        &self.splitter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_utf8_and_latin1() {
        assert_eq!(decode_text("héllo".as_bytes()), "héllo");
        // 0xE9 alone is invalid UTF-8 but 'é' in Latin-1
        assert_eq!(decode_text(&[b'c', b'a', b'f', 0xE9]), "café");
    }

    #[test]
    fn test_extract_text_by_type() {
        let processor = DocumentProcessor::default();
        assert_eq!(processor.extract_text(b"# Title", "md").unwrap(), "# Title");
        assert_eq!(processor.extract_text(b"notes", "TXT").unwrap(), "notes");

        let err = processor.extract_text(b"%PDF-1.7", "pdf").unwrap_err();
        assert!(matches!(err, DocumentError::UnsupportedFileType { ref file_type } if file_type == "pdf"));
        assert_eq!(err.status_code(), "UNSUPPORTED_FILE_TYPE");
    }

    #[test]
    fn test_chunk_text_indices() {
        let config = ChunkingConfig {
            chunk_size: 9,
            chunk_overlap: 0,
            ..ChunkingConfig::default()
        };
        let chunks = DocumentProcessor::new(&config).chunk_text("AAAA BBBB CCCC DDDD");

        let indices: Vec<usize> = chunks.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![0, 1]);
        assert_eq!(chunks[0].content, "AAAA BBBB");
        assert!(chunks.iter().all(|c| c.char_len() <= 9));
    }

    #[test]
    fn test_chunk_empty_text() {
        assert!(DocumentProcessor::default().chunk_text("").is_empty());
    }
}
