//! Recursive, separator-aware text splitting with overlap.
//!
//! The splitter tries separators in priority order (paragraph, line,
//! sentence, word, character), greedily merges the resulting pieces into
//! chunks of at most `chunk_size` characters, and re-splits anything still
//! too large with the remaining, finer separators.
//!
//! # Overlap
//! When a chunk is closed because the next piece does not fit, the next chunk
//! starts with trailing pieces of the closed one. The backward walk stops at
//! the first piece that would push the carried text past `chunk_overlap`, so
//! a trailing piece longer than the budget carries nothing. A closed chunk
//! that fits entirely inside the budget is not carried either. Carried pieces
//! are dropped from the front until the next piece fits, so overlap never
//! pushes a chunk past `chunk_size`.
//!
//! Text made up only of a separator is handed to the finer separators, or
//! emitted whole when none remain.
//!
//! All lengths are counted in `char`s.

use crate::config::{ChunkingConfig, default_separators};

/// Splits text into overlapping chunks. Pure and reentrant.
#[derive(Debug, Clone, PartialEq)]
pub struct RecursiveCharacterSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl Default for RecursiveCharacterSplitter {
    fn default() -> Self {
        Self::from_config(&ChunkingConfig::default())
    }
}

impl RecursiveCharacterSplitter {
    /// Create a splitter with the default separator hierarchy.
    ///
    /// A `chunk_size` of 0 is raised to 1 and an overlap that is not smaller
    /// than the chunk size is dropped, so splitting always makes progress.
    #[must_use]
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        let chunk_overlap = if chunk_overlap >= chunk_size {
            0
        } else {
            chunk_overlap
        };

        Self {
            chunk_size,
            chunk_overlap,
            separators: default_separators(),
        }
    }

    /// Replace the separator hierarchy. An empty list keeps the defaults.
    #[must_use]
    pub fn with_separators<S: AsRef<str>>(mut self, separators: &[S]) -> Self {
        if !separators.is_empty() {
            self.separators = separators.iter().map(|s| s.as_ref().to_string()).collect();
        }
        self
    }

    #[must_use]
    pub fn from_config(config: &ChunkingConfig) -> Self {
        if let Err(reason) = config.validate() {
            tracing::warn!(target: "splitter", "{reason}");
        }
        Self::new(config.chunk_size, config.chunk_overlap).with_separators(&config.separators)
    }

    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    #[must_use]
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into chunks in document order. Empty text yields no chunks.
    #[must_use]
    pub fn split_text(&self, text: &str) -> Vec<String> {
        let chunks = split_recursive(text, &self.separators, self.chunk_size, self.chunk_overlap);
        tracing::debug!(
            target: "splitter",
            "split {} chars into {} chunks (size {}, overlap {})",
            char_len(text),
            chunks.len(),
            self.chunk_size,
            self.chunk_overlap
        );
        chunks
    }
}

/// Split `text` with an explicit configuration.
///
/// Equivalent to building a [`RecursiveCharacterSplitter`] and calling
/// [`RecursiveCharacterSplitter::split_text`].
#[must_use]
pub fn split_text<S: AsRef<str>>(
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
    separators: &[S],
) -> Vec<String> {
    RecursiveCharacterSplitter::new(chunk_size, chunk_overlap)
        .with_separators(separators)
        .split_text(text)
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Pick the first separator present in `text`, plus the finer ones left for
/// recursion. The empty separator always matches and leaves nothing finer.
fn choose_separator<'a>(text: &str, separators: &'a [String]) -> (&'a str, &'a [String]) {
    for (i, separator) in separators.iter().enumerate() {
        if separator.is_empty() {
            return ("", &[]);
        }
        if text.contains(separator.as_str()) {
            return (separator.as_str(), &separators[i + 1..]);
        }
    }
    // Nothing matched: the whole text becomes one piece.
    (separators.last().map_or("", String::as_str), &[])
}

fn split_recursive(
    text: &str,
    separators: &[String],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let (separator, finer) = choose_separator(text, separators);

    let pieces: Vec<&str> = if separator.is_empty() {
        text.char_indices()
            .map(|(start, c)| &text[start..start + c.len_utf8()])
            .collect()
    } else {
        text.split(separator).collect()
    };

    // Text made only of the separator would merge to nothing.
    if pieces.iter().all(|piece| piece.is_empty()) {
        return if finer.is_empty() {
            vec![text.to_string()]
        } else {
            split_recursive(text, finer, chunk_size, chunk_overlap)
        };
    }

    let mut chunks = Vec::new();
    for merged in merge_pieces(&pieces, separator, chunk_size, chunk_overlap) {
        if char_len(&merged) > chunk_size && !finer.is_empty() {
            chunks.extend(split_recursive(&merged, finer, chunk_size, chunk_overlap));
        } else {
            chunks.push(merged);
        }
    }
    chunks
}

/// Greedily merge pieces into chunks, seeding each new chunk with overlap.
fn merge_pieces(
    pieces: &[&str],
    separator: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<String> {
    let separator_len = char_len(separator);
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_len = 0;

    for &piece in pieces {
        let piece_len = char_len(piece);
        let joiner = if current.is_empty() { 0 } else { separator_len };

        if !current.is_empty() && current_len + joiner + piece_len > chunk_size {
            let closed = current.join(separator);
            let closed_len = char_len(&closed);
            if !closed.is_empty() {
                chunks.push(closed);
            }

            current = if closed_len > chunk_overlap {
                overlap_tail(&current, separator_len, chunk_overlap)
            } else {
                Vec::new()
            };
            current_len = joined_len(&current, separator_len);
            while !current.is_empty() && current_len + separator_len + piece_len > chunk_size {
                current.remove(0);
                current_len = joined_len(&current, separator_len);
            }
        }

        current_len += piece_len + if current.is_empty() { 0 } else { separator_len };
        current.push(piece);
    }

    if !current.is_empty() {
        let last = current.join(separator);
        if !last.is_empty() {
            chunks.push(last);
        }
    }

    chunks
}

/// Trailing pieces whose joined length stays within `chunk_overlap`.
fn overlap_tail<'a>(pieces: &[&'a str], separator_len: usize, chunk_overlap: usize) -> Vec<&'a str> {
    let mut taken = 0;
    let mut carried = 0;

    for piece in pieces.iter().rev() {
        let piece_len = char_len(piece);
        if carried + piece_len > chunk_overlap {
            break;
        }
        carried += piece_len + separator_len;
        taken += 1;
    }

    pieces[pieces.len() - taken..].to_vec()
}

fn joined_len(pieces: &[&str], separator_len: usize) -> usize {
    if pieces.is_empty() {
        return 0;
    }
    pieces.iter().map(|p| char_len(p)).sum::<usize>() + separator_len * (pieces.len() - 1)
}
