//! crates/study_assistant_core/src/splitter.rs
//!
//! Recursive character splitting of page text into overlapping chunks.
//!
//! The text is cut on the coarsest separator present (paragraphs, then lines,
//! then words, then single characters). Pieces that still exceed the chunk size
//! are split again with the next separator, and small neighbouring pieces are
//! merged back together up to the chunk size, carrying a tail of at most
//! `chunk_overlap` characters into the following chunk. All lengths are counted
//! in characters.

use crate::domain::{Chunk, PageText};
use crate::domain::ChunkMetadata;

pub const DEFAULT_CHUNK_SIZE: usize = 1500;
pub const DEFAULT_CHUNK_OVERLAP: usize = 300;

const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone)]
pub struct RecursiveCharacterSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl Default for RecursiveCharacterSplitter {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)
    }
}

impl RecursiveCharacterSplitter {
    /// Creates a splitter. The overlap is clamped below the chunk size.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Splits raw text into trimmed, non-empty chunks.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    /// Splits every page of a document, tagging each chunk with the page's metadata.
    pub fn split_pages(&self, filename: &str, pages: &[PageText]) -> Vec<Chunk> {
        pages
            .iter()
            .flat_map(|page| {
                let metadata = ChunkMetadata::for_page(filename, page.page_number);
                self.split_text(&page.text)
                    .into_iter()
                    .map(move |text| Chunk {
                        text,
                        metadata: metadata.clone(),
                    })
            })
            .collect()
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut final_chunks = Vec::new();

        // Pick the first separator that actually occurs; "" always matches.
        let mut separator = "";
        let mut remaining: &[String] = &[];
        for (i, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                separator = "";
                break;
            }
            if text.contains(candidate.as_str()) {
                separator = candidate;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let mut good_splits: Vec<&str> = Vec::new();
        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                good_splits.push(piece);
                continue;
            }
            if !good_splits.is_empty() {
                final_chunks.extend(self.merge_splits(&good_splits));
                good_splits.clear();
            }
            if remaining.is_empty() {
                if let Some(chunk) = trimmed_non_empty(piece) {
                    final_chunks.push(chunk);
                }
            } else {
                final_chunks.extend(self.split_recursive(piece, remaining));
            }
        }
        if !good_splits.is_empty() {
            final_chunks.extend(self.merge_splits(&good_splits));
        }
        final_chunks
    }

    /// Greedily packs pieces into chunks of at most `chunk_size` characters.
    /// Pieces already carry their separator, so they are joined directly.
    fn merge_splits(&self, splits: &[&str]) -> Vec<String> {
        let mut docs = Vec::new();
        let mut current: Vec<(&str, usize)> = Vec::new();
        let mut total = 0usize;

        for &piece in splits {
            let len = char_len(piece);
            if total + len > self.chunk_size && !current.is_empty() {
                if let Some(doc) = join_trimmed(&current) {
                    docs.push(doc);
                }
                // Drop leading pieces until what is left fits as overlap.
                while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                    let (_, first_len) = current.remove(0);
                    total -= first_len;
                }
            }
            current.push((piece, len));
            total += len;
        }

        if let Some(doc) = join_trimmed(&current) {
            docs.push(doc);
        }
        docs
    }
}

/// Splits on `separator`, attaching each separator to the start of the piece
/// that follows it. An empty separator splits into single characters.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            pieces.push(&text[start..idx]);
        }
        start = idx;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces.retain(|p| !p.is_empty());
    pieces
}

fn join_trimmed(pieces: &[(&str, usize)]) -> Option<String> {
    let joined: String = pieces.iter().map(|(p, _)| *p).collect();
    trimmed_non_empty(&joined)
}

fn trimmed_non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
