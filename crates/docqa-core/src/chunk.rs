//! Recursive, overlap-aware text chunker.
//!
//! Splits document text into [`Chunk`]s no longer than `chunk_size`
//! characters, with consecutive chunks sharing at most `chunk_overlap`
//! characters. Splitting prefers the coarsest boundary that works:
//! paragraphs, then lines, then sentences, then words, and finally
//! single characters.
//!
//! # Algorithm
//!
//! 1. Pick the first separator from [`SEPARATORS`] that occurs in the text.
//! 2. Cut the text into contiguous pieces after each separator occurrence,
//!    so the pieces tile the text exactly.
//! 3. Merge runs of pieces that fit into windows of at most `chunk_size`
//!    characters. When a window is flushed, its trailing pieces totalling at
//!    most `chunk_overlap` characters start the next window.
//! 4. Recurse into any piece still longer than `chunk_size` with the
//!    remaining, finer separators.
//! 5. Trim each window and drop the ones that are only whitespace.
//!
//! Every window is a byte range of the original text, so chunk offsets are
//! exact even when the same passage appears twice in a document.
//!
//! # Example
//!
//! ```rust
//! use docqa_core::chunk::ChunkSplitter;
//!
//! let splitter = ChunkSplitter::new(1000, 200).unwrap();
//! let spans = splitter.split("Hello world.\n\nSecond paragraph.").unwrap();
//! assert_eq!(spans.len(), 1);
//! assert_eq!(spans[0].start, 0);
//! ```

use std::collections::VecDeque;

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::ChunkError;
use crate::models::{Chunk, ChunkMetadata};

/// Separators in priority order. The empty separator splits into characters.
pub const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "! ", "? ", " ", ""];

/// Form feed, emitted between pages by PDF text extraction.
const PAGE_BREAK: char = '\u{c}';

/// A trimmed window of the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpan {
    pub text: String,
    /// Byte offset of the first character.
    pub start: usize,
    /// Byte offset one past the last character.
    pub end: usize,
}

/// A contiguous byte range with its length in characters.
#[derive(Debug, Clone, Copy)]
struct Piece {
    start: usize,
    end: usize,
    chars: usize,
}

impl Piece {
    fn new(text: &str, start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            chars: text[start..end].chars().count(),
        }
    }
}

/// Splits text into size-bounded, overlapping spans.
#[derive(Debug, Clone)]
pub struct ChunkSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl ChunkSplitter {
    /// Create a splitter. Sizes are in characters.
    ///
    /// # Errors
    ///
    /// [`ChunkError::InvalidParameters`] if `chunk_size` is zero or
    /// `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ChunkError> {
        if chunk_size == 0 || chunk_overlap >= chunk_size {
            return Err(ChunkError::InvalidParameters {
                chunk_size,
                chunk_overlap,
            });
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into ordered spans.
    ///
    /// # Guarantees
    ///
    /// - Every span is at most `chunk_size` characters.
    /// - Adjacent spans share at most `chunk_overlap` characters.
    /// - `&text[span.start..span.end] == span.text`.
    ///
    /// # Errors
    ///
    /// [`ChunkError::EmptyInput`] if `text` is empty or only whitespace.
    pub fn split(&self, text: &str) -> Result<Vec<TextSpan>, ChunkError> {
        if text.trim().is_empty() {
            return Err(ChunkError::EmptyInput);
        }

        let mut windows = Vec::new();
        self.split_range(text, 0, text.len(), SEPARATORS, &mut windows);

        Ok(windows
            .into_iter()
            .filter_map(|(start, end)| trim_span(text, start, end))
            .collect())
    }

    fn split_range(
        &self,
        text: &str,
        start: usize,
        end: usize,
        separators: &[&str],
        out: &mut Vec<(usize, usize)>,
    ) {
        let slice = &text[start..end];

        let mut level = 0;
        while level + 1 < separators.len() && !slice.contains(separators[level]) {
            level += 1;
        }
        let separator = separators.get(level).copied().unwrap_or("");
        let finer = separators.get(level + 1..).unwrap_or(&[]);

        let mut fitting: Vec<Piece> = Vec::new();
        for piece in cut_pieces(text, start, end, separator) {
            if piece.chars <= self.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                self.merge(&fitting, out);
                fitting.clear();
            }
            if finer.is_empty() {
                // Only reachable with a non-empty last separator; cut by characters.
                self.split_range(text, piece.start, piece.end, &[""], out);
            } else {
                self.split_range(text, piece.start, piece.end, finer, out);
            }
        }
        if !fitting.is_empty() {
            self.merge(&fitting, out);
        }
    }

    /// Greedily pack contiguous pieces into windows, carrying an overlap tail.
    fn merge(&self, pieces: &[Piece], out: &mut Vec<(usize, usize)>) {
        let mut window: VecDeque<Piece> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            if total + piece.chars > self.chunk_size {
                if let (Some(first), Some(last)) = (window.front(), window.back()) {
                    out.push((first.start, last.end));
                }
                while total > self.chunk_overlap
                    || (total > 0 && total + piece.chars > self.chunk_size)
                {
                    match window.pop_front() {
                        Some(dropped) => total -= dropped.chars,
                        None => break,
                    }
                }
            }
            window.push_back(piece);
            total += piece.chars;
        }

        if let (Some(first), Some(last)) = (window.front(), window.back()) {
            out.push((first.start, last.end));
        }
    }
}

/// Cut `text[start..end]` after every occurrence of `separator`.
fn cut_pieces(text: &str, start: usize, end: usize, separator: &str) -> Vec<Piece> {
    let slice = &text[start..end];

    if separator.is_empty() {
        return slice
            .char_indices()
            .map(|(i, c)| Piece {
                start: start + i,
                end: start + i + c.len_utf8(),
                chars: 1,
            })
            .collect();
    }

    let mut pieces = Vec::new();
    let mut cursor = 0;
    for (idx, _) in slice.match_indices(separator) {
        let piece_end = idx + separator.len();
        pieces.push(Piece::new(text, start + cursor, start + piece_end));
        cursor = piece_end;
    }
    if cursor < slice.len() {
        pieces.push(Piece::new(text, start + cursor, end));
    }
    pieces
}

fn trim_span(text: &str, start: usize, end: usize) -> Option<TextSpan> {
    let slice = &text[start..end];
    let trimmed = slice.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lead = slice.len() - slice.trim_start().len();
    let start = start + lead;
    Some(TextSpan {
        text: trimmed.to_string(),
        start,
        end: start + trimmed.len(),
    })
}

/// Split a document's text and wrap each span as a [`Chunk`].
///
/// Chunk IDs are UUIDv5 values derived from `document_id` and the chunk's
/// index, so re-chunking the same document reproduces the same IDs.
pub fn chunk_document(
    document_id: &str,
    source_name: &str,
    text: &str,
    splitter: &ChunkSplitter,
) -> Result<Vec<Chunk>, ChunkError> {
    let spans = splitter.split(text)?;
    let page_breaks: Vec<usize> = text
        .char_indices()
        .filter(|(_, c)| *c == PAGE_BREAK)
        .map(|(i, _)| i)
        .collect();

    Ok(spans
        .into_iter()
        .enumerate()
        .map(|(index, span)| {
            let page = if page_breaks.is_empty() {
                None
            } else {
                Some(page_breaks.partition_point(|&b| b < span.start) as u32 + 1)
            };
            make_chunk(document_id, source_name, index, span, page)
        })
        .collect())
}

/// Deterministic chunk ID for `(document_id, index)`.
pub fn chunk_id(document_id: &str, index: usize) -> String {
    let name = format!("{}:{}", document_id, index);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}

fn make_chunk(
    document_id: &str,
    source_name: &str,
    index: usize,
    span: TextSpan,
    page: Option<u32>,
) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(span.text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: chunk_id(document_id, index),
        content: span.text,
        hash,
        metadata: ChunkMetadata {
            source_document_id: document_id.to_string(),
            source_name: source_name.to_string(),
            chunk_index: index,
            start_offset: span.start,
            end_offset: span.end,
            page,
        },
    }
}
