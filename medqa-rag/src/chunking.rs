//! Recursive character splitting of documents into overlapping chunks.
//!
//! [`RecursiveChunker`] tries a list of separators in priority order
//! (paragraphs, lines, CJK sentence punctuation, spaces, single characters).
//! It splits on the first separator present in the text, greedily merges the
//! pieces back into windows of at most `chunk_size` characters carrying up to
//! `chunk_overlap` characters of context from the previous window, and
//! recurses with the remaining separators on any piece that is still too
//! large. All lengths are counted in Unicode scalar values.

use std::collections::VecDeque;

use tracing::warn;

use crate::document::{Chunk, Document};

/// Metadata key recording a chunk's position within its document.
pub const CHUNK_INDEX_KEY: &str = "chunk_index";

/// Separators tried in order. The trailing empty string splits into single characters.
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", "。", "！", "？", "；", " ", ""];

/// A strategy for splitting documents into chunks.
///
/// Implementations produce [`Chunk`]s with text and metadata but no embeddings.
/// Embeddings are attached later by the pipeline.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks.
    ///
    /// Returns an empty `Vec` if the document has no non-whitespace text.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;
}

/// Splits text hierarchically by a prioritized separator list.
///
/// # Example
///
/// ```rust,ignore
/// use medqa_rag::RecursiveChunker;
///
/// let chunker = RecursiveChunker::new(500, 50);
/// let pieces = chunker.split_text("高血压是常见病。\n\n糖尿病需要控制血糖。");
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveChunker {
    /// Create a chunker using [`DEFAULT_SEPARATORS`].
    ///
    /// # Arguments
    ///
    /// * `chunk_size` - maximum number of characters per chunk
    /// * `chunk_overlap` - maximum number of characters repeated from the previous chunk
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Replace the separator list.
    pub fn with_separators<I, S>(mut self, separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.separators = separators.into_iter().map(Into::into).collect();
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split raw text into trimmed, non-empty chunk strings.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut separator = separators.last().map(String::as_str).unwrap_or("");
        let mut remaining: &[String] = &[];
        for (i, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                separator = candidate;
                break;
            }
            if text.contains(candidate.as_str()) {
                separator = candidate;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let mut chunks = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();
        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                chunks.extend(self.merge_splits(&fitting));
                fitting.clear();
            }
            if remaining.is_empty() {
                chunks.push(piece.to_string());
            } else {
                chunks.extend(self.split_recursive(piece, remaining));
            }
        }
        if !fitting.is_empty() {
            chunks.extend(self.merge_splits(&fitting));
        }
        chunks
    }

    /// Greedily concatenate pieces into windows, carrying overlap forward.
    fn merge_splits(&self, pieces: &[&str]) -> Vec<String> {
        let mut merged = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size {
                if total > self.chunk_size {
                    warn!(
                        chunk_chars = total,
                        chunk_size = self.chunk_size,
                        "created a chunk longer than the configured size"
                    );
                }
                if !window.is_empty() {
                    if let Some(text) = join_window(&window) {
                        merged.push(text);
                    }
                    while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                        let Some(front) = window.pop_front() else { break };
                        total -= char_len(front);
                    }
                }
            }
            window.push_back(piece);
            total += len;
        }

        if let Some(text) = join_window(&window) {
            merged.push(text);
        }
        merged
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        if document.text.trim().is_empty() {
            return Vec::new();
        }

        self.split_text(&document.text)
            .into_iter()
            .enumerate()
            .map(|(i, text)| {
                let mut metadata = document.metadata.clone();
                metadata.insert(CHUNK_INDEX_KEY.to_string(), i.to_string());
                Chunk {
                    id: format!("{}_{i}", document.id),
                    text,
                    embedding: Vec::new(),
                    metadata,
                    document_id: document.id.clone(),
                }
            })
            .collect()
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn join_window(window: &VecDeque<&str>) -> Option<String> {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Split `text` on `separator`, attaching each separator to the start of the
/// piece that follows it. An empty separator yields single characters.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text.char_indices().map(|(i, c)| &text[i..i + c.len_utf8()]).collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    let mut search_from = 0;
    while let Some(pos) = text[search_from..].find(separator) {
        let at = search_from + pos;
        if at > start {
            pieces.push(&text[start..at]);
        }
        start = at;
        search_from = at + separator.len();
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn doc(text: &str) -> Document {
        Document {
            id: "data/hypertension.txt".to_string(),
            text: text.to_string(),
            metadata: HashMap::from([("source".to_string(), "data/hypertension.txt".to_string())]),
            source_uri: None,
        }
    }

    #[test]
    fn separator_starts_following_piece() {
        assert_eq!(split_keeping_separator("a\n\nb\n\nc", "\n\n"), vec!["a", "\n\nb", "\n\nc"]);
        assert_eq!(split_keeping_separator("\n\nb", "\n\n"), vec!["\n\nb"]);
        assert_eq!(split_keeping_separator("a\n\n\n\nb", "\n\n"), vec!["a", "\n\n", "\n\nb"]);
        assert_eq!(split_keeping_separator("高血", ""), vec!["高", "血"]);
    }

    #[test]
    fn short_text_is_a_single_trimmed_chunk() {
        let chunker = RecursiveChunker::new(500, 50);
        assert_eq!(chunker.split_text("  高血压是常见病  "), vec!["高血压是常见病"]);
    }

    #[test]
    fn paragraphs_split_before_lines() {
        let chunker = RecursiveChunker::new(6, 0);
        assert_eq!(chunker.split_text("aaaa\n\nbbbb"), vec!["aaaa", "bbbb"]);
    }

    #[test]
    fn cjk_sentence_punctuation_is_a_separator() {
        let chunker = RecursiveChunker::new(16, 0);
        let chunks = chunker.split_text("高血压是常见病。需要长期服药。注意低盐饮食。");
        assert_eq!(chunks, vec!["高血压是常见病。需要长期服药", "。注意低盐饮食。"]);
    }

    #[test]
    fn character_fallback_carries_overlap() {
        let chunker = RecursiveChunker::new(4, 2);
        let chunks = chunker.split_text("一二三四五六七八九十");
        assert_eq!(chunks, vec!["一二三四", "三四五六", "五六七八", "七八九十"]);
    }

    #[test]
    fn chunks_inherit_metadata_and_index() {
        let chunker = RecursiveChunker::new(6, 0);
        let chunks = chunker.chunk(&doc("aaaa\n\nbbbb"));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].id, "data/hypertension.txt_1");
        assert_eq!(chunks[1].metadata.get(CHUNK_INDEX_KEY).map(String::as_str), Some("1"));
        assert_eq!(chunks[1].source_filename(), "hypertension.txt");
        assert!(chunks.iter().all(|c| c.embedding.is_empty()));
    }

    #[test]
    fn blank_document_has_no_chunks() {
        let chunker = RecursiveChunker::new(500, 50);
        assert!(chunker.chunk(&doc("")).is_empty());
        assert!(chunker.chunk(&doc(" \n\n ")).is_empty());
    }
}
