//! Data types for documents, chunks, and search results.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Metadata key holding the path of the file a document was loaded from.
pub const SOURCE_KEY: &str = "source";

/// Label used when a chunk carries no source metadata.
pub const UNKNOWN_SOURCE: &str = "未知来源";

/// A source document containing text content and metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique identifier for the document.
    pub id: String,
    /// The text content of the document.
    pub text: String,
    /// Key-value metadata associated with the document.
    pub metadata: HashMap<String, String>,
    /// Optional URI pointing to the original source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,
}

/// A segment of a [`Document`] with its vector embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique identifier for the chunk.
    pub id: String,
    /// The text content of the chunk.
    pub text: String,
    /// The vector embedding for this chunk's text.
    pub embedding: Vec<f32>,
    /// Key-value metadata inherited from the parent document plus chunk-specific fields.
    pub metadata: HashMap<String, String>,
    /// The ID of the parent [`Document`].
    pub document_id: String,
}

impl Chunk {
    /// File name of the document this chunk came from.
    pub fn source_filename(&self) -> String {
        source_filename(&self.metadata)
    }
}

/// A retrieved [`Chunk`] paired with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// The similarity score (higher is more relevant).
    pub score: f32,
}

/// Base name of the `source` metadata entry, or [`UNKNOWN_SOURCE`].
pub fn source_filename(metadata: &HashMap<String, String>) -> String {
    metadata
        .get(SOURCE_KEY)
        .map(|source| {
            Path::new(source)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| source.clone())
        })
        .unwrap_or_else(|| UNKNOWN_SOURCE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_filename_strips_directories() {
        let metadata = HashMap::from([(SOURCE_KEY.to_string(), "data/心血管/hypertension.txt".to_string())]);
        assert_eq!(source_filename(&metadata), "hypertension.txt");
    }

    #[test]
    fn missing_source_uses_placeholder() {
        assert_eq!(source_filename(&HashMap::new()), UNKNOWN_SOURCE);
    }
}
