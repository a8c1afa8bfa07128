//! Turning a user question into prompt context and a list of sources.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::document::SearchResult;
use crate::error::{RagError, Result};
use crate::pipeline::RagPipeline;

/// Context text and the source file of each chunk it was built from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Retrieval {
    /// Retrieved chunks, each headed by `[文档{n}：{file}]`, separated by a blank line.
    pub context: String,
    /// Source file names in result order, duplicates included.
    pub sources: Vec<String>,
}

impl Retrieval {
    pub fn is_empty(&self) -> bool {
        self.context.is_empty()
    }

    /// Sources with duplicates removed, keeping first-seen order.
    pub fn unique_sources(&self) -> Vec<String> {
        let mut unique: Vec<String> = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            if !unique.contains(source) {
                unique.push(source.clone());
            }
        }
        unique
    }

    fn from_results(results: &[SearchResult]) -> Self {
        let sources: Vec<String> = results.iter().map(|r| r.chunk.source_filename()).collect();
        let context = results
            .iter()
            .zip(&sources)
            .enumerate()
            .map(|(i, (result, source))| format!("[文档{}：{source}]\n{}", i + 1, result.chunk.text))
            .collect::<Vec<_>>()
            .join("\n\n");
        Self { context, sources }
    }
}

/// Retrieval over one collection, or nothing at all when no knowledge base
/// is available.
///
/// A disabled retriever answers every query with an empty [`Retrieval`], and
/// so does an enabled one whose lookup fails; callers then fall back to
/// answering from general knowledge.
pub struct Retriever {
    pipeline: Option<Arc<RagPipeline>>,
    collection: String,
}

impl Retriever {
    /// A retriever with no knowledge base.
    pub fn disabled() -> Self {
        Self { pipeline: None, collection: String::new() }
    }

    pub fn new(pipeline: Arc<RagPipeline>, collection: impl Into<String>) -> Self {
        Self { pipeline: Some(pipeline), collection: collection.into() }
    }

    pub fn is_loaded(&self) -> bool {
        self.pipeline.is_some()
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Look up context for `query`. Never fails.
    pub async fn retrieve(&self, query: &str) -> Retrieval {
        let Some(pipeline) = &self.pipeline else {
            return Retrieval::default();
        };
        match pipeline.query(&self.collection, query).await {
            Ok(results) => {
                debug!(collection = %self.collection, result_count = results.len(), "retrieved context");
                Retrieval::from_results(&results)
            }
            Err(e) => {
                warn!(collection = %self.collection, error = %e, "retrieval failed, answering without context");
                Retrieval::default()
            }
        }
    }

    /// Raw top-k matches for diagnostics.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] when no knowledge base is loaded, or
    /// the underlying pipeline error.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let pipeline = self
            .pipeline
            .as_ref()
            .ok_or_else(|| RagError::ConfigError("knowledge base is not loaded".to_string()))?;
        pipeline.query(&self.collection, query).await
    }
}
