//! RAG pipeline orchestrator.
//!
//! The [`RagPipeline`] coordinates ingestion and querying by composing an
//! [`EmbeddingProvider`], a [`VectorStore`] and a [`Chunker`].
//!
//! # Example
//!
//! ```rust,ignore
//! use medqa_rag::{RagPipeline, RagConfig, DiskVectorStore, RecursiveChunker};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(provider)
//!     .vector_store(Arc::new(DiskVectorStore::open("./vector_store").await?))
//!     .chunker(Arc::new(RecursiveChunker::new(500, 50)))
//!     .build()?;
//!
//! let report = pipeline.rebuild_collection("medical_knowledge", &documents).await?;
//! let results = pipeline.query("medical_knowledge", "高血压注意事项").await?;
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{error, info};

use crate::chunking::Chunker;
use crate::config::{RagConfig, SourceDedup};
use crate::document::{Chunk, Document, SearchResult};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::vectorstore::VectorStore;

/// Number of chunk texts sent to the embedding provider at once.
const EMBED_BATCH_SIZE: usize = 32;

/// Outcome of [`RagPipeline::rebuild_collection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
    pub dimensions: usize,
}

/// The RAG pipeline orchestrator.
///
/// Coordinates document ingestion (chunk → embed → store) and query
/// execution (embed → search → filter). Construct one via
/// [`RagPipeline::builder()`].
pub struct RagPipeline {
    config: RagConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    chunker: Arc<dyn Chunker>,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the embedding provider.
    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding_provider
    }

    /// Return a reference to the vector store.
    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.vector_store
    }

    /// Create a named collection in the vector store.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PipelineError`] if the vector store operation fails.
    pub async fn create_collection(&self, name: &str) -> Result<()> {
        let dimensions = self.embedding_provider.dimensions();
        self.vector_store.create_collection(name, dimensions).await.map_err(|e| {
            error!(collection = name, error = %e, "failed to create collection");
            RagError::PipelineError(format!("failed to create collection '{name}': {e}"))
        })
    }

    /// Delete a named collection from the vector store.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PipelineError`] if the vector store operation fails.
    pub async fn delete_collection(&self, name: &str) -> Result<()> {
        self.vector_store.delete_collection(name).await.map_err(|e| {
            error!(collection = name, error = %e, "failed to delete collection");
            RagError::PipelineError(format!("failed to delete collection '{name}': {e}"))
        })
    }

    /// Split documents into chunks without embedding them.
    pub fn chunk_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        documents.iter().flat_map(|document| self.chunker.chunk(document)).collect()
    }

    /// Attach embeddings to `chunks`, batching requests to the provider.
    async fn embed_chunks(&self, chunks: &mut [Chunk]) -> Result<()> {
        for batch in chunks.chunks_mut(EMBED_BATCH_SIZE) {
            let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
            let embeddings = self.embedding_provider.embed_batch(&texts).await?;
            if embeddings.len() != batch.len() {
                return Err(RagError::PipelineError(format!(
                    "embedding provider returned {} vectors for {} chunks",
                    embeddings.len(),
                    batch.len()
                )));
            }
            for (chunk, embedding) in batch.iter_mut().zip(embeddings) {
                chunk.embedding = embedding;
            }
        }
        Ok(())
    }

    /// Ingest a single document: chunk → embed → store.
    ///
    /// Returns the chunks that were stored (with embeddings attached).
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PipelineError`] if embedding or storage fails,
    /// including the document ID in the error message.
    pub async fn ingest(&self, collection: &str, document: &Document) -> Result<Vec<Chunk>> {
        let mut chunks = self.chunker.chunk(document);
        if chunks.is_empty() {
            info!(document.id = %document.id, chunk_count = 0, "ingested document (empty)");
            return Ok(chunks);
        }

        self.embed_chunks(&mut chunks).await.map_err(|e| {
            error!(document.id = %document.id, error = %e, "embedding failed during ingestion");
            RagError::PipelineError(format!("embedding failed for document '{}': {e}", document.id))
        })?;

        self.vector_store.upsert(collection, &chunks).await.map_err(|e| {
            error!(document.id = %document.id, error = %e, "upsert failed during ingestion");
            RagError::PipelineError(format!("upsert failed for document '{}': {e}", document.id))
        })?;

        info!(document.id = %document.id, chunk_count = chunks.len(), "ingested document");
        Ok(chunks)
    }

    /// Ingest multiple documents into an existing collection.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PipelineError`] on the first document that fails.
    pub async fn ingest_batch(
        &self,
        collection: &str,
        documents: &[Document],
    ) -> Result<Vec<Chunk>> {
        let mut all_chunks = Vec::new();
        for document in documents {
            let chunks = self.ingest(collection, document).await?;
            all_chunks.extend(chunks);
        }
        Ok(all_chunks)
    }

    /// Replace the whole collection with the chunks of `documents`.
    ///
    /// Everything is chunked and embedded before the store is touched, so a
    /// failure leaves the previous collection in place. Re-running on the
    /// same documents yields the same record count.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PipelineError`] if no chunks were produced or
    /// embedding or storage fails.
    pub async fn rebuild_collection(
        &self,
        collection: &str,
        documents: &[Document],
    ) -> Result<IngestReport> {
        let mut chunks = self.chunk_documents(documents);
        if chunks.is_empty() {
            return Err(RagError::PipelineError(format!(
                "no chunks produced from {} documents",
                documents.len()
            )));
        }
        info!(collection, document_count = documents.len(), chunk_count = chunks.len(), "chunked documents");

        self.embed_chunks(&mut chunks).await.map_err(|e| {
            error!(collection, error = %e, "embedding failed during rebuild");
            RagError::PipelineError(format!("embedding failed: {e}"))
        })?;

        let dimensions = chunks
            .first()
            .map(|c| c.embedding.len())
            .unwrap_or_else(|| self.embedding_provider.dimensions());

        self.vector_store.replace_collection(collection, dimensions, &chunks).await.map_err(|e| {
            error!(collection, error = %e, "failed to replace collection");
            RagError::PipelineError(format!("failed to replace collection '{collection}': {e}"))
        })?;

        info!(collection, chunk_count = chunks.len(), dimensions, "rebuilt collection");
        Ok(IngestReport { documents: documents.len(), chunks: chunks.len(), dimensions })
    }

    /// Query the pipeline: embed → search → filter by threshold.
    ///
    /// Returns at most `top_k` results ordered by descending score. With
    /// [`SourceDedup::BeforeTopK`] only the best hit per source file is kept.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PipelineError`] if embedding or search fails.
    pub async fn query(&self, collection: &str, query: &str) -> Result<Vec<SearchResult>> {
        let query_embedding = self.embedding_provider.embed(query).await.map_err(|e| {
            error!(error = %e, "embedding failed during query");
            RagError::PipelineError(format!("query embedding failed: {e}"))
        })?;

        let top_k = self.config.top_k;
        let fetch = match self.config.source_dedup {
            SourceDedup::AtRender => top_k,
            SourceDedup::BeforeTopK => self
                .vector_store
                .count(collection)
                .await
                .map_err(|e| RagError::PipelineError(format!("count failed: {e}")))?
                .max(top_k),
        };

        let results =
            self.vector_store.search(collection, &query_embedding, fetch).await.map_err(|e| {
                error!(collection, error = %e, "vector store search failed");
                RagError::PipelineError(format!("search failed in collection '{collection}': {e}"))
            })?;

        let threshold = self.config.similarity_threshold;
        let mut seen = HashSet::new();
        let filtered: Vec<SearchResult> = results
            .into_iter()
            .filter(|r| threshold.is_none_or(|min| r.score >= min))
            .filter(|r| match self.config.source_dedup {
                SourceDedup::AtRender => true,
                SourceDedup::BeforeTopK => seen.insert(r.chunk.source_filename()),
            })
            .take(top_k)
            .collect();

        info!(result_count = filtered.len(), "query completed");
        Ok(filtered)
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// All fields are required. Call [`build()`](RagPipelineBuilder::build)
/// to validate and produce the pipeline.
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    chunker: Option<Arc<dyn Chunker>>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the vector store backend.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Set the document chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Build the [`RagPipeline`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if any required field is missing.
    pub fn build(self) -> Result<RagPipeline> {
        let config =
            self.config.ok_or_else(|| RagError::ConfigError("config is required".to_string()))?;
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::ConfigError("embedding_provider is required".to_string()))?;
        let vector_store = self
            .vector_store
            .ok_or_else(|| RagError::ConfigError("vector_store is required".to_string()))?;
        let chunker =
            self.chunker.ok_or_else(|| RagError::ConfigError("chunker is required".to_string()))?;

        Ok(RagPipeline { config, embedding_provider, vector_store, chunker })
    }
}
