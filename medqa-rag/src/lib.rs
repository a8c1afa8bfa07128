//! Retrieval for the medical knowledge QA service.
//!
//! This crate provides:
//! - Loading `.txt` knowledge files from a directory tree
//! - Recursive, CJK-aware chunking with overlap
//! - Embedding providers (local BERT behind `local`, Gemini behind `gemini`)
//! - In-memory and file-backed vector stores
//! - The ingestion pipeline and the [`Retriever`] used at query time

pub mod backend;
pub mod chunking;
pub mod config;
pub mod disk;
pub mod document;
pub mod embedding;
pub mod error;
pub mod inmemory;
pub mod loader;
pub mod pipeline;
pub mod retrieval;
pub mod vectorstore;

#[cfg(feature = "gemini")]
pub mod gemini;
#[cfg(feature = "local")]
pub mod local;

pub use backend::{EmbeddingBackend, open_embedding_provider};
pub use chunking::{Chunker, RecursiveChunker};
pub use config::{RagConfig, RagConfigBuilder, SourceDedup};
pub use disk::DiskVectorStore;
pub use document::{Chunk, Document, SearchResult, source_filename};
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result};
pub use inmemory::InMemoryVectorStore;
pub use loader::DirectoryLoader;
pub use pipeline::{IngestReport, RagPipeline, RagPipelineBuilder};
pub use retrieval::{Retrieval, Retriever};
pub use vectorstore::VectorStore;
