//! Error types for the `medqa-rag` crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in RAG operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// A source file could not be read or decoded.
    #[error("Failed to load '{}': {message}", path.display())]
    LoadError {
        /// The file or directory that failed.
        path: PathBuf,
        /// A description of the failure.
        message: String,
    },

    /// The source directory produced no documents.
    #[error("No documents found under '{}'", path.display())]
    NoDocuments {
        /// The directory that was scanned.
        path: PathBuf,
    },

    /// An error occurred during embedding generation or model initialisation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    VectorStoreError {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An error in the RAG pipeline orchestration.
    #[error("Pipeline error: {0}")]
    PipelineError(String),
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
