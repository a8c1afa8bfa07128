//! Gemini embedding provider using the `medqa-gemini` crate.
//!
//! This module is only available when the `gemini` feature is enabled.

use async_trait::async_trait;
use tracing::{debug, error};

use medqa_gemini::{EmbedBuilder, Gemini, Model, TaskType};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

const PROVIDER: &str = "gemini";

fn request_error(e: medqa_gemini::Error) -> RagError {
    error!(provider = PROVIDER, error = %e, "embedding request failed");
    RagError::EmbeddingError { provider: PROVIDER.into(), message: e.to_string() }
}

/// An [`EmbeddingProvider`] backed by the Gemini embedding API.
///
/// Single-text calls are treated as search queries and batch calls as
/// documents being indexed, matching how the pipeline uses them.
pub struct GeminiEmbeddingProvider {
    client: Gemini,
    output_dimensionality: Option<i32>,
    dimensions: usize,
}

impl GeminiEmbeddingProvider {
    /// Default embedding dimensions for `text-embedding-004`.
    const DEFAULT_DIMENSIONS: usize = 768;

    /// Create a provider for `text-embedding-004` using the given API key.
    pub fn new(api_key: impl AsRef<str>) -> Result<Self> {
        let client = Gemini::with_model(api_key, Model::TextEmbedding004).map_err(|e| {
            RagError::EmbeddingError {
                provider: PROVIDER.into(),
                message: format!("failed to create Gemini client: {e}"),
            }
        })?;
        Ok(Self::from_client(client))
    }

    /// Create a provider from an existing [`Gemini`] client, e.g. one built
    /// with a proxy or a different embedding model.
    pub fn from_client(client: Gemini) -> Self {
        let dimensions = match client.model() {
            Model::GeminiEmbedding001 => 3072,
            _ => Self::DEFAULT_DIMENSIONS,
        };
        Self { client, output_dimensionality: None, dimensions }
    }

    /// Truncate output vectors to `dims` values.
    pub fn with_output_dimensionality(mut self, dims: i32) -> Self {
        self.output_dimensionality = Some(dims);
        self.dimensions = dims.max(0) as usize;
        self
    }

    fn embed_builder(&self, task_type: TaskType) -> EmbedBuilder {
        let builder = self.client.embed_content().with_task_type(task_type);
        match self.output_dimensionality {
            Some(dims) => builder.with_output_dimensionality(dims),
            None => builder,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = PROVIDER, text_len = text.len(), "embedding query");
        let response = self
            .embed_builder(TaskType::RetrievalQuery)
            .with_text(text)
            .execute()
            .await
            .map_err(request_error)?;
        Ok(response.embedding.values)
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(provider = PROVIDER, batch_size = texts.len(), "embedding documents");

        let response = self
            .embed_builder(TaskType::RetrievalDocument)
            .with_chunks(texts.iter().map(|t| t.to_string()).collect())
            .execute_batch()
            .await
            .map_err(request_error)?;

        if response.embeddings.len() != texts.len() {
            return Err(RagError::EmbeddingError {
                provider: PROVIDER.into(),
                message: format!(
                    "expected {} embeddings, received {}",
                    texts.len(),
                    response.embeddings.len()
                ),
            });
        }
        Ok(response.embeddings.into_iter().map(|e| e.values).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}
