//! Text embedding requests.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::client::{Error, GeminiClient};
use crate::models::Content;

/// Intended downstream use of an embedding; lets the service tune the vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    RetrievalQuery,
    RetrievalDocument,
    SemanticSimilarity,
    Classification,
    Clustering,
    QuestionAnswering,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedContentRequest {
    pub model: String,
    pub content: Content,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_type: Option<TaskType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dimensionality: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchEmbedContentsRequest {
    pub requests: Vec<EmbedContentRequest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentEmbedding {
    pub values: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentEmbeddingResponse {
    pub embedding: ContentEmbedding,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchContentEmbeddingResponse {
    #[serde(default)]
    pub embeddings: Vec<ContentEmbedding>,
}

/// Fluent builder for `embedContent` / `batchEmbedContents`.
pub struct EmbedBuilder {
    client: Arc<GeminiClient>,
    chunks: Vec<String>,
    task_type: Option<TaskType>,
    title: Option<String>,
    output_dimensionality: Option<i32>,
}

impl EmbedBuilder {
    pub(crate) fn new(client: Arc<GeminiClient>) -> Self {
        Self { client, chunks: Vec::new(), task_type: None, title: None, output_dimensionality: None }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.chunks.push(text.into());
        self
    }

    pub fn with_chunks(mut self, chunks: Vec<String>) -> Self {
        self.chunks.extend(chunks);
        self
    }

    pub fn with_task_type(mut self, task_type: TaskType) -> Self {
        self.task_type = Some(task_type);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_output_dimensionality(mut self, dims: i32) -> Self {
        self.output_dimensionality = Some(dims);
        self
    }

    fn request_for(&self, text: String) -> EmbedContentRequest {
        EmbedContentRequest {
            model: self.client.model.to_string(),
            content: Content::text(text),
            task_type: self.task_type.clone(),
            title: self.title.clone(),
            output_dimensionality: self.output_dimensionality,
        }
    }

    /// Embed the single configured text. Extra chunks are joined with a space.
    #[instrument(skip_all, fields(chunks = self.chunks.len()))]
    pub async fn execute(self) -> Result<ContentEmbeddingResponse, Error> {
        let text = self.chunks.join(" ");
        let request = self.request_for(text);
        self.client.embed_content(request).await
    }

    /// Embed every configured chunk in one batch call, preserving order.
    #[instrument(skip_all, fields(chunks = self.chunks.len()))]
    pub async fn execute_batch(self) -> Result<BatchContentEmbeddingResponse, Error> {
        let requests =
            self.chunks.iter().map(|chunk| self.request_for(chunk.clone())).collect::<Vec<_>>();
        self.client.embed_content_batch(BatchEmbedContentsRequest { requests }).await
    }
}
