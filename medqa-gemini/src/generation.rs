//! Content generation requests, responses, and the fluent request builder.

use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::client::{Error, GeminiClient};
use crate::models::{Content, Role};

/// Chunks of a streamed generation, in arrival order.
pub type GenerationStream = Pin<Box<dyn Stream<Item = Result<GenerationResponse, Error>> + Send>>;

/// Sampling parameters for a generation request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_count: Option<i32>,
}

/// Body of `generateContent` and `streamGenerateContent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinishReason {
    Stop,
    MaxTokens,
    Safety,
    Recitation,
    Language,
    Blocklist,
    ProhibitedContent,
    Spii,
    MalformedFunctionCall,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockReason {
    Safety,
    Blocklist,
    ProhibitedContent,
    ImageSafety,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyRating {
    pub category: String,
    pub probability: String,
    #[serde(default)]
    pub blocked: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
    #[serde(default)]
    pub safety_ratings: Option<Vec<SafetyRating>>,
    #[serde(default)]
    pub index: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<BlockReason>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    pub prompt_token_count: Option<i32>,
    pub candidates_token_count: Option<i32>,
    pub thoughts_token_count: Option<i32>,
    pub cached_content_token_count: Option<i32>,
    pub total_token_count: Option<i32>,
}

/// A full response, or one chunk of a streamed response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    pub usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    pub model_version: Option<String>,
    #[serde(default)]
    pub response_id: Option<String>,
}

impl GenerationResponse {
    /// Text of the first candidate. Empty when the prompt was blocked or
    /// the chunk carries no text.
    pub fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .map(Content::text_parts)
            .unwrap_or_default()
    }
}

/// Fluent builder for a generation call.
pub struct ContentBuilder {
    client: Arc<GeminiClient>,
    request: GenerateContentRequest,
}

impl ContentBuilder {
    pub(crate) fn new(client: Arc<GeminiClient>) -> Self {
        Self {
            client,
            request: GenerateContentRequest {
                contents: Vec::new(),
                system_instruction: None,
                generation_config: None,
            },
        }
    }

    /// Append prior turns ahead of any message added later.
    pub fn with_history(mut self, history: impl IntoIterator<Item = Content>) -> Self {
        self.request.contents.extend(history);
        self
    }

    pub fn with_user_message(mut self, text: impl Into<String>) -> Self {
        self.request.contents.push(Content::user(text));
        self
    }

    pub fn with_model_message(mut self, text: impl Into<String>) -> Self {
        self.request.contents.push(Content::model(text));
        self
    }

    pub fn with_message(mut self, role: Role, text: impl Into<String>) -> Self {
        let content = match role {
            Role::User => Content::user(text),
            Role::Model => Content::model(text),
        };
        self.request.contents.push(content);
        self
    }

    pub fn with_system_instruction(mut self, text: impl Into<String>) -> Self {
        self.request.system_instruction = Some(Content::text(text));
        self
    }

    pub fn with_generation_config(mut self, config: GenerationConfig) -> Self {
        self.request.generation_config = Some(config);
        self
    }

    /// The request as it would be sent.
    pub fn build(self) -> GenerateContentRequest {
        self.request
    }

    /// Send the request and wait for the whole answer.
    pub async fn execute(self) -> Result<GenerationResponse, Error> {
        self.client.generate_content_raw(self.request).await
    }

    /// Send the request in streaming mode. Each item is one SSE chunk.
    pub async fn execute_stream(self) -> Result<GenerationStream, Error> {
        let stream = self.client.generate_content_stream(self.request).await?;
        Ok(Box::pin(stream))
    }
}
