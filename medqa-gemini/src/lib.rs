//! Minimal Gemini REST client: streamed and unary generation, multi-turn
//! chat sessions, and text embeddings.

pub mod chat;
pub mod client;
pub mod embedding;
pub mod generation;
pub mod models;


pub use chat::ChatSession;
pub use client::{Error, Gemini, GeminiBuilder, GeminiClient, Model};
pub use embedding::{
    BatchContentEmbeddingResponse, ContentEmbedding, ContentEmbeddingResponse, EmbedBuilder,
    TaskType,
};
pub use generation::{
    BlockReason, Candidate, ContentBuilder, FinishReason, GenerateContentRequest,
    GenerationConfig, GenerationResponse, GenerationStream, PromptFeedback, SafetyRating,
    UsageMetadata,
};
pub use models::{Content, Part, Role};
