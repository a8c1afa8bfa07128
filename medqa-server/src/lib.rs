//! HTTP query service for the medical knowledge QA system.
//!
//! A chat request flows through retrieval ([`medqa_rag::Retriever`]), prompt
//! construction ([`prompt::build_rag_prompt`]) and streamed generation
//! ([`generation::answer_stream`]); fragments are written to the response
//! body as soon as the model produces them.

pub mod config;
pub mod error;
pub mod generation;
pub mod message;
pub mod prompt;
pub mod server;
pub mod state;

pub use config::{ConfigError, CorsOrigins, ServerConfig};
pub use error::ServerError;
pub use generation::{
    AnswerEvent, AnswerStream, ChatModel, GeminiChatModel, GenerationError, TextStream,
    answer_stream,
};
pub use message::{ChatRequest, Message, Role};
pub use prompt::build_rag_prompt;
pub use server::{AppState, app_router, cors_layer, run_server};
pub use state::{ServiceContext, ServiceInfo, load_retriever};
