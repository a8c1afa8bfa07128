//! Streaming answer generation.
//!
//! [`answer_stream`] runs one chat turn end to end: retrieve context for the
//! latest message, build the prompt, stream the model's reply, then append
//! the sources block. Every stream ends in exactly one of three ways: the
//! last token, a [`AnswerEvent::Sources`] block, or a
//! [`AnswerEvent::Failed`] marker.

use std::pin::Pin;
use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use medqa_gemini::{
    FinishReason, Gemini, GeminiBuilder, GenerationResponse, GenerationStream, Model,
};
use medqa_rag::Retriever;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::config::{ConfigError, ServerConfig};
use crate::message::Message;
use crate::prompt::build_rag_prompt;

/// Text fragments produced by a [`ChatModel`].
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, GenerationError>> + Send>>;

/// Fragments relayed to the HTTP client.
pub type AnswerStream = Pin<Box<dyn Stream<Item = AnswerEvent> + Send>>;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Gemini(#[from] medqa_gemini::Error),

    #[error("{0}")]
    Upstream(String),
}

/// A generative model that continues a conversation.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn name(&self) -> &str;

    /// Stream the reply to `prompt`, sent as a user turn after `history`.
    async fn stream_chat(
        &self,
        history: &[Message],
        prompt: &str,
    ) -> Result<TextStream, GenerationError>;
}

/// [`ChatModel`] backed by a Gemini chat session.
pub struct GeminiChatModel {
    client: Gemini,
}

impl GeminiChatModel {
    pub fn new(client: Gemini) -> Self {
        Self { client }
    }

    /// Build the client for the configured model, routed through the proxy if one is set.
    pub fn from_config(config: &ServerConfig) -> Result<Self, ConfigError> {
        let mut builder =
            GeminiBuilder::new(config.api_key.as_str()).with_model(Model::from_name(&config.model));
        if let Some(proxy) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy.as_str())
                .map_err(|e| ConfigError::Invalid { key: "HTTPS_PROXY", message: e.to_string() })?;
            builder = builder.with_http_client(reqwest::Client::builder().proxy(proxy));
        }
        let client = builder.build().map_err(|e| ConfigError::Client(e.to_string()))?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl ChatModel for GeminiChatModel {
    fn name(&self) -> &str {
        self.client.model().as_str()
    }

    async fn stream_chat(
        &self,
        history: &[Message],
        prompt: &str,
    ) -> Result<TextStream, GenerationError> {
        let mut session = self.client.start_chat(history.iter().map(Message::to_gemini).collect());
        let responses = session.send_message_stream(prompt).await?;
        Ok(relay_responses(responses))
    }
}

/// Turn streamed Gemini chunks into text, failing on blocked output.
fn relay_responses(responses: GenerationStream) -> TextStream {
    Box::pin(responses.map(|chunk| chunk.map_err(GenerationError::from).and_then(chunk_text)))
}

fn chunk_text(response: GenerationResponse) -> Result<String, GenerationError> {
    if let Some(reason) = response.prompt_feedback.as_ref().and_then(|f| f.block_reason) {
        return Err(GenerationError::Upstream(format!("prompt blocked ({reason:?})")));
    }
    let text = response.text();
    if text.is_empty() {
        let blocked = response.candidates.first().and_then(|c| c.finish_reason).filter(|reason| {
            matches!(
                reason,
                FinishReason::Safety
                    | FinishReason::Blocklist
                    | FinishReason::ProhibitedContent
                    | FinishReason::Spii
                    | FinishReason::Recitation
            )
        });
        if let Some(reason) = blocked {
            return Err(GenerationError::Upstream(format!("response blocked ({reason:?})")));
        }
    }
    Ok(text)
}

/// One fragment of a streamed answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerEvent {
    /// Text produced by the model.
    Token(String),
    /// De-duplicated source files, sent after a complete answer.
    Sources(Vec<String>),
    /// Generation failed; the answer so far is all there is.
    Failed(String),
}

impl AnswerEvent {
    /// The text written to the response body for this fragment.
    pub fn render(&self) -> String {
        match self {
            Self::Token(text) => text.clone(),
            Self::Sources(sources) => {
                let mut block = String::from("\n\n---\n📚 **信息来源**：\n");
                for source in sources {
                    block.push_str("- ");
                    block.push_str(source);
                    block.push('\n');
                }
                block
            }
            Self::Failed(detail) => format!("\n\n[错误: 生成响应时出错: {detail}]"),
        }
    }
}

/// Answer the latest message of `messages`, using the earlier ones as history.
///
/// The stream is lazy: nothing is retrieved or generated until it is polled.
/// An empty conversation yields an empty stream.
pub fn answer_stream(
    chat_model: Arc<dyn ChatModel>,
    retriever: Arc<Retriever>,
    messages: Vec<Message>,
) -> AnswerStream {
    Box::pin(stream! {
        let Some((latest, history)) = messages.split_last() else {
            return;
        };
        let query = latest.content.as_str();
        debug!(query_chars = query.chars().count(), history_turns = history.len(), "answering");

        let retrieval = retriever.retrieve(query).await;
        let prompt = build_rag_prompt(query, &retrieval.context);

        let mut tokens = match chat_model.stream_chat(history, &prompt).await {
            Ok(tokens) => tokens,
            Err(e) => {
                error!(model = chat_model.name(), error = %e, "failed to start generation");
                yield AnswerEvent::Failed(e.to_string());
                return;
            }
        };

        let mut emitted = 0usize;
        while let Some(item) = tokens.next().await {
            match item {
                Ok(text) if text.is_empty() => {}
                Ok(text) => {
                    emitted += text.chars().count();
                    yield AnswerEvent::Token(text);
                }
                Err(e) => {
                    error!(model = chat_model.name(), error = %e, emitted, "generation failed mid-stream");
                    yield AnswerEvent::Failed(e.to_string());
                    return;
                }
            }
        }

        let sources = retrieval.unique_sources();
        info!(emitted, source_count = sources.len(), "answer complete");
        if !sources.is_empty() {
            yield AnswerEvent::Sources(sources);
        }
    })
}
