//! Stateful multi-turn conversations.

use tracing::debug;

use crate::client::{Error, Gemini};
use crate::generation::GenerationStream;
use crate::models::Content;

/// A conversation whose history is replayed on every request.
///
/// ```no_run
/// # use medqa_gemini::{Content, Gemini};
/// # use futures::TryStreamExt;
/// # async fn run(gemini: Gemini) -> Result<(), medqa_gemini::Error> {
/// let mut chat = gemini.start_chat(vec![Content::user("你好"), Content::model("你好！")]);
/// let mut stream = chat.send_message_stream("高血压要注意什么？").await?;
/// while let Some(chunk) = stream.try_next().await? {
///     print!("{}", chunk.text());
/// }
/// # Ok(())
/// # }
/// ```
pub struct ChatSession {
    gemini: Gemini,
    history: Vec<Content>,
}

impl ChatSession {
    pub(crate) fn new(gemini: Gemini, history: Vec<Content>) -> Self {
        Self { gemini, history }
    }

    /// Turns sent so far, oldest first.
    pub fn history(&self) -> &[Content] {
        &self.history
    }

    /// Append `text` as the newest user turn and stream the model's reply.
    ///
    /// The reply is not added to the history; call
    /// [`record_model_reply`](Self::record_model_reply) once it is assembled.
    pub async fn send_message_stream(
        &mut self,
        text: impl Into<String>,
    ) -> Result<GenerationStream, Error> {
        self.history.push(Content::user(text));
        debug!(turns = self.history.len(), "sending chat turn");
        self.gemini.generate_content().with_history(self.history.iter().cloned()).execute_stream().await
    }

    /// Append a completed model answer so the next turn sees it.
    pub fn record_model_reply(&mut self, text: impl Into<String>) {
        self.history.push(Content::model(text));
    }
}
