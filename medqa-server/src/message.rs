//! Conversation messages as sent by the front-end.

use serde::{Deserialize, Serialize};

/// Who wrote a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    #[serde(alias = "model")]
    Assistant,
}

impl Role {
    /// The role name Gemini expects for this speaker.
    pub fn to_gemini(self) -> medqa_gemini::Role {
        match self {
            Role::User => medqa_gemini::Role::User,
            Role::Assistant => medqa_gemini::Role::Model,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }

    pub fn to_gemini(&self) -> medqa_gemini::Content {
        match self.role.to_gemini() {
            medqa_gemini::Role::User => medqa_gemini::Content::user(self.content.clone()),
            medqa_gemini::Role::Model => medqa_gemini::Content::model(self.content.clone()),
        }
    }
}

/// Body of `POST /chat`: the whole conversation, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
}
