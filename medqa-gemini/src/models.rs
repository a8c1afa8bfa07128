//! Conversation turn types shared by generation and embedding requests.

use serde::{Deserialize, Serialize};

/// Author of a conversation turn as understood by the Gemini API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A turn written by the end user.
    User,
    /// A turn produced by the model.
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

/// A single piece of content inside a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Set on reasoning summaries emitted by thinking models.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<bool>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: Some(text.into()), thought: None }
    }
}

/// One conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    /// Build a user turn holding a single text part.
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Some(Role::User), parts: vec![Part::text(text)] }
    }

    /// Build a model turn holding a single text part.
    pub fn model(text: impl Into<String>) -> Self {
        Self { role: Some(Role::Model), parts: vec![Part::text(text)] }
    }

    /// Content without a role, as used for system instructions and embeddings.
    pub fn text(text: impl Into<String>) -> Self {
        Self { role: None, parts: vec![Part::text(text)] }
    }

    /// Concatenated text of all non-thought parts.
    pub fn text_parts(&self) -> String {
        self.parts
            .iter()
            .filter(|part| !part.thought.unwrap_or(false))
            .filter_map(|part| part.text.as_deref())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn roles_serialize_to_api_vocabulary() {
        assert_eq!(serde_json::to_value(Role::User).unwrap(), json!("user"));
        assert_eq!(serde_json::to_value(Role::Model).unwrap(), json!("model"));
        assert_eq!(Role::Model.as_str(), "model");
    }

    #[test]
    fn user_content_shape() {
        let value = serde_json::to_value(Content::user("你好")).unwrap();
        assert_eq!(value, json!({"role": "user", "parts": [{"text": "你好"}]}));
    }

    #[test]
    fn text_parts_skips_thoughts() {
        let content = Content {
            role: Some(Role::Model),
            parts: vec![
                Part { text: Some("thinking".into()), thought: Some(true) },
                Part::text("答案"),
            ],
        };
        assert_eq!(content.text_parts(), "答案");
    }
}
