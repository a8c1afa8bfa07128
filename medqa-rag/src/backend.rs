//! Selecting an embedding provider by name.

use std::sync::Arc;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

/// Model used by [`EmbeddingBackend::Local`] when none is named.
pub const DEFAULT_LOCAL_MODEL: &str = "sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2";

/// Model used by [`EmbeddingBackend::Gemini`] when none is named.
pub const DEFAULT_GEMINI_EMBEDDING_MODEL: &str = "text-embedding-004";

/// Which embedding implementation to construct.
///
/// Written in configuration as `local`, `local:<hf-model-id>`, `gemini` or
/// `gemini:<model>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbeddingBackend {
    Local { model_id: String },
    /// `proxy` routes the embedding requests, as `HTTPS_PROXY` does for chat.
    Gemini { api_key: String, model: String, proxy: Option<String> },
}

impl Default for EmbeddingBackend {
    fn default() -> Self {
        Self::Local { model_id: DEFAULT_LOCAL_MODEL.to_string() }
    }
}

impl EmbeddingBackend {
    /// Parse a backend spec. `api_key` is required for the Gemini backend.
    pub fn parse(spec: &str, api_key: Option<&str>) -> Result<Self> {
        let spec = spec.trim();
        let (kind, model) = match spec.split_once(':') {
            Some((kind, model)) => (kind, Some(model.trim()).filter(|m| !m.is_empty())),
            None => (spec, None),
        };
        match kind.to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local {
                model_id: model.unwrap_or(DEFAULT_LOCAL_MODEL).to_string(),
            }),
            "gemini" => {
                let api_key = api_key.filter(|k| !k.is_empty()).ok_or_else(|| {
                    RagError::ConfigError(
                        "the gemini embedding backend needs GOOGLE_AI_API_KEY".to_string(),
                    )
                })?;
                Ok(Self::Gemini {
                    api_key: api_key.to_string(),
                    model: model.unwrap_or(DEFAULT_GEMINI_EMBEDDING_MODEL).to_string(),
                    proxy: None,
                })
            }
            other => Err(RagError::ConfigError(format!(
                "unknown embedding backend '{other}' (expected 'local' or 'gemini')"
            ))),
        }
    }

    /// Route remote embedding requests through `proxy`. No effect on local models.
    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        if let Self::Gemini { proxy: slot, .. } = &mut self {
            *slot = proxy;
        }
        self
    }

    /// Human readable label for logs and health output.
    pub fn label(&self) -> String {
        match self {
            Self::Local { model_id } => format!("local:{model_id}"),
            Self::Gemini { model, .. } => format!("gemini:{model}"),
        }
    }
}

/// Construct the provider for `backend`.
///
/// # Errors
///
/// Returns [`RagError::ConfigError`] when the crate was built without the
/// feature the backend needs, or [`RagError::EmbeddingError`] if the model
/// cannot be loaded.
pub async fn open_embedding_provider(
    backend: &EmbeddingBackend,
) -> Result<Arc<dyn EmbeddingProvider>> {
    match backend {
        #[cfg(feature = "local")]
        EmbeddingBackend::Local { model_id } => {
            let provider = crate::local::LocalEmbeddingProvider::load(model_id.clone()).await?;
            Ok(Arc::new(provider))
        }
        #[cfg(not(feature = "local"))]
        EmbeddingBackend::Local { .. } => Err(RagError::ConfigError(
            "local embeddings require the `local` feature".to_string(),
        )),
        #[cfg(feature = "gemini")]
        EmbeddingBackend::Gemini { api_key, model, proxy } => {
            let client = gemini_client(api_key, model, proxy.as_deref())?;
            Ok(Arc::new(crate::gemini::GeminiEmbeddingProvider::from_client(client)))
        }
        #[cfg(not(feature = "gemini"))]
        EmbeddingBackend::Gemini { .. } => Err(RagError::ConfigError(
            "Gemini embeddings require the `gemini` feature".to_string(),
        )),
    }
}

#[cfg(feature = "gemini")]
fn gemini_client(api_key: &str, model: &str, proxy: Option<&str>) -> Result<medqa_gemini::Gemini> {
    let client_error = |message: String| RagError::EmbeddingError {
        provider: "gemini".to_string(),
        message,
    };
    let mut builder =
        medqa_gemini::GeminiBuilder::new(api_key).with_model(medqa_gemini::Model::from_name(model));
    if let Some(proxy) = proxy {
        let proxy = reqwest::Proxy::all(proxy)
            .map_err(|e| client_error(format!("invalid proxy '{proxy}': {e}")))?;
        builder = builder.with_http_client(reqwest::Client::builder().proxy(proxy));
    }
    builder.build().map_err(|e| client_error(format!("failed to create Gemini client: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_local_with_and_without_model() {
        assert_eq!(EmbeddingBackend::parse("local", None).unwrap(), EmbeddingBackend::default());
        assert_eq!(
            EmbeddingBackend::parse("local:BAAI/bge-small-zh-v1.5", None).unwrap(),
            EmbeddingBackend::Local { model_id: "BAAI/bge-small-zh-v1.5".to_string() }
        );
    }

    #[test]
    fn gemini_requires_key() {
        assert!(matches!(
            EmbeddingBackend::parse("gemini", None),
            Err(RagError::ConfigError(_))
        ));
        let backend = EmbeddingBackend::parse("Gemini", Some("k")).unwrap();
        assert_eq!(backend.label(), "gemini:text-embedding-004");
    }

    #[test]
    fn proxy_applies_to_gemini_only() {
        let proxy = Some("http://127.0.0.1:7890".to_string());
        let gemini = EmbeddingBackend::parse("gemini", Some("k")).unwrap().with_proxy(proxy.clone());
        assert!(matches!(gemini, EmbeddingBackend::Gemini { proxy: Some(ref p), .. } if p == "http://127.0.0.1:7890"));
        assert_eq!(EmbeddingBackend::default().with_proxy(proxy), EmbeddingBackend::default());
    }

    #[cfg(feature = "gemini")]
    #[test]
    fn gemini_client_uses_configured_proxy() {
        assert!(gemini_client("k", "text-embedding-004", Some("http://127.0.0.1:7890")).is_ok());
        assert!(matches!(
            gemini_client("k", "text-embedding-004", Some("http://bad host")),
            Err(RagError::EmbeddingError { .. })
        ));
    }

    #[test]
    fn rejects_unknown_backend() {
        assert!(EmbeddingBackend::parse("openai", None).is_err());
    }
}
