//! Service configuration read from the environment.

use std::fmt;
use std::path::PathBuf;

use medqa_rag::{EmbeddingBackend, RagConfig, SourceDedup};
use thiserror::Error;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_VECTOR_STORE_DIR: &str = "./vector_store";
pub const DEFAULT_COLLECTION: &str = "medical_knowledge";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("GOOGLE_AI_API_KEY is not set; add it to the environment or a .env file")]
    MissingApiKey,

    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },

    #[error("failed to create the Gemini client: {0}")]
    Client(String),
}

/// Which origins the browser front-end may call from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsOrigins {
    Any,
    List(Vec<String>),
}

impl CorsOrigins {
    fn parse(value: &str) -> Self {
        let origins: Vec<String> = value
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect();
        if origins.is_empty() || origins.iter().any(|o| o == "*") {
            Self::Any
        } else {
            Self::List(origins)
        }
    }
}

#[derive(Clone)]
pub struct ServerConfig {
    pub api_key: String,
    pub model: String,
    pub proxy: Option<String>,
    pub host: String,
    pub port: u16,
    pub vector_store_dir: PathBuf,
    pub collection: String,
    pub embedding: EmbeddingBackend,
    pub top_k: usize,
    pub source_dedup: SourceDedup,
    pub cors_origins: CorsOrigins,
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("proxy", &self.proxy)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("vector_store_dir", &self.vector_store_dir)
            .field("collection", &self.collection)
            .field("embedding", &self.embedding.label())
            .field("top_k", &self.top_k)
            .field("source_dedup", &self.source_dedup)
            .field("cors_origins", &self.cors_origins)
            .finish()
    }
}

impl ServerConfig {
    /// Read the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup. Blank values
    /// count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_key = get("GOOGLE_AI_API_KEY").ok_or(ConfigError::MissingApiKey)?;

        let port = match get("BACKEND_PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|e| ConfigError::Invalid { key: "BACKEND_PORT", message: e.to_string() })?,
            None => DEFAULT_PORT,
        };

        let top_k = match get("RAG_TOP_K") {
            Some(raw) => match raw.parse::<usize>() {
                Ok(k) if k > 0 => k,
                Ok(_) => {
                    return Err(ConfigError::Invalid {
                        key: "RAG_TOP_K",
                        message: "must be greater than zero".to_string(),
                    });
                }
                Err(e) => {
                    return Err(ConfigError::Invalid { key: "RAG_TOP_K", message: e.to_string() });
                }
            },
            None => RagConfig::default().top_k,
        };

        let source_dedup = match get("RAG_SOURCE_DEDUP") {
            Some(raw) => raw
                .parse()
                .map_err(|e| ConfigError::Invalid { key: "RAG_SOURCE_DEDUP", message: format!("{e}") })?,
            None => SourceDedup::default(),
        };

        let proxy = get("HTTPS_PROXY").or_else(|| get("HTTP_PROXY"));

        let embedding = match get("EMBEDDING_BACKEND") {
            Some(raw) => EmbeddingBackend::parse(&raw, Some(api_key.as_str()))
                .map_err(|e| ConfigError::Invalid { key: "EMBEDDING_BACKEND", message: e.to_string() })?,
            None => EmbeddingBackend::default(),
        }
        .with_proxy(proxy.clone());

        Ok(Self {
            model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            proxy,
            host: get("BACKEND_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            vector_store_dir: get("VECTOR_STORE_DIR")
                .unwrap_or_else(|| DEFAULT_VECTOR_STORE_DIR.to_string())
                .into(),
            collection: get("COLLECTION_NAME").unwrap_or_else(|| DEFAULT_COLLECTION.to_string()),
            embedding,
            top_k,
            source_dedup,
            cors_origins: get("CORS_ALLOW_ORIGINS")
                .map(|raw| CorsOrigins::parse(&raw))
                .unwrap_or(CorsOrigins::Any),
            api_key,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Retrieval settings derived from this configuration.
    pub fn rag_config(&self) -> RagConfig {
        RagConfig { top_k: self.top_k, source_dedup: self.source_dedup, ..RagConfig::default() }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_key_is_set() {
        let config = ServerConfig::from_lookup(lookup(&[("GOOGLE_AI_API_KEY", "secret")])).unwrap();
        assert_eq!(config.bind_addr(), "0.0.0.0:8000");
        assert_eq!(config.model, "gemini-2.5-flash");
        assert_eq!(config.collection, "medical_knowledge");
        assert_eq!(config.vector_store_dir, PathBuf::from("./vector_store"));
        assert_eq!(config.embedding, EmbeddingBackend::default());
        assert_eq!(config.top_k, 3);
        assert_eq!(config.cors_origins, CorsOrigins::Any);
        assert!(config.proxy.is_none());
    }

    #[test]
    fn missing_or_blank_key_is_fatal() {
        assert!(matches!(ServerConfig::from_lookup(lookup(&[])), Err(ConfigError::MissingApiKey)));
        assert!(matches!(
            ServerConfig::from_lookup(lookup(&[("GOOGLE_AI_API_KEY", "  ")])),
            Err(ConfigError::MissingApiKey)
        ));
    }

    #[test]
    fn reads_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("GOOGLE_AI_API_KEY", "secret"),
            ("BACKEND_HOST", "127.0.0.1"),
            ("BACKEND_PORT", "9000"),
            ("HTTP_PROXY", "http://127.0.0.1:7890"),
            ("RAG_TOP_K", "5"),
            ("RAG_SOURCE_DEDUP", "before-top-k"),
            ("EMBEDDING_BACKEND", "gemini"),
            ("CORS_ALLOW_ORIGINS", "http://localhost:3000, http://localhost:5173"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr(), "127.0.0.1:9000");
        assert_eq!(config.proxy.as_deref(), Some("http://127.0.0.1:7890"));
        assert_eq!(config.rag_config().top_k, 5);
        assert_eq!(config.rag_config().source_dedup, SourceDedup::BeforeTopK);
        assert_eq!(config.embedding.label(), "gemini:text-embedding-004");
        assert!(matches!(
            &config.embedding,
            EmbeddingBackend::Gemini { proxy: Some(p), .. } if p == "http://127.0.0.1:7890"
        ));
        assert_eq!(
            config.cors_origins,
            CorsOrigins::List(vec!["http://localhost:3000".into(), "http://localhost:5173".into()])
        );
    }

    #[test]
    fn rejects_bad_numbers() {
        let bad_port = ServerConfig::from_lookup(lookup(&[
            ("GOOGLE_AI_API_KEY", "secret"),
            ("BACKEND_PORT", "eighty"),
        ]));
        assert!(matches!(bad_port, Err(ConfigError::Invalid { key: "BACKEND_PORT", .. })));

        let zero_k =
            ServerConfig::from_lookup(lookup(&[("GOOGLE_AI_API_KEY", "secret"), ("RAG_TOP_K", "0")]));
        assert!(matches!(zero_k, Err(ConfigError::Invalid { key: "RAG_TOP_K", .. })));
    }

    #[test]
    fn debug_output_hides_key() {
        let config = ServerConfig::from_lookup(lookup(&[("GOOGLE_AI_API_KEY", "secret")])).unwrap();
        assert!(!format!("{config:?}").contains("secret"));
    }
}
