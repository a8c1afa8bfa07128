//! Process-wide service context shared by all handlers.

use std::path::PathBuf;
use std::sync::Arc;

use medqa_rag::{
    DiskVectorStore, RagPipeline, RecursiveChunker, Retriever, VectorStore,
    open_embedding_provider,
};
use tracing::{info, warn};

use crate::config::{ConfigError, ServerConfig};
use crate::generation::{ChatModel, GeminiChatModel};

/// Query used to confirm the knowledge base answers at startup.
const STARTUP_PROBE_QUERY: &str = "高血压";

/// Facts reported by the health endpoints. Fixed at startup.
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    pub google_ai_configured: bool,
    pub model: String,
    pub embedding: String,
    pub vector_store_path: PathBuf,
    pub collection: String,
}

/// Everything a request needs, built once in `main` and shared read-only.
pub struct ServiceContext {
    pub chat_model: Arc<dyn ChatModel>,
    pub retriever: Arc<Retriever>,
    pub info: ServiceInfo,
}

impl ServiceContext {
    pub fn new(chat_model: Arc<dyn ChatModel>, retriever: Arc<Retriever>, info: ServiceInfo) -> Self {
        Self { chat_model, retriever, info }
    }

    /// Create the Gemini client and try to open the knowledge base.
    ///
    /// # Errors
    ///
    /// Only the generation client is mandatory; a missing or unreadable
    /// knowledge base leaves retrieval disabled instead of failing.
    pub async fn from_config(config: &ServerConfig) -> Result<Self, ConfigError> {
        let chat_model = GeminiChatModel::from_config(config)?;
        let retriever = load_retriever(config).await;
        let info = ServiceInfo {
            google_ai_configured: !config.api_key.is_empty(),
            model: config.model.clone(),
            embedding: config.embedding.label(),
            vector_store_path: config.vector_store_dir.clone(),
            collection: config.collection.clone(),
        };
        Ok(Self::new(Arc::new(chat_model), Arc::new(retriever), info))
    }
}

/// Open the persisted collection, or fall back to a disabled retriever.
pub async fn load_retriever(config: &ServerConfig) -> Retriever {
    let dir = &config.vector_store_dir;
    if !dir.exists() {
        warn!(
            path = %dir.display(),
            "vector store not found; run medqa-ingest first. Answering from general knowledge only"
        );
        return Retriever::disabled();
    }

    let store = match DiskVectorStore::open(dir).await {
        Ok(store) => store,
        Err(e) => {
            warn!(path = %dir.display(), error = %e, "failed to open vector store, retrieval disabled");
            return Retriever::disabled();
        }
    };
    match store.collection_exists(&config.collection).await {
        Ok(true) => {}
        Ok(false) => {
            warn!(collection = %config.collection, "collection not found, retrieval disabled");
            return Retriever::disabled();
        }
        Err(e) => {
            warn!(collection = %config.collection, error = %e, "failed to inspect collection, retrieval disabled");
            return Retriever::disabled();
        }
    }

    let embedder = match open_embedding_provider(&config.embedding).await {
        Ok(embedder) => embedder,
        Err(e) => {
            warn!(embedding = %config.embedding.label(), error = %e, "embedding model failed to load, retrieval disabled");
            return Retriever::disabled();
        }
    };

    let rag_config = config.rag_config();
    let pipeline = RagPipeline::builder()
        .chunker(Arc::new(RecursiveChunker::new(rag_config.chunk_size, rag_config.chunk_overlap)))
        .config(rag_config)
        .embedding_provider(embedder)
        .vector_store(Arc::new(store))
        .build();
    let pipeline = match pipeline {
        Ok(pipeline) => Arc::new(pipeline),
        Err(e) => {
            warn!(error = %e, "failed to assemble retrieval pipeline, retrieval disabled");
            return Retriever::disabled();
        }
    };

    let retriever = Retriever::new(pipeline, config.collection.clone());
    match retriever.search(STARTUP_PROBE_QUERY).await {
        Ok(hits) => info!(
            collection = %config.collection,
            path = %dir.display(),
            result_count = hits.len(),
            "knowledge base loaded"
        ),
        Err(e) => {
            warn!(collection = %config.collection, error = %e, "knowledge base probe failed, retrieval disabled");
            return Retriever::disabled();
        }
    }
    retriever
}
