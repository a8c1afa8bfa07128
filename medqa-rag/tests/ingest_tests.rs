//! Ingestion and retrieval over a real directory and an on-disk store.

mod support;

use std::sync::Arc;

use medqa_rag::{
    Chunker, DirectoryLoader, DiskVectorStore, InMemoryVectorStore, RagConfig, RagPipeline,
    RecursiveChunker, Retriever, SourceDedup, VectorStore,
};
use support::{CharHashEmbedder, document};

const COLLECTION: &str = "medical_knowledge";

fn pipeline(store: Arc<dyn VectorStore>, config: RagConfig) -> RagPipeline {
    RagPipeline::builder()
        .chunker(Arc::new(RecursiveChunker::new(config.chunk_size, config.chunk_overlap)))
        .config(config)
        .embedding_provider(Arc::new(CharHashEmbedder))
        .vector_store(store)
        .build()
        .unwrap()
}

fn hypertension_text() -> String {
    let intro = "高血压是一种常见的慢性疾病，患者需要长期管理血压水平。".repeat(10);
    let lifestyle =
        "生活方式方面，患者应坚持低盐饮食，每日食盐摄入量不超过5克，同时限制饮酒、戒烟、规律运动。"
            .repeat(5);
    let outro = "高血压是一种常见的慢性疾病，患者需要长期管理血压水平。".repeat(6);
    format!("{intro}\n\n{lifestyle}\n\n{outro}")
}

#[tokio::test]
async fn record_count_matches_chunks_and_rerun_replaces() {
    let data = tempfile::tempdir().unwrap();
    let texts = [
        ("hypertension.txt", hypertension_text()),
        ("diabetes.txt", "糖尿病患者需要控制血糖。\n\n定期监测糖化血红蛋白。".repeat(30)),
        ("cold.txt", "感冒多喝水，注意休息。".to_string()),
    ];
    for (name, text) in &texts {
        std::fs::write(data.path().join(name), text).unwrap();
    }

    let chunker = RecursiveChunker::new(500, 50);
    let documents = DirectoryLoader::new(data.path()).load().unwrap();
    let expected: usize = documents.iter().map(|d| chunker.chunk(d).len()).sum();
    assert_eq!(documents.len(), 3);

    let store_dir = tempfile::tempdir().unwrap();
    let store = Arc::new(DiskVectorStore::open(store_dir.path()).await.unwrap());
    let pipeline = pipeline(store.clone(), RagConfig::default());

    let first = pipeline.rebuild_collection(COLLECTION, &documents).await.unwrap();
    assert_eq!(first.documents, 3);
    assert_eq!(first.chunks, expected);
    assert_eq!(store.count(COLLECTION).await.unwrap(), expected);

    let second = pipeline.rebuild_collection(COLLECTION, &documents).await.unwrap();
    assert_eq!(second, first);
    assert_eq!(store.count(COLLECTION).await.unwrap(), expected);

    let reopened = DiskVectorStore::open(store_dir.path()).await.unwrap();
    assert_eq!(reopened.count(COLLECTION).await.unwrap(), expected);
}

#[tokio::test]
async fn retrieves_low_salt_advice_for_hypertension_query() {
    let data = tempfile::tempdir().unwrap();
    std::fs::write(data.path().join("hypertension.txt"), hypertension_text()).unwrap();
    let documents = DirectoryLoader::new(data.path()).load().unwrap();

    let store_dir = tempfile::tempdir().unwrap();
    let store = Arc::new(DiskVectorStore::open(store_dir.path()).await.unwrap());
    let report =
        pipeline(store, RagConfig::default()).rebuild_collection(COLLECTION, &documents).await.unwrap();
    assert!(report.chunks >= 2 && report.chunks <= 3);

    // Serve from a fresh handle, as the query service would after ingestion.
    let served: Arc<dyn VectorStore> = Arc::new(DiskVectorStore::open(store_dir.path()).await.unwrap());
    let retriever = Retriever::new(Arc::new(pipeline(served, RagConfig::default())), COLLECTION);
    let retrieval = retriever.retrieve("高血压注意事项").await;

    assert!(retrieval.context.contains("低盐饮食"));
    assert!(retrieval.context.starts_with("[文档1：hypertension.txt]\n"));
    assert!(retrieval.sources.iter().all(|s| s == "hypertension.txt"));
    assert_eq!(retrieval.unique_sources(), vec!["hypertension.txt"]);
}

#[tokio::test]
async fn dedup_before_top_k_keeps_one_hit_per_source() {
    let store = Arc::new(InMemoryVectorStore::new());
    let config = RagConfig::builder().chunk_size(12).chunk_overlap(0).build().unwrap();
    let documents = [
        document(
            "data/a.txt",
            "高血压需要低盐。\n\n高血压需要服药。\n\n高血压需要运动。\n\n高血压需要监测。",
        ),
        document("data/b.txt", "感冒多喝水休息。"),
    ];

    let at_render = pipeline(store.clone(), config.clone());
    at_render.rebuild_collection(COLLECTION, &documents).await.unwrap();
    let hits = at_render.query(COLLECTION, "高血压需要").await.unwrap();
    assert_eq!(hits.len(), 3);
    assert!(hits.iter().all(|h| h.chunk.source_filename() == "a.txt"));

    let before = pipeline(
        store,
        RagConfig { source_dedup: SourceDedup::BeforeTopK, ..config },
    );
    let hits = before.query(COLLECTION, "高血压需要").await.unwrap();
    let sources: Vec<String> = hits.iter().map(|h| h.chunk.source_filename()).collect();
    assert_eq!(sources, vec!["a.txt", "b.txt"]);
}

#[tokio::test]
async fn failed_lookup_degrades_to_empty_retrieval() {
    let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
    let retriever =
        Retriever::new(Arc::new(pipeline(store, RagConfig::default())), "never_ingested");
    assert!(retriever.is_loaded());

    let retrieval = retriever.retrieve("阿司匹林的作用是什么").await;
    assert!(retrieval.context.is_empty());
    assert!(retrieval.sources.is_empty());
    assert!(retriever.search("阿司匹林").await.is_err());
}

#[tokio::test]
async fn blank_documents_do_not_replace_collection() {
    let store = Arc::new(InMemoryVectorStore::new());
    let pipeline = pipeline(store.clone(), RagConfig::default());
    pipeline
        .rebuild_collection(COLLECTION, &[document("data/a.txt", "高血压需要低盐饮食。")])
        .await
        .unwrap();

    assert!(pipeline.rebuild_collection(COLLECTION, &[document("data/blank.txt", "  \n")]).await.is_err());
    assert_eq!(store.count(COLLECTION).await.unwrap(), 1);
}

/// Documents point along the x axis, queries away from it.
struct OpposedEmbedder;

#[async_trait::async_trait]
impl medqa_rag::EmbeddingProvider for OpposedEmbedder {
    async fn embed(&self, _text: &str) -> medqa_rag::Result<Vec<f32>> {
        Ok(vec![-0.6, 0.8])
    }

    async fn embed_batch(&self, texts: &[&str]) -> medqa_rag::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
    }

    fn dimensions(&self) -> usize {
        2
    }
}

fn opposed_pipeline(config: RagConfig) -> RagPipeline {
    RagPipeline::builder()
        .chunker(Arc::new(RecursiveChunker::new(config.chunk_size, config.chunk_overlap)))
        .config(config)
        .embedding_provider(Arc::new(OpposedEmbedder))
        .vector_store(Arc::new(InMemoryVectorStore::new()))
        .build()
        .unwrap()
}

#[tokio::test]
async fn negatively_correlated_hits_are_still_returned_by_default() {
    let pipeline = opposed_pipeline(RagConfig::default());
    pipeline
        .rebuild_collection(COLLECTION, &[document("data/hypertension.txt", "高血压患者应低盐饮食。")])
        .await
        .unwrap();

    let retrieval = Retriever::new(Arc::new(pipeline), COLLECTION).retrieve("query").await;

    assert!(retrieval.context.contains("低盐饮食"));
    assert_eq!(retrieval.sources, vec!["hypertension.txt".to_string()]);
}

#[tokio::test]
async fn explicit_threshold_filters_low_scores() {
    let config = RagConfig::builder().similarity_threshold(0.0).build().unwrap();
    let pipeline = opposed_pipeline(config);
    pipeline
        .rebuild_collection(COLLECTION, &[document("data/hypertension.txt", "高血压患者应低盐饮食。")])
        .await
        .unwrap();

    assert!(pipeline.query(COLLECTION, "query").await.unwrap().is_empty());
}
