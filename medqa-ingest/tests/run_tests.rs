use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use medqa_ingest::{IngestArgs, run};
use medqa_rag::{DiskVectorStore, EmbeddingProvider, VectorStore};
use tempfile::TempDir;

struct CharHashEmbedder;

#[async_trait]
impl EmbeddingProvider for CharHashEmbedder {
    async fn embed(&self, text: &str) -> medqa_rag::Result<Vec<f32>> {
        let mut v = vec![0.0f32; 16];
        for c in text.chars() {
            v[(c as usize) % 16] += 1.0;
        }
        Ok(v)
    }

    fn dimensions(&self) -> usize {
        16
    }
}

fn args(data: &TempDir, store: &TempDir, extra: &[&str]) -> IngestArgs {
    let mut argv = vec![
        "medqa-ingest".to_string(),
        "--data-dir".to_string(),
        data.path().display().to_string(),
        "--vector-store".to_string(),
        store.path().join("vector_store").display().to_string(),
        "--chunk-size".to_string(),
        "40".to_string(),
        "--chunk-overlap".to_string(),
        "5".to_string(),
    ];
    argv.extend(extra.iter().map(|s| s.to_string()));
    IngestArgs::try_parse_from(argv).unwrap()
}

fn write_corpus(data: &TempDir) {
    std::fs::write(
        data.path().join("hypertension.txt"),
        "高血压患者应坚持低盐饮食，每日食盐摄入不超过五克。\n\n应当规律服用降压药物，不可自行停药。\n\n定期监测血压并记录。",
    )
    .unwrap();
    std::fs::create_dir(data.path().join("endocrine")).unwrap();
    std::fs::write(data.path().join("endocrine/diabetes.txt"), "糖尿病患者需要控制血糖。").unwrap();
}

#[tokio::test]
async fn rerunning_replaces_the_collection() {
    let data = TempDir::new().unwrap();
    let store_dir = TempDir::new().unwrap();
    write_corpus(&data);
    let args = args(&data, &store_dir, &[]);

    let first = run(&args, Arc::new(CharHashEmbedder)).await.unwrap();
    assert_eq!(first.report.documents, 2);
    assert!(first.report.chunks >= 3);
    assert_eq!(first.report.dimensions, 16);
    assert_eq!(first.test_hits, Some(3));

    let second = run(&args, Arc::new(CharHashEmbedder)).await.unwrap();
    assert_eq!(second.report, first.report);

    let store = DiskVectorStore::open(&args.vector_store).await.unwrap();
    assert_eq!(store.count("medical_knowledge").await.unwrap(), first.report.chunks);
}

#[tokio::test]
async fn test_query_can_be_skipped() {
    let data = TempDir::new().unwrap();
    let store_dir = TempDir::new().unwrap();
    write_corpus(&data);

    let summary =
        run(&args(&data, &store_dir, &["--skip-test-query"]), Arc::new(CharHashEmbedder)).await.unwrap();
    assert_eq!(summary.test_hits, None);
}

#[tokio::test]
async fn empty_data_directory_fails_without_touching_the_store() {
    let data = TempDir::new().unwrap();
    let store_dir = TempDir::new().unwrap();
    let args = args(&data, &store_dir, &[]);

    assert!(run(&args, Arc::new(CharHashEmbedder)).await.is_err());
    assert!(!args.vector_store.join("medical_knowledge.json").exists());
}

#[tokio::test]
async fn invalid_utf8_aborts_ingestion() {
    let data = TempDir::new().unwrap();
    let store_dir = TempDir::new().unwrap();
    write_corpus(&data);
    std::fs::write(data.path().join("broken.txt"), [0xff, 0xfe, 0x00, 0xc3]).unwrap();

    assert!(run(&args(&data, &store_dir, &[]), Arc::new(CharHashEmbedder)).await.is_err());
}
