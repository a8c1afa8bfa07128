//! Property tests for vector store search ordering.

use std::collections::HashMap;

use medqa_rag::disk::DiskVectorStore;
use medqa_rag::document::Chunk;
use medqa_rag::inmemory::InMemoryVectorStore;
use medqa_rag::vectorstore::VectorStore;
use proptest::prelude::*;

/// Generate a non-zero L2-normalized embedding of the given dimension.
fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map(
        "non-zero embedding",
        |mut v| {
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm < 1e-8 {
                return None;
            }
            for val in &mut v {
                *val /= norm;
            }
            Some(v)
        },
    )
}

/// Generate a batch of chunks with distinct ids.
fn arb_chunks(dim: usize) -> impl Strategy<Value = Vec<Chunk>> {
    proptest::collection::vec(("[\\p{Han}a-z ]{5,30}", arb_normalized_embedding(dim)), 1..20)
        .prop_map(|items| {
            items
                .into_iter()
                .enumerate()
                .map(|(i, (text, embedding))| Chunk {
                    id: format!("doc_{i}"),
                    text,
                    embedding,
                    metadata: HashMap::from([("source".to_string(), format!("data/{i}.txt"))]),
                    document_id: "doc".to_string(),
                })
                .collect()
        })
}

fn assert_ordered(results: &[medqa_rag::SearchResult]) -> Result<(), TestCaseError> {
    for window in results.windows(2) {
        prop_assert!(
            window[0].score >= window[1].score,
            "results not in descending order: {} < {}",
            window[0].score,
            window[1].score,
        );
    }
    Ok(())
}

mod prop_search_ordering {
    use super::*;

    const DIM: usize = 16;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn in_memory_results_ordered_and_bounded_by_top_k(
            chunks in arb_chunks(DIM),
            query in arb_normalized_embedding(DIM),
            top_k in 1usize..25,
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let results = rt.block_on(async {
                let store = InMemoryVectorStore::new();
                store.create_collection("test", DIM).await.unwrap();
                store.upsert("test", &chunks).await.unwrap();
                store.search("test", &query, top_k).await.unwrap()
            });

            prop_assert!(results.len() <= top_k);
            prop_assert_eq!(results.len(), top_k.min(chunks.len()));
            assert_ordered(&results)?;
        }

        #[test]
        fn disk_store_agrees_with_in_memory_store(
            chunks in arb_chunks(DIM),
            query in arb_normalized_embedding(DIM),
            top_k in 1usize..10,
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let dir = tempfile::tempdir().unwrap();
            let (memory, disk) = rt.block_on(async {
                let memory = InMemoryVectorStore::new();
                memory.replace_collection("kb", DIM, &chunks).await.unwrap();

                let disk = DiskVectorStore::open(dir.path()).await.unwrap();
                disk.replace_collection("kb", DIM, &chunks).await.unwrap();
                let reopened = DiskVectorStore::open(dir.path()).await.unwrap();

                (
                    memory.search("kb", &query, top_k).await.unwrap(),
                    reopened.search("kb", &query, top_k).await.unwrap(),
                )
            });

            prop_assert_eq!(memory.len(), disk.len());
            assert_ordered(&disk)?;
            for (a, b) in memory.iter().zip(&disk) {
                prop_assert!((a.score - b.score).abs() < 1e-6);
            }
        }
    }
}
