//! Shared test doubles.

use std::collections::HashMap;

use async_trait::async_trait;
use medqa_rag::{Document, EmbeddingProvider, Result};

pub const DIM: usize = 64;

/// Deterministic bag-of-characters embedder.
pub struct CharHashEmbedder;

#[async_trait]
impl EmbeddingProvider for CharHashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0.0f32; DIM];
        for c in text.chars().filter(|c| !c.is_whitespace()) {
            v[(c as usize) % DIM] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(v)
    }

    fn dimensions(&self) -> usize {
        DIM
    }

    fn name(&self) -> &str {
        "char-hash"
    }
}

pub fn document(source: &str, text: &str) -> Document {
    Document {
        id: source.to_string(),
        text: text.to_string(),
        metadata: HashMap::from([("source".to_string(), source.to_string())]),
        source_uri: None,
    }
}
