//! File-backed vector store.
//!
//! Each collection lives in `<root>/<name>.json` as a single serialized
//! document holding its dimensionality and chunks. Writes go to a sibling
//! `.json.tmp` file which is then renamed over the live one, so a reader
//! opening the store mid-ingestion sees either the old collection or the new
//! one. The whole store is loaded into memory on [`DiskVectorStore::open`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::document::{Chunk, SearchResult};
use crate::error::{RagError, Result};
use crate::vectorstore::{VectorStore, rank};

const BACKEND: &str = "disk";
const EXTENSION: &str = "json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredCollection {
    name: String,
    dimensions: usize,
    chunks: Vec<Chunk>,
}

impl StoredCollection {
    fn new(name: &str, dimensions: usize) -> Self {
        Self { name: name.to_string(), dimensions, chunks: Vec::new() }
    }

    fn upsert(&mut self, incoming: &[Chunk]) -> Result<()> {
        if let Some(bad) = incoming.iter().find(|c| c.embedding.len() != self.dimensions) {
            return Err(store_error(format!(
                "chunk '{}' has {} dimensions, collection '{}' expects {}",
                bad.id,
                bad.embedding.len(),
                self.name,
                self.dimensions
            )));
        }
        let mut index: HashMap<String, usize> =
            self.chunks.iter().enumerate().map(|(i, c)| (c.id.clone(), i)).collect();
        for chunk in incoming {
            match index.get(&chunk.id) {
                Some(&i) => self.chunks[i] = chunk.clone(),
                None => {
                    index.insert(chunk.id.clone(), self.chunks.len());
                    self.chunks.push(chunk.clone());
                }
            }
        }
        Ok(())
    }
}

fn store_error(message: impl Into<String>) -> RagError {
    RagError::VectorStoreError { backend: BACKEND.to_string(), message: message.into() }
}

fn io_error(path: &Path, e: std::io::Error) -> RagError {
    store_error(format!("{}: {e}", path.display()))
}

fn missing(collection: &str) -> RagError {
    store_error(format!("collection '{collection}' does not exist"))
}

fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
        && !name.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(store_error(format!("invalid collection name '{name}'")))
    }
}

/// A [`VectorStore`] persisted as JSON files under a directory.
///
/// # Example
///
/// ```rust,ignore
/// use medqa_rag::{DiskVectorStore, VectorStore};
///
/// let store = DiskVectorStore::open("./vector_store").await?;
/// let loaded = store.collection_exists("medical_knowledge").await?;
/// ```
#[derive(Debug)]
pub struct DiskVectorStore {
    root: PathBuf,
    collections: RwLock<HashMap<String, StoredCollection>>,
}

impl DiskVectorStore {
    /// Load every collection found under `root`.
    ///
    /// A missing directory is treated as an empty store; it is created on
    /// the first write.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::VectorStoreError`] if a collection file cannot be
    /// read or parsed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let mut collections = HashMap::new();

        if tokio::fs::try_exists(&root).await.map_err(|e| io_error(&root, e))? {
            let mut entries = tokio::fs::read_dir(&root).await.map_err(|e| io_error(&root, e))?;
            while let Some(entry) = entries.next_entry().await.map_err(|e| io_error(&root, e))? {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                    continue;
                }
                let bytes = tokio::fs::read(&path).await.map_err(|e| io_error(&path, e))?;
                let stored: StoredCollection = serde_json::from_slice(&bytes)
                    .map_err(|e| store_error(format!("{}: {e}", path.display())))?;
                debug!(collection = %stored.name, chunks = stored.chunks.len(), "loaded collection");
                collections.insert(stored.name.clone(), stored);
            }
        }

        info!(root = %root.display(), collections = collections.len(), "opened vector store");
        Ok(Self { root, collections: RwLock::new(collections) })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.{EXTENSION}"))
    }

    async fn persist(&self, collection: &StoredCollection) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await.map_err(|e| io_error(&self.root, e))?;
        let path = self.collection_path(&collection.name);
        let tmp = path.with_extension(format!("{EXTENSION}.tmp"));
        let bytes = serde_json::to_vec(collection)
            .map_err(|e| store_error(format!("failed to serialize '{}': {e}", collection.name)))?;
        tokio::fs::write(&tmp, bytes).await.map_err(|e| io_error(&tmp, e))?;
        tokio::fs::rename(&tmp, &path).await.map_err(|e| io_error(&path, e))?;
        Ok(())
    }
}

#[async_trait]
impl VectorStore for DiskVectorStore {
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        validate_name(name)?;
        let mut collections = self.collections.write().await;
        if collections.contains_key(name) {
            return Ok(());
        }
        let stored = StoredCollection::new(name, dimensions);
        self.persist(&stored).await?;
        collections.insert(name.to_string(), stored);
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        let path = self.collection_path(name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_error(&path, e)),
        }
        collections.remove(name);
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.collections.read().await.contains_key(name))
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let collections = self.collections.read().await;
        collections.get(collection).map(|c| c.chunks.len()).ok_or_else(|| missing(collection))
    }

    async fn upsert(&self, collection: &str, chunks: &[Chunk]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let stored = collections.get_mut(collection).ok_or_else(|| missing(collection))?;
        let mut updated = stored.clone();
        updated.upsert(chunks)?;
        self.persist(&updated).await?;
        *stored = updated;
        Ok(())
    }

    async fn delete(&self, collection: &str, ids: &[&str]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let stored = collections.get_mut(collection).ok_or_else(|| missing(collection))?;
        let mut updated = stored.clone();
        updated.chunks.retain(|c| !ids.contains(&c.id.as_str()));
        self.persist(&updated).await?;
        *stored = updated;
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        let collections = self.collections.read().await;
        let stored = collections.get(collection).ok_or_else(|| missing(collection))?;
        if !stored.chunks.is_empty() && embedding.len() != stored.dimensions {
            return Err(store_error(format!(
                "query has {} dimensions, collection '{collection}' holds {}",
                embedding.len(),
                stored.dimensions
            )));
        }
        Ok(rank(stored.chunks.iter(), embedding, top_k))
    }

    async fn replace_collection(
        &self,
        name: &str,
        dimensions: usize,
        chunks: &[Chunk],
    ) -> Result<()> {
        validate_name(name)?;
        let mut fresh = StoredCollection::new(name, dimensions);
        fresh.upsert(chunks)?;

        let mut collections = self.collections.write().await;
        self.persist(&fresh).await?;
        info!(collection = name, chunks = fresh.chunks.len(), "replaced collection");
        collections.insert(name.to_string(), fresh);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, embedding: Vec<f32>) -> Chunk {
        Chunk {
            id: id.to_string(),
            text: format!("text of {id}"),
            embedding,
            metadata: HashMap::from([("source".to_string(), format!("data/{id}.txt"))]),
            document_id: id.to_string(),
        }
    }

    #[tokio::test]
    async fn missing_root_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskVectorStore::open(dir.path().join("vector_store")).await.unwrap();
        assert!(!store.collection_exists("medical_knowledge").await.unwrap());
        assert!(!dir.path().join("vector_store").exists());
    }

    #[tokio::test]
    async fn collections_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = DiskVectorStore::open(dir.path()).await.unwrap();
            store.create_collection("kb", 2).await.unwrap();
            store.upsert("kb", &[chunk("a", vec![1.0, 0.0]), chunk("b", vec![0.0, 1.0])]).await.unwrap();
        }

        let reopened = DiskVectorStore::open(dir.path()).await.unwrap();
        assert_eq!(reopened.count("kb").await.unwrap(), 2);
        let hits = reopened.search("kb", &[0.9, 0.1], 1).await.unwrap();
        assert_eq!(hits[0].chunk.id, "a");
        assert_eq!(hits[0].chunk.source_filename(), "a.txt");
    }

    #[tokio::test]
    async fn replace_discards_previous_chunks_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskVectorStore::open(dir.path()).await.unwrap();
        store.replace_collection("kb", 2, &[chunk("old", vec![1.0, 0.0])]).await.unwrap();
        store
            .replace_collection("kb", 2, &[chunk("new1", vec![1.0, 0.0]), chunk("new2", vec![0.0, 1.0])])
            .await
            .unwrap();

        assert_eq!(store.count("kb").await.unwrap(), 2);
        assert!(dir.path().join("kb.json").exists());
        assert!(!dir.path().join("kb.json.tmp").exists());

        let reopened = DiskVectorStore::open(dir.path()).await.unwrap();
        let ids: Vec<String> =
            reopened.search("kb", &[1.0, 1.0], 10).await.unwrap().into_iter().map(|r| r.chunk.id).collect();
        assert!(!ids.contains(&"old".to_string()));
    }

    #[tokio::test]
    async fn delete_collection_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskVectorStore::open(dir.path()).await.unwrap();
        store.create_collection("kb", 2).await.unwrap();
        store.delete_collection("kb").await.unwrap();
        store.delete_collection("kb").await.unwrap();
        assert!(!dir.path().join("kb.json").exists());
        assert!(!store.collection_exists("kb").await.unwrap());
    }

    #[tokio::test]
    async fn failed_delete_keeps_collection_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskVectorStore::open(dir.path()).await.unwrap();
        store.create_collection("kb", 2).await.unwrap();
        std::fs::remove_file(dir.path().join("kb.json")).unwrap();
        std::fs::create_dir(dir.path().join("kb.json")).unwrap();

        assert!(store.delete_collection("kb").await.is_err());
        assert!(store.collection_exists("kb").await.unwrap());
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskVectorStore::open(dir.path()).await.unwrap();
        store.create_collection("kb", 2).await.unwrap();
        assert!(store.upsert("kb", &[chunk("a", vec![1.0, 0.0, 0.0])]).await.is_err());
        store.upsert("kb", &[chunk("a", vec![1.0, 0.0])]).await.unwrap();
        assert!(store.search("kb", &[1.0, 0.0, 0.0], 3).await.is_err());
    }

    #[tokio::test]
    async fn rejects_path_like_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskVectorStore::open(dir.path()).await.unwrap();
        assert!(store.create_collection("../escape", 2).await.is_err());
        assert!(store.create_collection("", 2).await.is_err());
    }
}
