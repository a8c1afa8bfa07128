//! Loading plain-text knowledge files from a directory tree.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::document::{Document, SOURCE_KEY};
use crate::error::{RagError, Result};

/// Recursively reads every file with a matching extension below `root`.
///
/// Each file becomes one [`Document`] whose `source` metadata is the path the
/// file was found at. Files are visited in lexical path order so repeated runs
/// produce the same document sequence.
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    root: PathBuf,
    extensions: Vec<String>,
}

impl DirectoryLoader {
    /// Loader for `*.txt` files under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), extensions: vec!["txt".to_string()] }
    }

    /// Replace the accepted extensions (compared case-insensitively, without the dot).
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(|e| e.into().to_ascii_lowercase()).collect();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }

    /// Read all matching files.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::LoadError`] if `root` is not a readable directory
    /// or a matching file is not valid UTF-8, and [`RagError::NoDocuments`]
    /// if nothing matched.
    pub fn load(&self) -> Result<Vec<Document>> {
        if !self.root.is_dir() {
            return Err(RagError::LoadError {
                path: self.root.clone(),
                message: "not a directory".to_string(),
            });
        }

        let mut documents = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(true).sort_by_file_name() {
            let entry = entry.map_err(|e| RagError::LoadError {
                path: e.path().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone()),
                message: e.to_string(),
            })?;
            let path = entry.path();
            if !entry.file_type().is_file() || !self.accepts(path) {
                continue;
            }

            let bytes = std::fs::read(path).map_err(|e| RagError::LoadError {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
            let text = String::from_utf8(bytes).map_err(|e| RagError::LoadError {
                path: path.to_path_buf(),
                message: format!("invalid UTF-8: {e}"),
            })?;

            let source = path.to_string_lossy().into_owned();
            debug!(source = %source, chars = text.chars().count(), "loaded document");
            documents.push(Document {
                id: source.clone(),
                text,
                metadata: HashMap::from([(SOURCE_KEY.to_string(), source)]),
                source_uri: None,
            });
        }

        if documents.is_empty() {
            return Err(RagError::NoDocuments { path: self.root.clone() });
        }

        info!(root = %self.root.display(), count = documents.len(), "loaded documents");
        Ok(documents)
    }
}
